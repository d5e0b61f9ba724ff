//! One-time probe of the working directory, rendered into the system prompt.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::io::git::Git;

/// Files whose presence hints at the kind of project in the working directory.
pub const PROJECT_MARKERS: &[&str] = &[
    "go.mod",
    "package.json",
    "Cargo.toml",
    "requirements.txt",
    "pyproject.toml",
    "Makefile",
    "README.md",
];

const MAX_STATUS_ENTRIES: usize = 20;

/// Facts about the environment, gathered once per run.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct EnvironmentFacts {
    pub workdir: PathBuf,
    pub git: Option<GitFacts>,
    pub project_markers: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct GitFacts {
    /// `None` on a detached HEAD.
    pub branch: Option<String>,
    /// Porcelain status lines, capped at a small number of entries.
    pub changes: Vec<String>,
    /// Status entries left out of `changes`.
    pub changes_omitted: usize,
}

/// Inspect `workdir` for git state and project marker files.
///
/// Failures degrade to missing facts; the probe never aborts a run.
pub fn probe_environment(workdir: &Path) -> EnvironmentFacts {
    EnvironmentFacts {
        workdir: workdir.to_path_buf(),
        git: probe_git(workdir),
        project_markers: PROJECT_MARKERS
            .iter()
            .filter(|marker| workdir.join(marker).is_file())
            .map(|marker| marker.to_string())
            .collect(),
    }
}

fn probe_git(workdir: &Path) -> Option<GitFacts> {
    let git = Git::new(workdir);
    if !git.is_work_tree() {
        return None;
    }
    let branch = git
        .current_branch()
        .inspect_err(|err| debug!(err = %err, "could not read git branch"))
        .ok()
        .flatten();
    let entries = git
        .status_porcelain()
        .inspect_err(|err| debug!(err = %err, "could not read git status"))
        .unwrap_or_default();
    let changes_omitted = entries.len().saturating_sub(MAX_STATUS_ENTRIES);
    let changes = entries
        .into_iter()
        .take(MAX_STATUS_ENTRIES)
        .map(|entry| format!("{} {}", entry.code, entry.path))
        .collect();
    Some(GitFacts {
        branch,
        changes,
        changes_omitted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn detects_project_markers() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("Cargo.toml"), "[package]\n").expect("write");
        fs::write(temp.path().join("README.md"), "hi\n").expect("write");
        fs::create_dir(temp.path().join("Makefile")).expect("dir named like a marker");

        let facts = probe_environment(temp.path());
        assert_eq!(facts.workdir, temp.path());
        assert_eq!(facts.project_markers, vec!["Cargo.toml", "README.md"]);
    }

    #[test]
    fn non_repository_has_no_git_facts() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert_eq!(probe_environment(temp.path()).git, None);
    }
}
