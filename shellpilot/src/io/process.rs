//! Helpers for running child processes with timeouts and bounded output.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How long to keep draining the pipe once the process group is gone.
const READER_GRACE: Duration = Duration::from_millis(500);

/// Captured child process output (stdout and stderr share one pipe).
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub output: Vec<u8>,
    pub truncated: usize,
    pub timed_out: bool,
    /// A process that left the group still held the pipe open; reading stopped early.
    pub detached: bool,
}

impl CommandOutput {
    pub fn truncated_notice(&self) -> String {
        if self.truncated > 0 {
            format!("\n[output truncated {} bytes]", self.truncated)
        } else {
            String::new()
        }
    }

    /// Lossy UTF-8 text of the captured output, including any notices.
    pub fn text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.output).into_owned();
        text.push_str(&self.truncated_notice());
        if self.detached {
            text.push_str("\n[output incomplete: a background process kept the output pipe open]");
        }
        text
    }
}

/// Run a command with a timeout, capturing stdout and stderr interleaved.
///
/// Both streams are attached to the write end of a single pipe, which is
/// drained concurrently so a chatty child cannot deadlock. `output_limit_bytes`
/// bounds what is kept in memory; the rest is drained and counted.
///
/// The child runs in its own process group. On timeout the whole group is
/// killed before returning, and leftover background jobs are killed after a
/// normal exit too, so no descendants outlive the call. A process that moved
/// to another session (`setsid`) escapes the group kill; the pipe is then
/// drained for at most [`READER_GRACE`] and the call returns what it has.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_combined_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    let (reader, writer) = std::io::pipe().context("create output pipe")?;
    let writer_for_stderr = writer.try_clone().context("clone output pipe")?;
    cmd.stdin(Stdio::null())
        .stdout(writer)
        .stderr(writer_for_stderr);
    isolate_process_group(&mut cmd);

    debug!("spawning child process");
    let spawned = cmd.spawn();
    // The parent's copies of the write end live in `cmd`; close them so the
    // reader sees EOF once every process in the group is gone.
    drop(cmd);
    let mut child = match spawned {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let captured = Arc::new(Mutex::new(Captured::default()));
    let (done_tx, done_rx) = mpsc::channel();
    let sink = Arc::clone(&captured);
    thread::spawn(move || {
        let result = read_stream_limited(reader, output_limit_bytes, &sink);
        let _ = done_tx.send(result);
    });

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing process group"
            );
            timed_out = true;
            kill_process_group(&mut child);
            child.wait().context("wait command after kill")?
        }
    };
    kill_process_group(&mut child);

    let detached = match done_rx.recv_timeout(READER_GRACE) {
        Ok(result) => {
            result.context("read output")?;
            false
        }
        Err(RecvTimeoutError::Timeout) => {
            warn!(
                grace_ms = READER_GRACE.as_millis() as u64,
                "output pipe still open after the process group exited, not waiting for it"
            );
            true
        }
        Err(RecvTimeoutError::Disconnected) => {
            return Err(anyhow!("output reader thread panicked"));
        }
    };
    let Captured { output, truncated } = take_captured(&captured)?;
    if truncated > 0 {
        warn!(truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        output,
        truncated,
        timed_out,
        detached,
    })
}

#[cfg(unix)]
fn isolate_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate_process_group(_cmd: &mut Command) {}

/// Kill every process in the child's group, then the child itself.
///
/// Failures are expected when the group is already empty and are ignored.
#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    let group = format!("-{}", child.id());
    let killed = Command::new("kill")
        .args(["-KILL", "--", &group])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(e) = killed {
        warn!(err = %e, "failed to run kill for process group, only the direct child is killed");
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    let _ = child.kill();
}

#[derive(Debug, Default)]
struct Captured {
    output: Vec<u8>,
    truncated: usize,
}

fn take_captured(captured: &Mutex<Captured>) -> Result<Captured> {
    let mut guard = captured
        .lock()
        .map_err(|_| anyhow!("output buffer poisoned"))?;
    Ok(std::mem::take(&mut *guard))
}

/// Copy `reader` into `sink` until EOF, keeping at most `limit` bytes and
/// counting the rest.
fn read_stream_limited<R: Read>(mut reader: R, limit: usize, sink: &Mutex<Captured>) -> Result<()> {
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            return Ok(());
        }
        let mut captured = sink
            .lock()
            .map_err(|_| anyhow!("output buffer poisoned"))?;
        let remaining = limit.saturating_sub(captured.output.len());
        let keep = n.min(remaining);
        captured.output.extend_from_slice(&chunk[..keep]);
        captured.truncated += n - keep;
    }
}
