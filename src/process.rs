//! Supervised child processes
//!
//! Runs a command to completion while watching a deadline and a cancellation
//! token. Used for engine builds and for per-test engine invocations.

use crate::engine::CancelToken;
use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

const MIN_POLL: Duration = Duration::from_millis(1);
const MAX_POLL: Duration = Duration::from_millis(50);

/// How long to wait for output pipes after killing a child. The child runs in
/// its own process group and the whole group is killed, but a grandchild that
/// left the group may still hold the pipes.
const KILLED_OUTPUT_GRACE: Duration = Duration::from_millis(500);

/// How a supervised process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Termination {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

/// Output of a supervised process
#[derive(Debug)]
pub(crate) struct CommandOutput {
    pub termination: Termination,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

impl CommandOutput {
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// Last `max_lines` lines of stderr, for error messages
    pub fn stderr_tail(&self, max_lines: usize) -> String {
        let stderr = self.stderr_string();
        let lines: Vec<&str> = stderr.lines().collect();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..].join("\n")
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}

fn collect(rx: &mpsc::Receiver<Vec<u8>>, termination: Termination) -> Vec<u8> {
    match termination {
        Termination::Exited(_) => rx.recv().unwrap_or_default(),
        Termination::TimedOut | Termination::Cancelled => rx.recv_timeout(KILLED_OUTPUT_GRACE).unwrap_or_default(),
    }
}

/// Start the child as the leader of a new process group
#[cfg(unix)]
fn isolate(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn isolate(_command: &mut Command) {}

/// Kill the child and everything it started, then reap it
fn kill(child: &mut Child) {
    #[cfg(unix)]
    {
        // the child is not reaped yet, so its pid still names its group
        if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn wait(
    child: &mut Child,
    started: Instant,
    timeout: Option<Duration>,
    cancel: Option<&CancelToken>,
) -> io::Result<Termination> {
    let mut poll = MIN_POLL;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Termination::Exited(status));
        }
        if cancel.is_some_and(CancelToken::is_cancelled) {
            kill(child);
            return Ok(Termination::Cancelled);
        }
        if timeout.is_some_and(|limit| started.elapsed() >= limit) {
            kill(child);
            return Ok(Termination::TimedOut);
        }
        thread::sleep(poll);
        poll = (poll * 2).min(MAX_POLL);
    }
}

/// Spawn `command` and wait for it, killing it on timeout or cancellation.
///
/// stdin is closed; stdout and stderr are captured.
pub(crate) fn run_supervised(
    mut command: Command,
    timeout: Option<Duration>,
    cancel: Option<&CancelToken>,
) -> io::Result<CommandOutput> {
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    isolate(&mut command);

    let started = Instant::now();
    let mut child = command.spawn()?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let termination = match wait(&mut child, started, timeout, cancel) {
        Ok(t) => t,
        Err(e) => {
            kill(&mut child);
            return Err(e);
        }
    };
    let elapsed = started.elapsed();

    Ok(CommandOutput {
        termination,
        stdout: collect(&stdout, termination),
        stderr: collect(&stderr, termination),
        elapsed,
    })
}

/// Whether the process was terminated by a signal
#[cfg(unix)]
pub(crate) fn killed_by_signal(status: &ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal().is_some()
}

#[cfg(not(unix))]
pub(crate) fn killed_by_signal(_status: &ExitStatus) -> bool {
    false
}
