/// Child Process Supervision
///
/// **Responsibility:**
/// Run one command under a wall-clock limit with bounded output capture,
/// and make sure nothing it started survives the call.
///
/// **Rules:**
/// - Every command is a process group leader; the whole group is SIGKILLed
///   as soon as the leader exits, times out, or the caller drops the future
/// - The verdict comes from the leader's exit status and timing, never from
///   when the pipes reach EOF
/// - Each stream keeps at most `MAX_OUTPUT_BYTES`; overflowing either stream
///   kills the group so the writer never stalls on a full pipe
/// - Pipes still open after the group is gone (a process that escaped with
///   setsid) are abandoned after `DRAIN_GRACE`

use std::io;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Per-stream capture limit
pub const MAX_OUTPUT_BYTES: usize = 1024 * 1024; // 1MB

const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Launch `command` as the leader of a new process group
pub fn spawn(command: &mut Command) -> io::Result<Child> {
    command.kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);
    command.spawn()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GroupId(i32);

impl GroupId {
    #[cfg(unix)]
    fn kill(self) {
        // SAFETY: kill(2) takes plain integers and touches no memory of ours
        let rc = unsafe { libc::kill(-self.0, libc::SIGKILL) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                warn!(pgid = self.0, error = %err, "Failed to kill process group");
            }
        }
    }

    #[cfg(not(unix))]
    fn kill(self) {}
}

/// Kills the group on `kill()` or on drop, whichever comes first
#[derive(Debug)]
struct ProcessGroup {
    id: Option<GroupId>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self {
            id: child.id().and_then(|pid| i32::try_from(pid).ok()).map(GroupId),
        }
    }

    fn id(&self) -> Option<GroupId> {
        self.id
    }

    fn kill(&mut self) {
        if let Some(id) = self.id.take() {
            id.kill();
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub text: String,
    /// More than `MAX_OUTPUT_BYTES` was written; `text` holds the first part
    pub overflowed: bool,
}

#[derive(Debug)]
pub enum Exit {
    Exited(ExitStatus),
    TimedOut,
    WaitFailed(io::Error),
}

#[derive(Debug)]
pub struct Finished {
    pub exit: Exit,
    pub stdout: Captured,
    pub stderr: Captured,
}

impl Finished {
    pub fn overflowed(&self) -> bool {
        self.stdout.overflowed || self.stderr.overflowed
    }
}

/// Wait for `child` (spawned with [`spawn`]) under `limit`, feeding `input`
/// to its stdin if it has one
pub async fn supervise(mut child: Child, input: Option<String>, limit: Duration) -> Finished {
    let mut group = ProcessGroup::of(&child);
    let gid = group.id();

    let stdout = tokio::spawn(read_capped(child.stdout.take(), gid));
    let stderr = tokio::spawn(read_capped(child.stderr.take(), gid));
    let feeder = child
        .stdin
        .take()
        .map(|stdin| tokio::spawn(feed_stdin(stdin, input.unwrap_or_default())));

    // The limit is measured from launch
    let waited = tokio::time::timeout(limit, child.wait()).await;

    // Leader is done or out of time; nothing it started may outlive it
    group.kill();

    let exit = match waited {
        Ok(Ok(status)) => Exit::Exited(status),
        Ok(Err(e)) => Exit::WaitFailed(e),
        Err(_) => {
            // Already signalled through the group; this reaps it
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to reap timed-out process");
            }
            Exit::TimedOut
        }
    };

    if let Some(feeder) = feeder {
        feeder.abort();
    }

    Finished {
        exit,
        stdout: drain(stdout).await,
        stderr: drain(stderr).await,
    }
}

async fn drain(mut task: JoinHandle<Captured>) -> Captured {
    match tokio::time::timeout(DRAIN_GRACE, &mut task).await {
        Ok(Ok(captured)) => captured,
        Ok(Err(e)) => {
            debug!(error = %e, "Output reader failed");
            Captured::default()
        }
        Err(_) => {
            task.abort();
            warn!("Output pipe still held open after the process group was killed");
            Captured::default()
        }
    }
}

async fn feed_stdin(mut stdin: ChildStdin, input: String) {
    // A program that never reads its input closes the pipe early; that is not an error
    if let Err(e) = stdin.write_all(input.as_bytes()).await {
        debug!(error = %e, "Stdin closed before input was fully written");
    }
    // stdin dropped here so the program sees EOF
}

async fn read_capped<R: AsyncRead + Unpin>(pipe: Option<R>, group: Option<GroupId>) -> Captured {
    let mut buf = Vec::new();
    if let Some(pipe) = pipe {
        let mut limited = pipe.take(MAX_OUTPUT_BYTES as u64 + 1);
        if let Err(e) = limited.read_to_end(&mut buf).await {
            debug!(error = %e, "Failed to read process output");
        }
    }

    let overflowed = buf.len() > MAX_OUTPUT_BYTES;
    if overflowed {
        buf.truncate(MAX_OUTPUT_BYTES);
        if let Some(group) = group {
            debug!(pgid = group.0, "Output limit exceeded; killing process group");
            group.kill();
        }
    }

    Captured {
        text: String::from_utf8_lossy(&buf).into_owned(),
        overflowed,
    }
}
