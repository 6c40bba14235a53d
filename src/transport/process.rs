//! Process spawning and lifecycle management.

use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use super::io::FrameReader;
use super::{wait_ready, ReadyInfo};
use crate::config::BridgeConfig;
use crate::{Error, Result};

/// Number of stderr lines kept for diagnostics.
const STDERR_TAIL_LINES: usize = 40;

/// How long to wait for exit status and stderr after stdout closed early.
const EXIT_SETTLE: Duration = Duration::from_secs(2);

type StderrTail = Arc<Mutex<VecDeque<String>>>;

/// A running remote application with the server script loaded.
///
/// # Cancellation
///
/// Dropping a `RemoteProcess` kills the application if it is still running.
pub struct RemoteProcess {
    child: Child,
    stderr_tail: StderrTail,
    ready: ReadyInfo,
}

impl RemoteProcess {
    /// Launch the application and wait for the server script's ready message.
    ///
    /// Returns the process together with the framed read half of its stdout
    /// and its stdin.
    pub(crate) async fn spawn(
        config: &BridgeConfig,
    ) -> Result<(Self, FrameReader<ChildStdout>, ChildStdin)> {
        let mut cmd = build_command(config);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!(executable = %config.executable.display(), "spawning remote application");
        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ExecutableNotFound {
                    searched: config.executable.display().to_string(),
                }
            } else {
                Error::ProcessSpawn(e)
            }
        })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.start_kill();
            return Err(Error::ProcessSpawn(std::io::Error::new(
                std::io::ErrorKind::Other,
                "child stdio was not captured",
            )));
        };

        let stderr_tail: StderrTail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let drain = tokio::spawn(drain_stderr(stderr, Arc::clone(&stderr_tail)));

        let mut reader = FrameReader::new(stdout);
        let ready = match tokio::time::timeout(config.ready_timeout, wait_ready(&mut reader)).await {
            Ok(Ok(Some(info))) => info,
            Ok(Ok(None)) => {
                let status = settle_exit(&mut child).await;
                let _ = tokio::time::timeout(EXIT_SETTLE, drain).await;
                return Err(Error::ExitedBeforeReady {
                    status,
                    stderr: tail_text(&stderr_tail),
                });
            }
            Ok(Err(err)) => {
                let _ = child.start_kill();
                return Err(err);
            }
            Err(_) => {
                let _ = child.start_kill();
                return Err(Error::ReadyTimeout(config.ready_timeout));
            }
        };

        tracing::info!(
            pid = ?child.id(),
            app_version = ?ready.app_version,
            "remote application ready"
        );

        Ok((
            Self {
                child,
                stderr_tail,
                ready,
            },
            reader,
            stdin,
        ))
    }

    /// What the server script reported at startup.
    pub fn ready_info(&self) -> &ReadyInfo {
        &self.ready
    }

    /// Get the process ID of the running application.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// The last lines the application wrote to stderr.
    pub fn stderr_tail(&self) -> String {
        tail_text(&self.stderr_tail)
    }

    /// Check for exit without blocking.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.child.try_wait().map_err(Error::io)
    }

    /// Wait for the process to exit and return its exit status.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        self.child.wait().await.map_err(Error::io)
    }

    /// Wait up to `grace` for a clean exit, then kill.
    pub async fn wait_or_kill(&mut self, grace: Duration) -> Result<ExitStatus> {
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => status.map_err(Error::io),
            Err(_) => {
                tracing::warn!(?grace, "remote application did not exit in time; killing");
                self.child.kill().await.map_err(Error::io)?;
                self.child.wait().await.map_err(Error::io)
            }
        }
    }

    /// Kill the process immediately.
    pub async fn kill(&mut self) -> Result<()> {
        self.child.kill().await.map_err(Error::io)
    }

    /// Try to kill the process without waiting.
    pub fn start_kill(&mut self) -> Result<()> {
        self.child.start_kill().map_err(Error::io)
    }
}

impl Drop for RemoteProcess {
    fn drop(&mut self) {
        let _ = self.start_kill();
    }
}

/// Build a tokio Command from the config.
fn build_command(config: &BridgeConfig) -> Command {
    let mut cmd = Command::new(&config.executable);

    if let Some(ref dir) = config.working_directory {
        cmd.current_dir(dir);
    }

    if !config.inherit_env {
        cmd.env_clear();
    }
    cmd.envs(&config.env_vars);

    cmd.args(config.build_args());
    cmd
}

/// Log stderr lines and keep the most recent ones.
async fn drain_stderr(stderr: ChildStderr, tail: StderrTail) {
    let mut reader = BufReader::new(stderr);
    let mut buffer = Vec::with_capacity(256);
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer).await {
            Ok(0) => return,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buffer).trim_end().to_string();
                tracing::debug!(target: "libbridge::remote::stderr", "{}", line);
                let mut tail = tail.lock().unwrap_or_else(|e| e.into_inner());
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Err(err) => {
                tracing::debug!(error = %err, "stderr read failed");
                return;
            }
        }
    }
}

fn tail_text(tail: &StderrTail) -> String {
    let tail = tail.lock().unwrap_or_else(|e| e.into_inner());
    tail.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
}

/// Exit code of a process whose stdout already closed.
async fn settle_exit(child: &mut Child) -> Option<i32> {
    match tokio::time::timeout(EXIT_SETTLE, child.wait()).await {
        Ok(Ok(status)) => status.code(),
        _ => {
            let _ = child.start_kill();
            None
        }
    }
}
