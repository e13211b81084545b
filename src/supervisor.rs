//! Dashboard process supervision
//!
//! Launches the dashboard server binary once, keeps its output flowing
//! into the host log, and records its exit. Supervision is single-shot:
//! an exited or failed process stays terminal and later proxy calls
//! fail at the network layer instead of crashing the host service.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Notify, RwLock};
use tracing::{error, info};

/// Lifecycle of the supervised dashboard process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Child is alive
    Running { pid: u32 },
    /// Child terminated on its own
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
    },
    /// The binary could not be spawned
    LaunchFailed,
    /// Child was terminated by [`ProcessSupervisor::stop`]
    Stopped,
}

/// Handle owning the dashboard server child process.
///
/// Created once at service init; request handlers only read its status.
pub struct ProcessSupervisor {
    status: Arc<RwLock<ProcessStatus>>,
    shutdown: Arc<Notify>,
}

impl ProcessSupervisor {
    /// Launch the dashboard binary with its fixed flags.
    ///
    /// A spawn failure is recorded as [`ProcessStatus::LaunchFailed`]
    /// and logged; it is never propagated to the caller. Must run
    /// inside a tokio runtime: draining and exit observation happen on
    /// background tasks.
    pub fn spawn(
        binary: &Path,
        kubeconfig_path: &Path,
        plugins_path: &Path,
        base_path: &str,
    ) -> Self {
        let shutdown = Arc::new(Notify::new());

        let mut command = Command::new(binary);
        command
            .arg("--kubeconfig")
            .arg(kubeconfig_path)
            .arg("--plugins-dir")
            .arg(plugins_path)
            .arg("--base-url")
            .arg(base_path)
            .arg("--enable-dynamic-clusters")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                error!(
                    "failed to launch dashboard server '{}': {}",
                    binary.display(),
                    err
                );
                return Self {
                    status: Arc::new(RwLock::new(ProcessStatus::LaunchFailed)),
                    shutdown,
                };
            }
        };

        let pid = child.id().unwrap_or_default();
        info!("dashboard server started (pid {})", pid);
        let status = Arc::new(RwLock::new(ProcessStatus::Running { pid }));

        // Each stream is drained on its own task so the child never
        // blocks on a full pipe.
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(drain(stdout, false));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain(stderr, true));
        }

        tokio::spawn(monitor(child, status.clone(), shutdown.clone()));

        Self { status, shutdown }
    }

    pub async fn status(&self) -> ProcessStatus {
        self.status.read().await.clone()
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.status.read().await, ProcessStatus::Running { .. })
    }

    /// Terminate the child. Used at host shutdown.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }
}

async fn drain<R>(stream: R, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_stderr {
            error!("dashboard server stderr: {}", line);
        } else {
            info!("dashboard server stdout: {}", line);
        }
    }
}

async fn monitor(mut child: Child, status: Arc<RwLock<ProcessStatus>>, shutdown: Arc<Notify>) {
    tokio::select! {
        result = child.wait() => match result {
            Ok(exit) => {
                let code = exit.code();
                let signal = exit_signal(&exit);
                error!(
                    "dashboard server exited with code {:?} and signal {:?}",
                    code, signal
                );
                *status.write().await = ProcessStatus::Exited { code, signal };
            }
            Err(err) => {
                error!("failed waiting on dashboard server: {}", err);
                *status.write().await = ProcessStatus::LaunchFailed;
            }
        },
        _ = shutdown.notified() => {
            info!("stopping dashboard server");
            let _ = child.start_kill();
            let _ = child.wait().await;
            *status.write().await = ProcessStatus::Stopped;
        }
    }
}

#[cfg(unix)]
fn exit_signal(exit: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    exit.signal()
}

#[cfg(not(unix))]
fn exit_signal(_exit: &std::process::ExitStatus) -> Option<i32> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[tokio::test]
    async fn test_invalid_binary_records_launch_failed() {
        let supervisor = ProcessSupervisor::spawn(
            &PathBuf::from("/nonexistent/headlamp-standalone"),
            &PathBuf::from("/tmp/kubeconfig.yaml"),
            &PathBuf::from("/tmp/plugins"),
            "/api/headlamp",
        );

        assert_eq!(supervisor.status().await, ProcessStatus::LaunchFailed);
        assert!(!supervisor.is_running().await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_is_observed() {
        // /bin/echo accepts the fixed flags as plain arguments and
        // terminates immediately with status 0.
        let supervisor = ProcessSupervisor::spawn(
            &PathBuf::from("/bin/echo"),
            &PathBuf::from("/tmp/kubeconfig.yaml"),
            &PathBuf::from("/tmp/plugins"),
            "/api/headlamp",
        );

        let mut status = supervisor.status().await;
        for _ in 0..100 {
            if !matches!(status, ProcessStatus::Running { .. }) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            status = supervisor.status().await;
        }

        assert_eq!(
            status,
            ProcessStatus::Exited {
                code: Some(0),
                signal: None
            }
        );
    }
}
