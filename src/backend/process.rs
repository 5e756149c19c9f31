// Managed child process for the local inference backend
//
// Spawns the backend with piped stdio, pumps stdout/stderr line streams
// into the log, and guarantees the process dies with its handle.

use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

/// Handle to a running backend process
pub struct ManagedChild {
    child: Child,
    pid: Option<u32>,
}

impl ManagedChild {
    /// Spawn the backend and start pumping its output into the log.
    pub fn spawn(program: &str, args: &[String]) -> std::io::Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let pid = child.id();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_lines("stdout", stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_lines("stderr", stderr));
        }

        crate::info!("[backend] Spawned {} (pid {:?})", program, pid);
        Ok(Self { child, pid })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Check if the process is still running
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Stop the process: graceful signal first, then kill.
    pub async fn shutdown(mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            // SIGTERM gives the backend a chance to release models cleanly
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
            let grace = tokio::time::timeout(
                std::time::Duration::from_millis(500),
                self.child.wait(),
            );
            if let Ok(Ok(status)) = grace.await {
                crate::debug!("[backend] Process exited gracefully ({})", status);
                return;
            }
            crate::warn!("[backend] Process ignored SIGTERM, killing");
        }

        if let Err(e) = self.child.kill().await {
            crate::warn!("[backend] Kill failed: {}", e);
        }
        let _ = self.child.wait().await;
    }
}

/// Forward each line of a child stream into the log.
async fn pump_lines<R: AsyncRead + Unpin>(stream_name: &'static str, reader: R) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => crate::debug!("[backend:{}] {}", stream_name, line),
            Ok(None) => break,
            Err(e) => {
                crate::warn!("[backend:{}] Read error: {}", stream_name, e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_missing_program_fails() {
        let result = ManagedChild::spawn("/nonexistent/ghosttype-backend", &[]);
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial]
    async fn test_spawn_and_shutdown_long_running_child() {
        let mut child = ManagedChild::spawn(
            "/bin/sh",
            &["-c".to_string(), "sleep 30".to_string()],
        )
        .unwrap();
        assert!(child.is_running());
        assert!(child.pid().is_some());

        child.shutdown().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial]
    async fn test_exited_child_is_not_running() {
        let mut child =
            ManagedChild::spawn("/bin/sh", &["-c".to_string(), "true".to_string()]).unwrap();
        // Give the child a moment to exit
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(!child.is_running());
        child.shutdown().await;
    }
}
