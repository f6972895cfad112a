//! Child process hosting the remote server.

use std::{path::Path, process::Stdio, time::Duration};

use command_group::{AsyncCommandGroup, AsyncGroupChild};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{ChildStderr, ChildStdin, ChildStdout, Command},
    task::JoinHandle,
};

/// Process error.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(#[source] std::io::Error),
    #[error("Child is missing its {0} pipe")]
    MissingPipe(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Spawned server process with piped stdio.
///
/// The process runs in its own group so that anything it starts is killed
/// with it.
pub struct StdioProcess {
    child: AsyncGroupChild,
    stderr_task: Option<JoinHandle<()>>,
}

impl StdioProcess {
    /// Spawn `program args..` and hand back its stdin/stdout.
    ///
    /// # Errors
    /// Returns error if the process cannot be started.
    pub fn spawn(
        program: &Path,
        args: &[String],
        working_dir: Option<&Path>,
    ) -> Result<(Self, ChildStdin, ChildStdout), ProcessError> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }

        let mut child = command.group_spawn().map_err(ProcessError::SpawnFailed)?;
        tracing::info!(program = %program.display(), ?args, pid = ?child.id(), "Spawned server process");

        let stdin = child.inner().stdin.take().ok_or(ProcessError::MissingPipe("stdin"))?;
        let stdout = child.inner().stdout.take().ok_or(ProcessError::MissingPipe("stdout"))?;
        let stderr_task = child.inner().stderr.take().map(forward_stderr);

        Ok((Self { child, stderr_task }, stdin, stdout))
    }

    /// Wait up to `grace` for the process to exit on its own, then kill the
    /// whole group.
    ///
    /// # Errors
    /// Returns error if the process could not be killed or reaped.
    pub async fn terminate(mut self, grace: Duration) -> Result<(), ProcessError> {
        let result = match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(%status, "Server process exited");
                Ok(())
            }
            Ok(Err(e)) => Err(ProcessError::Io(e)),
            Err(_) => {
                tracing::warn!(grace_ms = grace.as_millis(), "Server process did not exit, killing");
                self.child.kill().await.map_err(ProcessError::Io)
            }
        };

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        result
    }
}

fn forward_stderr(stderr: ChildStderr) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => tracing::debug!(target: "design_bridge_mcp::server", "{line}"),
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("Stopped reading server stderr: {e}");
                    break;
                }
            }
        }
    })
}

#[cfg(all(test, unix))]
mod tests {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    use super::*;

    #[tokio::test]
    async fn echoes_through_piped_stdio() {
        let (process, mut stdin, stdout) =
            StdioProcess::spawn(Path::new("/bin/cat"), &[], None).unwrap();

        stdin.write_all(b"{\"ping\":1}\n").await.unwrap();
        let mut lines = BufReader::new(stdout).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "{\"ping\":1}");

        drop(stdin);
        process.terminate(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn kills_a_process_that_ignores_eof() {
        let (process, _stdin, _stdout) =
            StdioProcess::spawn(Path::new("/bin/sleep"), &["30".to_string()], None).unwrap();
        tokio_test::assert_ok!(process.terminate(Duration::from_millis(50)).await);
    }
}
