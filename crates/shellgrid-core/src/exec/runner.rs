//! Command runners.
//!
//! A runner executes one cell's text as a shell command with the cell's
//! bindings in its environment. The trait is the seam tests use to avoid
//! spawning real processes.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use shellgrid_engine::engine::CellRef;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::info;

/// Output collected from one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output, byte for byte (lossily decoded as UTF-8)
    pub stdout: String,
    /// Standard error, kept for diagnostics
    pub stderr: String,
    /// Exit code, `None` if the process was killed by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs a cell's command line.
///
/// `Err` means the command could not be launched at all; a command that ran
/// and failed returns `Ok` with a non-zero exit code.
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        cell: &CellRef,
        command: &str,
        env: &HashMap<String, String>,
    ) -> io::Result<CommandOutput>;
}

/// Runs commands through `<shell> -c`, inheriting the process environment.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
    working_dir: Option<PathBuf>,
}

impl ShellRunner {
    /// A runner using `bash`.
    pub fn new() -> Self {
        Self::with_shell("bash")
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        ShellRunner {
            shell: shell.into(),
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CommandRunner for ShellRunner {
    async fn run(
        &self,
        cell: &CellRef,
        command: &str,
        env: &HashMap<String, String>,
    ) -> io::Result<CommandOutput> {
        info!(cell = %cell, "$ {}", command);

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c");
        cmd.arg(command);
        cmd.envs(env);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // Dropping the child (e.g. on shutdown) kills the process.
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("stderr was not piped"))?;

        let (stdout, stderr, status) = tokio::join!(
            capture(stdout, *cell, "stdout"),
            capture(stderr, *cell, "stderr"),
            child.wait()
        );

        Ok(CommandOutput {
            stdout: stdout?,
            stderr: stderr?,
            exit_code: status?.code(),
        })
    }
}

/// Read a stream to the end, logging each line against the cell.
async fn capture<R>(reader: R, cell: CellRef, stream: &'static str) -> io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut captured = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&line);
        info!(cell = %cell, stream, "{}", text.trim_end_matches(['\n', '\r']));
        captured.extend_from_slice(&line);
    }
    Ok(String::from_utf8_lossy(&captured).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shell_runner_captures_stdout_and_env() {
        let runner = ShellRunner::with_shell("sh");
        let env = HashMap::from([("A1".to_string(), "hello".to_string())]);
        let output = runner
            .run(&CellRef::new(1, 0), "echo \"$A1 world\"", &env)
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "hello world\n");
        assert_eq!(output.stderr, "");
    }

    #[tokio::test]
    async fn test_shell_runner_reports_exit_code_and_stderr() {
        let runner = ShellRunner::with_shell("sh");
        let output = runner
            .run(&CellRef::new(0, 0), "echo oops >&2; exit 3", &HashMap::new())
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stderr, "oops\n");
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_shell_runner_missing_shell_is_launch_error() {
        let runner = ShellRunner::with_shell("/definitely/not/a/shell");
        let result = runner.run(&CellRef::new(0, 0), "true", &HashMap::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_shell_runner_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let runner = ShellRunner::with_shell("sh").with_working_dir(dir.path());
        let output = runner
            .run(&CellRef::new(0, 0), "ls", &HashMap::new())
            .await
            .unwrap();
        assert_eq!(output.stdout, "marker.txt\n");
    }
}
