//! Builder for executing external tool commands with timeout support.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Lines of stderr retained by [`ToolCommand::execute_streaming`].
const STDERR_TAIL_LINES: usize = 20;

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8). For streaming runs this is only
    /// the last few lines.
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// The child process is killed if the future driving it is dropped, so a
/// caller that abandons a run (timeout, cancellation) never leaks a process.
///
/// # Example
///
/// ```no_run
/// use af_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> af_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .arg("-v").arg("error")
///     .arg("-show_entries").arg("format=duration")
///     .arg("/path/to/track.flac")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// The arguments collected so far.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    fn spawn(&self) -> af_core::Result<tokio::process::Child> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd.spawn()
            .map_err(|e| af_core::Error::tool(self.program_name(), format!("failed to spawn: {e}")))
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`af_core::Error::Tool`] if spawning fails, the process times
    /// out, or it exits with a non-zero status (message includes stderr).
    pub async fn execute(&self) -> af_core::Result<ToolOutput> {
        let program_name = self.program_name();
        let child = self.spawn()?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(af_core::Error::tool(
                    program_name,
                    format!("I/O error waiting for process: {e}"),
                ))
            }
            Err(_elapsed) => {
                return Err(af_core::Error::tool(
                    program_name,
                    format!("timed out after {:?}", self.timeout),
                ))
            }
        };

        let tool_output = ToolOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !output.status.success() {
            return Err(af_core::Error::tool(
                program_name,
                format!(
                    "exited with status {}: {}",
                    output.status,
                    tool_output.stderr.trim()
                ),
            ));
        }

        Ok(tool_output)
    }

    /// Execute the command, handing every stderr line to `on_line` as it
    /// arrives.
    ///
    /// Unlike [`execute`](Self::execute), a non-zero exit is **not** an
    /// error: the caller inspects [`ToolOutput::status`] and the retained
    /// stderr tail to classify the failure itself.
    ///
    /// # Errors
    ///
    /// Returns [`af_core::Error::Tool`] if spawning fails, reading the pipes
    /// fails, or the process times out. Returns [`af_core::Error::Cancelled`]
    /// if `cancel` fires first; the child is killed in that case.
    pub async fn execute_streaming(
        &self,
        mut on_line: impl FnMut(&str),
        cancel: Option<CancellationToken>,
    ) -> af_core::Result<ToolOutput> {
        let program_name = self.program_name();
        let mut child = self.spawn()?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| af_core::Error::tool(&program_name, "stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| af_core::Error::tool(&program_name, "stderr not captured"))?;

        let run = async {
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut stdout_buf = Vec::new();

            let read_stderr = async {
                let mut lines = BufReader::new(stderr).lines();
                while let Some(line) = lines.next_line().await? {
                    on_line(&line);
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                Ok::<_, std::io::Error>(())
            };
            let read_stdout = stdout.read_to_end(&mut stdout_buf);

            let (err_res, out_res) = tokio::join!(read_stderr, read_stdout);
            err_res?;
            out_res?;
            let status = child.wait().await?;

            Ok::<_, std::io::Error>(ToolOutput {
                status,
                stdout: String::from_utf8_lossy(&stdout_buf).to_string(),
                stderr: tail.into_iter().collect::<Vec<_>>().join("\n"),
            })
        };

        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled_owned().await,
                None => std::future::pending().await,
            }
        };

        let result = tokio::select! {
            r = tokio::time::timeout(self.timeout, run) => r,
            () = cancelled => {
                tracing::debug!(tool = %program_name, "Cancelled; killing child process");
                return Err(af_core::Error::Cancelled);
            }
        };

        match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(af_core::Error::tool(
                program_name,
                format!("I/O error while running: {e}"),
            )),
            Err(_elapsed) => Err(af_core::Error::tool(
                program_name,
                format!("timed out after {:?}", self.timeout),
            )),
        }
    }
}
