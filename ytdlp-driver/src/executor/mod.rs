//! A tool for executing commands.

use crate::error::{Error, Result};
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How long a cancelled process is given to exit before it is killed for good.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Represents a command executor.
///
/// # Example
///
/// ```rust,no_run
/// # use ytdlp_driver::utils;
/// # use std::path::PathBuf;
/// # use std::time::Duration;
/// # use ytdlp_driver::executor::Executor;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let args = vec!["--version"];
///
/// let executor = Executor {
///     executable_path: PathBuf::from("yt-dlp"),
///     timeout: Duration::from_secs(30),
///     args: utils::to_owned(args),
/// };
///
/// let output = executor.execute().await?;
/// println!("Output: {}", output.stdout);
///
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Executor {
    /// The path to the command executable.
    pub executable_path: PathBuf,
    /// The timeout for [`Executor::execute`]. Streamed runs are not bounded.
    pub timeout: Duration,

    /// The arguments to pass to the command.
    pub args: Vec<String>,
}

/// Represents the output of a process.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutput {
    /// The stdout of the process.
    pub stdout: String,
    /// The stderr of the process.
    pub stderr: String,
    /// The exit code of the process.
    pub code: i32,
}

impl Executor {
    fn command(&self) -> Command {
        let mut command = Command::new(&self.executable_path);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.kill_on_drop(true);

        #[cfg(target_os = "windows")]
        {
            // CREATE_NO_WINDOW
            command.creation_flags(0x08000000);
        }

        command.args(&self.args);
        command
    }

    /// Executes the command and returns the output.
    ///
    /// # Errors
    ///
    /// This function will return an error if the command could not be executed, if it exited with a non-zero code,
    /// or if the process timed out.
    pub async fn execute(&self) -> Result<ProcessOutput> {
        #[cfg(feature = "tracing")]
        tracing::debug!("Executing command: {:?}", self);

        let child = self.command().spawn()?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                // kill_on_drop reaps the process once the future is dropped
                #[cfg(feature = "tracing")]
                tracing::warn!("Process timed out after {:?}, killing it", self.timeout);

                return Err(Error::Timeout(self.timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        let code = output.status.code().unwrap_or(-1);
        if output.status.success() {
            return Ok(ProcessOutput {
                stdout,
                stderr,
                code,
            });
        }

        Err(Error::Command(format!(
            "Process failed with code {}: {}",
            code, stderr
        )))
    }

    /// Runs the command and hands every line it prints, on stdout or stderr, to `on_line`.
    ///
    /// Both streams share one pipe, so lines arrive in the order the process wrote them. Lines are decoded as UTF-8
    /// with invalid sequences replaced, and their line ending is stripped.
    /// When `cancel` fires the process is killed and [`Error::Cancelled`] is returned.
    ///
    /// # Returns
    ///
    /// The exit code of the process, `-1` when it was ended by a signal.
    pub async fn stream<F>(&self, cancel: &CancellationToken, mut on_line: F) -> Result<i32>
    where
        F: FnMut(String),
    {
        #[cfg(feature = "tracing")]
        tracing::debug!("Streaming command: {:?}", self);

        let (reader, writer) = std::io::pipe()?;
        let mut child = {
            let mut command = self.command();
            command.stdout(writer.try_clone()?);
            command.stderr(writer);
            command.spawn()?
        };

        // blocking reads, detached from the runtime
        let (sender, mut receiver) = mpsc::unbounded_channel();
        std::thread::spawn(move || forward_lines(reader, sender));

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    terminate(&mut child).await;
                    return Err(Error::Cancelled);
                }
                line = receiver.recv() => match line {
                    Some(Ok(line)) => on_line(line),
                    Some(Err(e)) => {
                        terminate(&mut child).await;
                        return Err(e.into());
                    }
                    None => break,
                },
            }
        }

        let status = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                terminate(&mut child).await;
                return Err(Error::Cancelled);
            }
            status = child.wait() => status?,
        };

        Ok(status.code().unwrap_or(-1))
    }
}

/// Reads `reader` line by line and sends each line through `sender` until EOF or until the receiver is gone.
fn forward_lines<R>(reader: R, sender: mpsc::UnboundedSender<std::io::Result<String>>)
where
    R: Read,
{
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::new();

    loop {
        buffer.clear();
        let line = match reader.read_until(b'\n', &mut buffer) {
            Ok(0) => return,
            Ok(_) => String::from_utf8_lossy(&buffer)
                .trim_end_matches(['\r', '\n'])
                .to_string(),
            Err(e) => {
                let _ = sender.send(Err(e));
                return;
            }
        };

        if sender.send(Ok(line)).is_err() {
            return;
        }
    }
}

/// Kills the process and waits for it to exit, giving up after a grace period.
async fn terminate(child: &mut Child) {
    if let Err(_e) = child.start_kill() {
        #[cfg(feature = "tracing")]
        tracing::warn!("Failed to signal process: {}", _e);
    }

    if tokio::time::timeout(TERMINATE_GRACE, child.wait())
        .await
        .is_err()
    {
        #[cfg(feature = "tracing")]
        tracing::warn!("Process did not exit after {:?}, killing it", TERMINATE_GRACE);

        let _ = child.kill().await;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::utils;
    use std::time::Instant;

    fn shell(script: &str) -> Executor {
        Executor {
            executable_path: PathBuf::from("sh"),
            timeout: Duration::from_secs(10),
            args: utils::to_owned(vec!["-c", script]),
        }
    }

    #[tokio::test]
    async fn execute_captures_stdout() {
        let output = shell("echo hello").execute().await.unwrap();

        assert_eq!(output.stdout, "hello\n");
        assert_eq!(output.code, 0);
    }

    #[tokio::test]
    async fn execute_reports_failures() {
        let err = shell("echo broken >&2; exit 2").execute().await.unwrap_err();

        match err {
            Error::Command(message) => {
                assert!(message.contains("code 2"), "{message}");
                assert!(message.contains("broken"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_merges_both_streams_in_order_and_returns_the_code() {
        let cancel = CancellationToken::new();
        let mut lines = Vec::new();

        let code = shell("echo one; echo two >&2; printf 'three\\r\\n'; echo ERROR: four >&2; exit 3")
            .stream(&cancel, |line| lines.push(line))
            .await
            .unwrap();

        assert_eq!(code, 3);
        assert_eq!(lines, vec!["one", "two", "three", "ERROR: four"]);
    }

    #[tokio::test]
    async fn stream_stops_when_cancelled() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = shell("echo started; sleep 30")
            .stream(&cancel, |_| {})
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
