//! Subprocess execution with line-by-line log streaming.

use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0) && !self.timed_out
    }

    /// Exit code for error reporting, `-1` when there is none.
    pub fn code(&self) -> i32 {
        self.status.unwrap_or(-1)
    }
}

/// Run `command`, logging each output line as `[prefix] line`.
///
/// With a `timeout`, the child is killed once it elapses and the output is
/// marked `timed_out`.
pub fn run_streaming(
    command: &mut Command,
    prefix: &str,
    timeout: Option<Duration>,
) -> std::io::Result<ProcessOutput> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = command.spawn()?;

    let stdout = child
        .stdout
        .take()
        .map(|out| spawn_reader(out, prefix.to_string(), "stdout"));
    let stderr = child
        .stderr
        .take()
        .map(|err| spawn_reader(err, prefix.to_string(), "stderr"));

    let mut timed_out = false;
    let status = match timeout {
        None => child.wait()?,
        Some(limit) => {
            let deadline = Instant::now() + limit;
            loop {
                if let Some(status) = child.try_wait()? {
                    break status;
                }
                if Instant::now() >= deadline {
                    warn!(prefix, timeout_secs = limit.as_secs_f64(), "process timed out, killing");
                    // The child may have exited between try_wait and kill.
                    let _ = child.kill();
                    timed_out = true;
                    break child.wait()?;
                }
                thread::sleep(Duration::from_millis(50));
            }
        }
    };

    Ok(ProcessOutput {
        status: status.code(),
        stdout: stdout.map(join_reader).unwrap_or_default(),
        stderr: stderr.map(join_reader).unwrap_or_default(),
        timed_out,
    })
}

fn spawn_reader<R>(reader: R, prefix: String, stream: &'static str) -> JoinHandle<String>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut captured = String::new();
        for line in BufReader::new(reader).lines() {
            let Ok(line) = line else { break };
            info!(stream, "[{prefix}] {line}");
            captured.push_str(&line);
            captured.push('\n');
        }
        captured
    })
}

fn join_reader(handle: JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}
