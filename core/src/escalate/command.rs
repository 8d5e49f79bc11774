//! Reasoner backed by a local command.
//!
//! The configured command is split on whitespace and the full prompt is
//! appended as its last argument (no shell involved). The command prints the
//! answer JSON on stdout, optionally fenced or surrounded by prose.
//!
//! The command comes from the user's own configuration file and runs with
//! the user's privileges, so only configure commands you trust.

use super::prompt::build_prompt;
use super::response::parse_answer;
use super::{EscalationError, EscalationRequest, Reasoner, ReasonerResponse};
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct CommandReasoner {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandReasoner {
    pub fn new(command: &str, timeout: Duration) -> Result<Self, EscalationError> {
        let mut parts = command.split_whitespace().map(ToOwned::to_owned);
        let program = parts
            .next()
            .ok_or_else(|| EscalationError::CommandFailed("Custom command is empty".to_owned()))?;
        Ok(Self {
            program,
            args: parts.collect(),
            timeout,
        })
    }

    /// Run the command with `prompt` as the last argument and return stdout.
    fn run(&self, prompt: &str) -> Result<String, EscalationError> {
        let deadline = Instant::now() + self.timeout;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EscalationError::CommandFailed(format!("{}: {e}", self.program)))?;

        // Drain pipes on their own threads so a chatty child cannot block on
        // a full pipe while we wait on it.
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let timed_out = || {
            log::warn!(
                "[CommandReasoner::run] {} exceeded {} ms",
                self.program,
                self.timeout.as_millis()
            );
            EscalationError::Timeout(self.timeout.as_millis() as u64)
        };

        let Some(status) = wait_until(&mut child, deadline)? else {
            return Err(timed_out());
        };

        // Background processes left by the command can hold the pipes open
        // after it exits; the readers are abandoned at the deadline.
        let stdout = read_until(&stdout, deadline).ok_or_else(timed_out)?;
        let stderr = read_until(&stderr, deadline).unwrap_or_default();

        if !status.success() {
            return Err(EscalationError::CommandFailed(stderr.trim().to_owned()));
        }
        if stdout.trim().is_empty() {
            return Err(EscalationError::EmptyResponse);
        }
        Ok(stdout)
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

fn read_until(reader: &mpsc::Receiver<String>, deadline: Instant) -> Option<String> {
    reader
        .recv_timeout(deadline.saturating_duration_since(Instant::now()))
        .ok()
}

/// `Ok(None)` means the deadline passed and the child was killed.
fn wait_until(
    child: &mut Child,
    deadline: Instant,
) -> Result<Option<std::process::ExitStatus>, EscalationError> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

impl Reasoner for CommandReasoner {
    fn name(&self) -> &str {
        "command"
    }

    fn reason(&self, request: &EscalationRequest) -> Result<ReasonerResponse, EscalationError> {
        let start = Instant::now();
        let output = self.run(&build_prompt(request))?;
        let answer = parse_answer(&output)?;
        Ok(ReasonerResponse {
            answer,
            latency_ms: start.elapsed().as_millis() as u64,
            usage: None,
        })
    }
}
