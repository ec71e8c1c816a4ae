//! Execution engine backed by an external tracer process.

use std::process::Stdio;

use stepscope::protocol::parse_response;
use stepscope::{ExecutionEngine, RunError, RunOutput};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Spawns `command`, writes the source to its stdin and parses the JSON
/// response from its stdout.
pub struct CommandEngine {
    command: Vec<String>,
}

impl CommandEngine {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl ExecutionEngine for CommandEngine {
    async fn run(&self, source: &str) -> Result<RunOutput, RunError> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(RunError::Transport("no engine command configured".to_owned()));
        };
        log::debug!("starting engine: {}", self.command.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| RunError::Transport(format!("failed to start {program}: {error}")))?;

        // Feed stdin while stdout and stderr are drained, so neither side
        // blocks on a full pipe
        let stdin = child.stdin.take();
        let send = async move {
            match stdin {
                Some(mut stdin) => stdin.write_all(source.as_bytes()).await,
                None => Ok(()),
            }
            // Dropping stdin closes the pipe so the engine sees EOF
        };
        let (sent, output) = tokio::join!(send, child.wait_with_output());
        let output =
            output.map_err(|error| RunError::Transport(format!("engine did not finish: {error}")))?;
        if let Err(error) = sent {
            if output.stdout.is_empty() {
                return Err(RunError::Transport(format!("failed to send source: {error}")));
            }
            log::warn!("engine stopped reading its input early: {error}");
        }

        if output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RunError::Transport(format!(
                "{program} exited with {} and no response: {}",
                output.status,
                stderr.trim()
            )));
        }
        parse_response(&String::from_utf8_lossy(&output.stdout))
    }
}
