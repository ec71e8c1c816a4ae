//! Boundary with the execution engine that produces traces.

use crate::event::ExecutionLog;
use crate::network::NeuralNetworkDescriptor;

/// Why a run produced no log. A failed run never yields a partial log.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RunError {
    /// The target program raised or could not be executed. Displays the
    /// engine's message verbatim.
    #[error("{message}")]
    Execution {
        message: String,
        traceback: Option<String>,
    },
    /// The engine could not be reached or exited abnormally.
    #[error("execution engine unavailable: {0}")]
    Transport(String),
    /// The engine answered with something that is not a run response.
    #[error("malformed engine response: {0}")]
    Protocol(String),
}

impl RunError {
    pub fn traceback(&self) -> Option<&str> {
        match self {
            RunError::Execution { traceback, .. } => traceback.as_deref(),
            _ => None,
        }
    }
}

/// Everything a successful run hands to the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutput {
    pub log: ExecutionLog,
    pub nn_models: Vec<NeuralNetworkDescriptor>,
    /// Recursive function names as detected by the engine. `None` when the
    /// engine does not report them.
    pub recursive_funcs: Option<Vec<String>>,
}

/// Runs source text under the tracer.
///
/// One request resolves to one complete result. Callers serialize requests;
/// implementations need not handle overlapping runs.
#[allow(async_fn_in_trait)]
pub trait ExecutionEngine {
    async fn run(&self, source: &str) -> Result<RunOutput, RunError>;
}
