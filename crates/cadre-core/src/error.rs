use crate::task::StepOutcome;
use thiserror::Error;

/// A convenience `Result` alias using [`CadreError`].
pub type CadreResult<T> = Result<T, CadreError>;

/// Top-level error type for the cadre orchestrator.
///
/// The first four variants form the failure taxonomy of the engine: capability
/// and lookup failures are surfaced immediately, delivery failures are isolated
/// per recipient, and execution failures are recorded then handed back to the
/// caller.
#[derive(Error, Debug)]
pub enum CadreError {
    /// An action outside an agent's capability set, or a delegation target the
    /// agent is not allowed to address.
    #[error("Capability error: {0}")]
    Capability(String),

    /// Unknown agent, task, workflow, or message id.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A message handler failed while processing a delivered message.
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// A role's action logic failed.
    #[error("Task execution error: {0}")]
    TaskExecution(String),

    /// A workflow step failed; remaining steps of that run were skipped.
    #[error("Workflow '{workflow}' failed at step '{step}': {reason}")]
    WorkflowStep {
        /// Workflow id.
        workflow: String,
        /// Id of the failing step.
        step: String,
        /// Error text of the failing step.
        reason: String,
        /// Outcomes of the steps that finished before the failure, in order.
        /// They are not rolled back.
        completed: Vec<StepOutcome>,
    },

    /// Invalid role or workflow descriptors.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CadreError {
    /// Shorthand for a [`CadreError::NotFound`] naming the kind of entity.
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{kind} '{id}'"))
    }
}
