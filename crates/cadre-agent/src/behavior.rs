use crate::agent::Agent;
use crate::types::{AgentTask, StepOutcome, WorkflowStep};
use async_trait::async_trait;
use cadre_core::{CadreResult, Message};
use tracing::debug;

/// Role-specific logic plugged into an [`Agent`].
///
/// Only [`perform_action`](RoleBehavior::perform_action) is required. Message
/// hooks default to logging the message; task assignments are handled by the
/// agent itself and never reach a hook.
#[async_trait]
pub trait RoleBehavior: Send + Sync {
    /// Role name this behavior was registered under.
    fn role(&self) -> &str;

    /// Called once by the orchestrator before the agent joins the bus.
    async fn initialize(&self, _agent: &Agent) -> CadreResult<()> {
        Ok(())
    }

    /// Run `action`. Capability checks have already passed.
    async fn perform_action(
        &self,
        agent: &Agent,
        action: &str,
        description: &str,
        task: &AgentTask,
    ) -> CadreResult<serde_json::Value>;

    /// Run one workflow step. The default treats the step id as an action and
    /// the input as its description, so it is capability-gated like any task.
    async fn execute_workflow_step(
        &self,
        agent: &Agent,
        step: &WorkflowStep,
        input: &serde_json::Value,
        _previous: &[StepOutcome],
    ) -> CadreResult<serde_json::Value> {
        agent.execute_task(&step.id, &describe(input)).await
    }

    async fn on_review_request(&self, agent: &Agent, message: &Message) -> CadreResult<()> {
        log_unhandled(agent, message);
        Ok(())
    }

    async fn on_review_feedback(&self, agent: &Agent, message: &Message) -> CadreResult<()> {
        log_unhandled(agent, message);
        Ok(())
    }

    async fn on_question(&self, agent: &Agent, message: &Message) -> CadreResult<()> {
        log_unhandled(agent, message);
        Ok(())
    }

    async fn on_status_update(&self, agent: &Agent, message: &Message) -> CadreResult<()> {
        log_unhandled(agent, message);
        Ok(())
    }

    async fn on_completion(&self, agent: &Agent, message: &Message) -> CadreResult<()> {
        log_unhandled(agent, message);
        Ok(())
    }

    async fn on_error(&self, agent: &Agent, message: &Message) -> CadreResult<()> {
        log_unhandled(agent, message);
        Ok(())
    }
}

fn log_unhandled(agent: &Agent, message: &Message) {
    debug!(
        agent_id = %agent.id(),
        from = %message.from,
        message_type = %message.message_type,
        "Message received"
    );
}

/// Render a JSON input as task description text: strings verbatim, anything
/// else as compact JSON.
pub fn describe(input: &serde_json::Value) -> String {
    match input {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
