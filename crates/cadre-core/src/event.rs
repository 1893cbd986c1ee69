use crate::message::{MessageType, Recipient};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Structured event emitted by the engine for presentation layers.
///
/// Events flow one way: sinks observe them and never feed back into engine state.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CoreEvent {
    /// A message was recorded in bus history.
    MessageSent {
        message_id: Uuid,
        /// Sending agent id.
        from: String,
        to: Recipient,
        message_type: MessageType,
    },
    /// A handler accepted a message.
    MessageDelivered {
        message_id: Uuid,
        /// Agent whose handler ran.
        recipient: String,
        message_type: MessageType,
    },
    /// A message was held for a recipient with no subscriber yet.
    MessageQueued {
        message_id: Uuid,
        recipient: String,
    },
    /// A handler returned an error or panicked. Delivery to other recipients
    /// went ahead.
    DeliveryFailed {
        message_id: Uuid,
        recipient: String,
        /// Handler error text.
        error: String,
    },
    /// A ledger task moved to a new status.
    TaskStatusChanged {
        task_id: Uuid,
        /// Assignee, when the task has one.
        agent_id: Option<String>,
        /// New status, in its display form (`in_progress`, `completed`, ...).
        status: String,
        /// Block reason for failed tasks.
        detail: Option<String>,
    },
    /// A workflow step is about to run.
    WorkflowStepStarted {
        /// Workflow id.
        workflow: String,
        /// Step id.
        step: String,
        agent_id: String,
    },
    /// A workflow step finished, successfully or not.
    WorkflowStepFinished {
        /// Workflow id.
        workflow: String,
        /// Step id.
        step: String,
        agent_id: String,
        success: bool,
    },
}

/// Output sink for [`CoreEvent`]s.
pub trait EventSink: Send + Sync {
    /// Observe one event. Must not block or publish on the bus.
    fn emit(&self, event: &CoreEvent);
}

/// Forwards every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &CoreEvent) {
        match event {
            CoreEvent::MessageSent {
                message_id,
                from,
                to,
                message_type,
            } => debug!(%message_id, %from, %to, %message_type, "message sent"),
            CoreEvent::MessageDelivered {
                message_id,
                recipient,
                message_type,
            } => debug!(%message_id, %recipient, %message_type, "message delivered"),
            CoreEvent::MessageQueued {
                message_id,
                recipient,
            } => debug!(%message_id, %recipient, "message queued for offline recipient"),
            CoreEvent::DeliveryFailed {
                message_id,
                recipient,
                error,
            } => warn!(%message_id, %recipient, %error, "message delivery failed"),
            CoreEvent::TaskStatusChanged {
                task_id,
                agent_id,
                status,
                detail,
            } => info!(%task_id, agent_id = ?agent_id, %status, detail = ?detail, "task status changed"),
            CoreEvent::WorkflowStepStarted {
                workflow,
                step,
                agent_id,
            } => info!(%workflow, %step, %agent_id, "workflow step started"),
            CoreEvent::WorkflowStepFinished {
                workflow,
                step,
                agent_id,
                success,
            } => info!(%workflow, %step, %agent_id, success, "workflow step finished"),
        }
    }
}
