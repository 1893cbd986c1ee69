use crate::behavior::RoleBehavior;
use crate::types::{AgentProfile, AgentSnapshot, AgentStatus, AgentTask, StepOutcome, WorkflowStep};
use async_trait::async_trait;
use cadre_core::{
    BoundedHistory, CadreError, CadreResult, Message, MessageBus, MessageHandler, MessageType,
    Recipient, TaskAssignment, TaskCompletion, TaskFailure,
};
use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Default number of finished tasks an agent remembers.
pub const DEFAULT_AGENT_HISTORY: usize = 100;

/// A capability-gated actor connected to the shared [`MessageBus`].
pub struct Agent {
    id: String,
    name: String,
    role: String,
    capabilities: HashSet<String>,
    delegates: HashSet<String>,
    reports_to: Option<String>,
    workflows: Vec<String>,
    prompts: BTreeMap<String, String>,
    status: RwLock<AgentStatus>,
    current_task: RwLock<Option<Uuid>>,
    history: Mutex<BoundedHistory<AgentTask>>,
    bus: Arc<MessageBus>,
    behavior: Arc<dyn RoleBehavior>,
}

impl Agent {
    /// Build an idle agent from `profile`. Capabilities and delegation targets
    /// are fixed from here on.
    pub fn new(
        profile: &AgentProfile,
        behavior: Arc<dyn RoleBehavior>,
        bus: Arc<MessageBus>,
        history_capacity: usize,
    ) -> Self {
        info!(agent_id = %profile.id, role = %profile.role, "Creating agent");
        Self {
            id: profile.id.clone(),
            name: profile.name.clone(),
            role: profile.role.clone(),
            capabilities: profile.capabilities.iter().cloned().collect(),
            delegates: profile.can_delegate_to.iter().cloned().collect(),
            reports_to: profile.reports_to.clone(),
            workflows: profile.workflows.clone(),
            prompts: profile.prompts.clone(),
            status: RwLock::new(AgentStatus::Idle),
            current_task: RwLock::new(None),
            history: Mutex::new(BoundedHistory::new(history_capacity)),
            bus,
            behavior,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn reports_to(&self) -> Option<&str> {
        self.reports_to.as_deref()
    }

    pub fn workflows(&self) -> &[String] {
        &self.workflows
    }

    /// Prompt text configured under `key` in the profile.
    pub fn prompt(&self, key: &str) -> Option<&str> {
        self.prompts.get(key).map(String::as_str)
    }

    /// Current coarse state.
    pub fn status(&self) -> AgentStatus {
        *self.status.read()
    }

    /// Id of the private task record being executed, if any.
    pub fn current_task(&self) -> Option<Uuid> {
        *self.current_task.read()
    }

    /// The shared bus this agent publishes on.
    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// Whether `action` is in the capability set.
    pub fn has_capability(&self, action: &str) -> bool {
        self.capabilities.contains(action)
    }

    /// Whether `agent_id` is a delegation target.
    pub fn can_delegate_to(&self, agent_id: &str) -> bool {
        self.delegates.contains(agent_id)
    }

    /// Delegation targets, sorted.
    pub fn delegates(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.delegates.iter().cloned().collect();
        targets.sort();
        targets
    }

    /// Finished tasks, oldest-first.
    pub fn task_history(&self) -> Vec<AgentTask> {
        self.history.lock().iter().cloned().collect()
    }

    fn set_status(&self, status: AgentStatus) {
        *self.status.write() = status;
    }

    /// Run the role's initialization hook.
    pub async fn initialize(&self) -> CadreResult<()> {
        self.behavior.initialize(self).await?;
        info!(agent_id = %self.id, "Agent initialized");
        Ok(())
    }

    /// Execute `action` through the role behavior.
    ///
    /// Fails with [`CadreError::Capability`] without touching any state if the
    /// action is not declared. Otherwise the agent is `working` for the
    /// duration and always returns to `idle`; a behavior failure is recorded
    /// as a blocked task and returned as [`CadreError::TaskExecution`].
    pub async fn execute_task(
        &self,
        action: &str,
        description: &str,
    ) -> CadreResult<serde_json::Value> {
        if !self.has_capability(action) {
            return Err(CadreError::Capability(format!(
                "agent '{}' does not have capability '{}'",
                self.id, action
            )));
        }

        let mut task = AgentTask::new(action, description);
        let _working = WorkingGuard::enter(self, task.id);
        info!(agent_id = %self.id, task_id = %task.id, action = %action, "Executing task");

        let run = self
            .behavior
            .perform_action(self, action, description, &task);
        let outcome = AssertUnwindSafe(run)
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(CadreError::TaskExecution(format!(
                    "role '{}' panicked while performing '{}'",
                    self.role, action
                )))
            });

        let result = match outcome {
            Ok(value) => {
                task.complete(value.clone());
                info!(agent_id = %self.id, task_id = %task.id, "Task completed");
                Ok(value)
            }
            Err(e) => {
                let e = match e {
                    CadreError::TaskExecution(_) => e,
                    other => CadreError::TaskExecution(other.to_string()),
                };
                error!(agent_id = %self.id, task_id = %task.id, error = %e, "Task failed");
                task.block(e.to_string());
                Err(e)
            }
        };

        self.history.lock().push(task);
        result
    }

    /// Run one workflow step through the role's workflow hook.
    pub async fn execute_workflow_step(
        &self,
        step: &WorkflowStep,
        input: &serde_json::Value,
        previous: &[StepOutcome],
    ) -> CadreResult<serde_json::Value> {
        self.behavior
            .execute_workflow_step(self, step, input, previous)
            .await
    }

    // --- Messaging ---

    /// Publish a new message from this agent. Returns the message id.
    pub async fn send_message(
        &self,
        to: Recipient,
        message_type: MessageType,
        payload: serde_json::Value,
    ) -> CadreResult<Uuid> {
        let message = Message::new(&self.id, to, message_type, payload);
        self.bus.publish(message).await
    }

    /// Publish a reply to `original`, addressed to its sender.
    pub async fn reply_to(
        &self,
        original: &Message,
        message_type: MessageType,
        payload: serde_json::Value,
    ) -> CadreResult<Uuid> {
        let message = Message::reply(original, &self.id, message_type, payload);
        self.bus.publish(message).await
    }

    /// Publish to every subscribed agent except this one.
    pub async fn broadcast(
        &self,
        message_type: MessageType,
        payload: serde_json::Value,
    ) -> CadreResult<Uuid> {
        self.send_message(Recipient::Broadcast, message_type, payload)
            .await
    }

    /// Send a task assignment to `agent_id` and return the generated task id.
    ///
    /// Completion is not tracked here; the target answers with a completion or
    /// error reply that arrives through this agent's handlers.
    pub async fn delegate_to(
        &self,
        agent_id: &str,
        action: &str,
        description: &str,
    ) -> CadreResult<Uuid> {
        self.ensure_delegate(agent_id)?;

        let assignment = TaskAssignment {
            task_id: Uuid::new_v4(),
            action: action.to_string(),
            description: description.to_string(),
        };
        let task_id = assignment.task_id;
        self.send_message(
            Recipient::agent(agent_id),
            MessageType::TaskAssignment,
            serde_json::to_value(&assignment)?,
        )
        .await?;

        info!(agent_id = %self.id, target = %agent_id, task_id = %task_id, action = %action, "Delegated task");
        Ok(task_id)
    }

    /// Ask `agent_id` for a review and wait (status `waiting`) for feedback.
    pub async fn request_review(
        &self,
        agent_id: &str,
        payload: serde_json::Value,
    ) -> CadreResult<Uuid> {
        self.ensure_delegate(agent_id)?;
        self.set_status(AgentStatus::Waiting);
        let sent = self
            .send_message(Recipient::agent(agent_id), MessageType::ReviewRequest, payload)
            .await;
        if sent.is_err() {
            self.set_status(AgentStatus::Idle);
        }
        sent
    }

    fn ensure_delegate(&self, agent_id: &str) -> CadreResult<()> {
        if self.can_delegate_to(agent_id) {
            Ok(())
        } else {
            Err(CadreError::Capability(format!(
                "agent '{}' may not delegate to '{}'",
                self.id, agent_id
            )))
        }
    }

    // --- Dispatch ---

    /// Route a delivered message to the handler for its type.
    pub async fn handle_message(&self, message: Message) -> CadreResult<()> {
        let behavior = &self.behavior;
        match message.message_type {
            MessageType::TaskAssignment => self.on_task_assignment(&message).await,
            MessageType::ReviewRequest => behavior.on_review_request(self, &message).await,
            MessageType::ReviewFeedback => {
                if self.status() == AgentStatus::Waiting {
                    self.set_status(AgentStatus::Idle);
                }
                behavior.on_review_feedback(self, &message).await
            }
            MessageType::Question => behavior.on_question(self, &message).await,
            MessageType::StatusUpdate => behavior.on_status_update(self, &message).await,
            MessageType::Completion => behavior.on_completion(self, &message).await,
            MessageType::Error => behavior.on_error(self, &message).await,
            MessageType::Unknown => {
                warn!(
                    agent_id = %self.id,
                    message_id = %message.id,
                    from = %message.from,
                    "Ignoring message of unknown type"
                );
                Ok(())
            }
        }
    }

    /// Execute an assigned task and report back to the sender.
    async fn on_task_assignment(&self, message: &Message) -> CadreResult<()> {
        let assignment: TaskAssignment = match serde_json::from_value(message.payload.clone()) {
            Ok(assignment) => assignment,
            Err(e) => {
                let failure = TaskFailure {
                    task_id: None,
                    error: format!("malformed task assignment: {e}"),
                };
                self.reply_to(message, MessageType::Error, serde_json::to_value(&failure)?)
                    .await?;
                return Ok(());
            }
        };

        match self
            .execute_task(&assignment.action, &assignment.description)
            .await
        {
            Ok(result) => {
                let completion = TaskCompletion {
                    task_id: assignment.task_id,
                    result,
                };
                self.reply_to(
                    message,
                    MessageType::Completion,
                    serde_json::to_value(&completion)?,
                )
                .await?;
            }
            Err(e) => {
                let failure = TaskFailure {
                    task_id: Some(assignment.task_id),
                    error: e.to_string(),
                };
                self.reply_to(message, MessageType::Error, serde_json::to_value(&failure)?)
                    .await?;
            }
        }
        Ok(())
    }

    /// Read-only view for presentation layers.
    pub fn snapshot(&self, recent_tasks: usize) -> AgentSnapshot {
        let mut capabilities: Vec<String> = self.capabilities.iter().cloned().collect();
        capabilities.sort();
        AgentSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            role: self.role.clone(),
            status: self.status(),
            current_task: self.current_task(),
            capabilities,
            can_delegate_to: self.delegates(),
            reports_to: self.reports_to.clone(),
            recent_tasks: self.history.lock().latest(recent_tasks).cloned().collect(),
        }
    }
}

/// Marks the agent `working` on a task and puts it back to `idle` when
/// dropped, so a cancelled execution cannot leave it busy.
struct WorkingGuard<'a> {
    agent: &'a Agent,
}

impl<'a> WorkingGuard<'a> {
    fn enter(agent: &'a Agent, task_id: Uuid) -> Self {
        agent.set_status(AgentStatus::Working);
        *agent.current_task.write() = Some(task_id);
        Self { agent }
    }
}

impl Drop for WorkingGuard<'_> {
    fn drop(&mut self) {
        *self.agent.current_task.write() = None;
        self.agent.set_status(AgentStatus::Idle);
    }
}

#[async_trait]
impl MessageHandler for Agent {
    async fn handle(&self, message: Message) -> CadreResult<()> {
        self.handle_message(message).await
    }
}
