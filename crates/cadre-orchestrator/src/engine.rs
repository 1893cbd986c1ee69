use crate::config::{TeamConfig, WorkflowDescriptor};
use crate::monitor::{ActivityMonitor, AgentMetrics};
use crate::task_queue::TaskQueue;
use crate::types::{Task, TaskFilter, TaskStats, TaskUpdate};
use cadre_agent::{register_builtin_roles, Agent, AgentSnapshot, RoleRegistry, StepOutcome};
use cadre_core::{
    CadreError, CadreResult, CoreEvent, EventSink, Message, MessageBus, Priority, TaskStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Number of recent tasks included in a single-agent status report.
const AGENT_STATUS_RECENT_TASKS: usize = 10;

/// Identity of one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub workflows: Vec<String>,
}

/// Read-only snapshot returned by [`Orchestrator::get_status`].
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub session: SessionInfo,
    pub agents: Vec<String>,
    pub task_stats: TaskStats,
    pub recent_messages: Vec<Message>,
    pub activity: AgentMetrics,
}

/// Read-only view of one agent returned by [`Orchestrator::show_agent_status`].
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatusReport {
    pub agent: AgentSnapshot,
    pub metrics: AgentMetrics,
    pub pending_messages: usize,
    pub open_tasks: usize,
}

/// Composition root: builds agents from the team configuration, connects them
/// to one bus, routes commands, and runs workflows against the task ledger.
pub struct Orchestrator {
    pub(crate) config: TeamConfig,
    registry: RoleRegistry,
    agents: BTreeMap<String, Arc<Agent>>,
    pub(crate) bus: Arc<MessageBus>,
    pub(crate) queue: Arc<RwLock<TaskQueue>>,
    monitor: Arc<ActivityMonitor>,
    pub(crate) session: SessionInfo,
}

impl Orchestrator {
    /// Create an orchestrator for `config`, resolving roles through `registry`.
    ///
    /// Agents are built by [`initialize`](Self::initialize).
    pub fn new(config: TeamConfig, registry: RoleRegistry) -> CadreResult<Self> {
        config.validate()?;

        let monitor = Arc::new(ActivityMonitor::new());
        let bus = Arc::new(
            MessageBus::new(config.settings.history_capacity).with_sink(monitor.clone()),
        );
        let session = SessionInfo {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            workflows: config.workflows.keys().cloned().collect(),
        };

        Ok(Self {
            config,
            registry,
            agents: BTreeMap::new(),
            bus,
            queue: Arc::new(RwLock::new(TaskQueue::new())),
            monitor,
            session,
        })
    }

    /// Create an orchestrator with the built-in roles registered.
    pub fn with_builtin_roles(config: TeamConfig) -> CadreResult<Self> {
        let mut registry = RoleRegistry::new();
        register_builtin_roles(&mut registry, config.settings.test_timeout());
        Self::new(config, registry)
    }

    /// Build one agent per descriptor, run its initialization hook, and
    /// subscribe it to the bus.
    ///
    /// Every role is resolved before any agent is created, so an unknown role
    /// leaves the orchestrator empty.
    pub async fn initialize(&mut self) -> CadreResult<()> {
        if !self.agents.is_empty() {
            warn!(session_id = %self.session.id, "Orchestrator already initialized");
            return Ok(());
        }

        let mut behaviors = Vec::with_capacity(self.config.agents.len());
        for profile in self.config.agents.values() {
            behaviors.push((profile, self.registry.build(profile)?));
        }

        let mut agents = BTreeMap::new();
        for (profile, behavior) in behaviors {
            let agent = Arc::new(Agent::new(
                profile,
                behavior,
                self.bus.clone(),
                self.config.settings.agent_history_capacity,
            ));
            agent.initialize().await?;
            agents.insert(profile.id.clone(), agent);
        }
        for (id, agent) in &agents {
            self.bus.subscribe(id.clone(), agent.clone()).await;
        }
        self.agents = agents;

        info!(
            session_id = %self.session.id,
            agents = self.agents.len(),
            workflows = self.config.workflows.len(),
            "Orchestrator initialized"
        );
        Ok(())
    }

    /// The team configuration this orchestrator was built from.
    pub fn config(&self) -> &TeamConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// The shared task ledger.
    pub fn queue(&self) -> &Arc<RwLock<TaskQueue>> {
        &self.queue
    }

    /// Per-agent activity counters.
    pub fn monitor(&self) -> &Arc<ActivityMonitor> {
        &self.monitor
    }

    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    /// Look up an initialized agent.
    pub fn agent(&self, agent_id: &str) -> CadreResult<&Arc<Agent>> {
        self.agents
            .get(agent_id)
            .ok_or_else(|| CadreError::not_found("agent", agent_id))
    }

    fn workflow(&self, workflow_id: &str) -> CadreResult<&WorkflowDescriptor> {
        self.config
            .workflows
            .get(workflow_id)
            .ok_or_else(|| CadreError::not_found("workflow", workflow_id))
    }

    /// Record a new in-progress ledger entry for `agent_id`.
    async fn open_task(&self, task: Task, agent_id: &str) -> CadreResult<Uuid> {
        let id = {
            let mut queue = self.queue.write().await;
            let id = queue.create_task(task)?;
            queue.update_status(id, TaskStatus::InProgress, TaskUpdate::assignee(agent_id))?;
            id
        };
        self.monitor.emit(&CoreEvent::TaskStatusChanged {
            task_id: id,
            agent_id: Some(agent_id.to_string()),
            status: TaskStatus::InProgress.to_string(),
            detail: None,
        });
        Ok(id)
    }

    /// Close a ledger entry with the outcome of the agent's execution.
    async fn close_task(
        &self,
        id: Uuid,
        agent_id: &str,
        outcome: &CadreResult<serde_json::Value>,
    ) -> CadreResult<()> {
        let (status, update, detail) = match outcome {
            Ok(value) => (TaskStatus::Completed, TaskUpdate::result(value.clone()), None),
            Err(e) => (
                TaskStatus::Blocked,
                TaskUpdate::reason(e.to_string()),
                Some(e.to_string()),
            ),
        };
        self.queue.write().await.update_status(id, status, update)?;
        self.monitor.emit(&CoreEvent::TaskStatusChanged {
            task_id: id,
            agent_id: Some(agent_id.to_string()),
            status: status.to_string(),
            detail,
        });
        Ok(())
    }

    /// Run `action` on `agent_id`, auditing it as a ledger task.
    pub async fn execute_task(
        &self,
        agent_id: &str,
        action: &str,
        description: &str,
    ) -> CadreResult<serde_json::Value> {
        let agent = self.agent(agent_id)?;
        if !agent.has_capability(action) {
            return Err(CadreError::Capability(format!(
                "agent '{agent_id}' does not have capability '{action}'"
            )));
        }

        let task = Task::new(action)
            .with_description(description)
            .with_action(action)
            .with_priority(Priority::High)
            .created_by("orchestrator");
        let task_id = self.open_task(task, agent_id).await?;
        info!(task_id = %task_id, agent_id = %agent_id, action = %action, "Executing task");

        let start = Instant::now();
        let outcome = agent.execute_task(action, description).await;
        self.close_task(task_id, agent_id, &outcome).await?;

        match &outcome {
            Ok(_) => info!(
                task_id = %task_id,
                duration_ms = start.elapsed().as_millis() as u64,
                "Task completed"
            ),
            Err(e) => error!(task_id = %task_id, error = %e, "Task failed"),
        }
        outcome
    }

    /// Run every step of `workflow_id` in order on the workflow's agent.
    ///
    /// Each step sees the results of the steps before it. The first failing
    /// step ends the run with [`CadreError::WorkflowStep`]; steps that already
    /// completed stay completed in the ledger.
    pub async fn run_workflow(
        &self,
        workflow_id: &str,
        input: serde_json::Value,
    ) -> CadreResult<Vec<StepOutcome>> {
        let workflow = self.workflow(workflow_id)?;
        let agent = self.agent(&workflow.agent)?;
        let creator = format!("workflow:{workflow_id}");

        info!(
            workflow = %workflow_id,
            agent_id = %agent.id(),
            steps = workflow.steps.len(),
            "Starting workflow"
        );

        let mut outcomes: Vec<StepOutcome> = Vec::with_capacity(workflow.steps.len());
        let mut previous_task: Option<Uuid> = None;

        for step in &workflow.steps {
            let task = Task::new(&step.name)
                .with_description(format!("{} step '{}'", workflow.name, step.id))
                .with_action(&step.id)
                .created_by(&creator)
                .with_dependencies(previous_task.into_iter().collect());
            let task_id = self.open_task(task, agent.id()).await?;
            previous_task = Some(task_id);

            self.monitor.emit(&CoreEvent::WorkflowStepStarted {
                workflow: workflow_id.to_string(),
                step: step.id.clone(),
                agent_id: agent.id().to_string(),
            });

            let outcome = agent.execute_workflow_step(step, &input, &outcomes).await;
            self.close_task(task_id, agent.id(), &outcome).await?;
            self.monitor.emit(&CoreEvent::WorkflowStepFinished {
                workflow: workflow_id.to_string(),
                step: step.id.clone(),
                agent_id: agent.id().to_string(),
                success: outcome.is_ok(),
            });

            match outcome {
                Ok(result) => outcomes.push(StepOutcome {
                    step: step.id.clone(),
                    result,
                }),
                Err(e) => {
                    error!(
                        workflow = %workflow_id,
                        step = %step.id,
                        completed_steps = outcomes.len(),
                        error = %e,
                        "Workflow aborted"
                    );
                    return Err(CadreError::WorkflowStep {
                        workflow: workflow_id.to_string(),
                        step: step.id.clone(),
                        reason: e.to_string(),
                        completed: outcomes,
                    });
                }
            }
        }

        info!(workflow = %workflow_id, steps = outcomes.len(), "Workflow completed");
        Ok(outcomes)
    }

    /// Session metadata, agent ids, ledger stats, and the most recent bus
    /// messages.
    pub async fn get_status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            session: self.session.clone(),
            agents: self.agents.keys().cloned().collect(),
            task_stats: self.queue.read().await.get_stats(),
            recent_messages: self.bus.recent(self.config.settings.recent_messages),
            activity: self.monitor.totals(),
        }
    }

    /// Ledger tasks matching `filter`, in creation order.
    pub async fn list_tasks(&self, filter: &TaskFilter) -> Vec<Task> {
        self.queue
            .read()
            .await
            .get_tasks(filter)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Look up a task by id or by a unique id prefix.
    pub async fn show_task(&self, id: &str) -> CadreResult<Task> {
        let queue = self.queue.read().await;
        if let Ok(uuid) = Uuid::parse_str(id) {
            return queue
                .get_task(uuid)
                .cloned()
                .ok_or_else(|| CadreError::not_found("task", id));
        }
        let mut matches = queue
            .get_tasks(&TaskFilter::default())
            .into_iter()
            .filter(|t| !id.is_empty() && t.id.to_string().starts_with(id));
        match (matches.next(), matches.next()) {
            (Some(task), None) => Ok(task.clone()),
            (Some(_), Some(_)) => Err(CadreError::Config(format!(
                "task id prefix '{id}' is ambiguous"
            ))),
            (None, _) => Err(CadreError::not_found("task", id)),
        }
    }

    /// Every agent, sorted by id, without task history.
    pub fn list_agents(&self) -> Vec<AgentSnapshot> {
        self.agents.values().map(|a| a.snapshot(0)).collect()
    }

    /// Snapshot, counters, and open work for one agent.
    pub async fn show_agent_status(&self, agent_id: &str) -> CadreResult<AgentStatusReport> {
        let agent = self.agent(agent_id)?;
        let open_tasks = self
            .queue
            .read()
            .await
            .get_tasks(&TaskFilter::new().with_assignee(agent_id))
            .into_iter()
            .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::InProgress))
            .count();
        Ok(AgentStatusReport {
            agent: agent.snapshot(AGENT_STATUS_RECENT_TASKS),
            metrics: self.monitor.agent_metrics(agent_id),
            pending_messages: self.bus.pending_count(agent_id),
            open_tasks,
        })
    }

    /// Unsubscribe every agent from the bus. Ledger and history are kept.
    pub fn shutdown(&self) -> usize {
        let removed = self
            .agents
            .keys()
            .filter(|id| self.bus.unsubscribe(id))
            .count();
        info!(session_id = %self.session.id, agents = removed, "Orchestrator shut down");
        removed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use cadre_agent::{AgentProfile, AgentStatus, AgentTask, RoleBehavior};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl RoleBehavior for Echo {
        fn role(&self) -> &str {
            "echo"
        }

        async fn perform_action(
            &self,
            _agent: &Agent,
            action: &str,
            description: &str,
            _task: &AgentTask,
        ) -> CadreResult<serde_json::Value> {
            if action == "fail" {
                return Err(CadreError::TaskExecution("asked to fail".into()));
            }
            Ok(serde_json::json!({ "action": action, "echo": description }))
        }
    }

    fn config() -> TeamConfig {
        let mut config = TeamConfig::default();
        let profile = AgentProfile::new("solo", "echo").with_capabilities(["say", "fail"]);
        config.agents.insert(profile.id.clone(), profile);
        config
    }

    fn registry() -> RoleRegistry {
        let mut registry = RoleRegistry::new();
        registry.register("echo", |_: &AgentProfile| {
            Arc::new(Echo) as Arc<dyn RoleBehavior>
        });
        registry
    }

    async fn orchestrator() -> Orchestrator {
        let mut orchestrator = Orchestrator::new(config(), registry()).unwrap();
        orchestrator.initialize().await.unwrap();
        orchestrator
    }

    #[tokio::test]
    async fn test_initialize_subscribes_agents() {
        let orchestrator = orchestrator().await;
        assert!(orchestrator.bus().is_subscribed("solo"));
        assert_eq!(orchestrator.get_status().await.agents, vec!["solo"]);
    }

    #[tokio::test]
    async fn test_unknown_role_fails_initialize() {
        let mut orchestrator = Orchestrator::new(config(), RoleRegistry::new()).unwrap();
        let err = orchestrator.initialize().await.unwrap_err();
        assert!(matches!(err, CadreError::Config(_)));
        assert!(orchestrator.list_agents().is_empty());
    }

    #[tokio::test]
    async fn test_execute_task_audits_completion() {
        let orchestrator = orchestrator().await;
        let result = orchestrator.execute_task("solo", "say", "hi").await.unwrap();
        assert_eq!(result["echo"], "hi");

        let tasks = orchestrator.list_tasks(&TaskFilter::default()).await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Completed);
        assert_eq!(tasks[0].assignee.as_deref(), Some("solo"));
        assert_eq!(tasks[0].result.as_ref(), Some(&result));
        assert_eq!(orchestrator.monitor().agent_metrics("solo").tasks_completed, 1);
    }

    #[tokio::test]
    async fn test_execute_task_failure_blocks_entry() {
        let orchestrator = orchestrator().await;
        let err = orchestrator.execute_task("solo", "fail", "").await.unwrap_err();
        assert!(matches!(err, CadreError::TaskExecution(_)));

        let blocked = orchestrator
            .list_tasks(&TaskFilter::new().with_status(TaskStatus::Blocked))
            .await;
        assert_eq!(blocked.len(), 1);
        assert!(blocked[0]
            .blocked_reason
            .as_deref()
            .unwrap()
            .contains("asked to fail"));
        assert_eq!(
            orchestrator.agent("solo").unwrap().status(),
            AgentStatus::Idle
        );
    }

    #[tokio::test]
    async fn test_execute_task_rejections_leave_no_entry() {
        let orchestrator = orchestrator().await;
        assert!(matches!(
            orchestrator.execute_task("ghost", "say", "").await,
            Err(CadreError::NotFound(_))
        ));
        assert!(matches!(
            orchestrator.execute_task("solo", "deploy", "").await,
            Err(CadreError::Capability(_))
        ));
        assert!(orchestrator.queue().read().await.is_empty());
    }

    #[tokio::test]
    async fn test_show_task_by_prefix() {
        let orchestrator = orchestrator().await;
        orchestrator.execute_task("solo", "say", "x").await.unwrap();
        let task = orchestrator.list_tasks(&TaskFilter::default()).await[0].clone();

        let full = orchestrator.show_task(&task.id.to_string()).await.unwrap();
        assert_eq!(full.id, task.id);
        let prefix = &task.id.to_string()[..8];
        assert_eq!(orchestrator.show_task(prefix).await.unwrap().id, task.id);
        assert!(matches!(
            orchestrator.show_task(&Uuid::new_v4().to_string()).await,
            Err(CadreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_agent_status_report() {
        let orchestrator = orchestrator().await;
        orchestrator.execute_task("solo", "say", "x").await.unwrap();
        let report = orchestrator.show_agent_status("solo").await.unwrap();
        assert_eq!(report.agent.recent_tasks.len(), 1);
        assert_eq!(report.open_tasks, 0);
        assert_eq!(report.metrics.tasks_completed, 1);
        assert!(orchestrator.show_agent_status("ghost").await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_unsubscribes() {
        let orchestrator = orchestrator().await;
        assert_eq!(orchestrator.shutdown(), 1);
        assert!(orchestrator.bus().subscribers().is_empty());
        assert_eq!(orchestrator.shutdown(), 0);
    }
}
