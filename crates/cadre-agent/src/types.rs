pub use cadre_core::StepOutcome;
use cadre_core::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Static descriptor an agent is built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Filled from the table key when loaded from a team file.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Role name, resolved through the [`RoleRegistry`](crate::RoleRegistry).
    pub role: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Agent ids this agent may address via delegation.
    #[serde(default)]
    pub can_delegate_to: Vec<String>,
    #[serde(default)]
    pub reports_to: Option<String>,
    /// Workflow ids this agent takes part in.
    #[serde(default)]
    pub workflows: Vec<String>,
    #[serde(default)]
    pub prompts: BTreeMap<String, String>,
}

impl AgentProfile {
    /// Profile with no capabilities or delegates, named after its id.
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            role: role.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_delegates<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.can_delegate_to = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn reporting_to(mut self, agent_id: impl Into<String>) -> Self {
        self.reports_to = Some(agent_id.into());
        self
    }
}

/// Coarse agent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Working,
    /// Waiting on feedback from another agent.
    Waiting,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Working => write!(f, "working"),
            AgentStatus::Waiting => write!(f, "waiting"),
        }
    }
}

/// An agent's private record of one executed action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: Uuid,
    pub action: String,
    pub description: String,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl AgentTask {
    /// A fresh in-progress record.
    pub fn new(action: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: action.into(),
            description: description.into(),
            status: TaskStatus::InProgress,
            started_at: Utc::now(),
            finished_at: None,
            result: None,
            error: None,
        }
    }

    /// Mark completed with `result`.
    pub fn complete(&mut self, result: serde_json::Value) {
        self.status = TaskStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.result = Some(result);
    }

    /// Mark blocked with the failure text.
    pub fn block(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Blocked;
        self.finished_at = Some(Utc::now());
        self.error = Some(error.into());
    }
}

/// One named step of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub name: String,
}

impl WorkflowStep {
    /// Step `id`, shown as `name`.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}


/// Read-only view of an agent for presentation layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: String,
    pub name: String,
    pub role: String,
    pub status: AgentStatus,
    pub current_task: Option<Uuid>,
    pub capabilities: Vec<String>,
    pub can_delegate_to: Vec<String>,
    pub reports_to: Option<String>,
    pub recent_tasks: Vec<AgentTask>,
}
