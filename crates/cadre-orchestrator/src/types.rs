use cadre_core::{Priority, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A task in the orchestrator's ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Action name executed by the assignee, when the task maps to one.
    #[serde(default)]
    pub action: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub assignee: Option<String>,
    pub creator: String,
    #[serde(default)]
    pub dependencies: Vec<Uuid>,
    /// Insertion sequence, used to keep candidate selection stable.
    #[serde(default)]
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub blocked_reason: Option<String>,
}

impl Task {
    /// A pending, unassigned, medium-priority task created by `user`.
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: String::new(),
            action: None,
            status: TaskStatus::Pending,
            priority: Priority::default(),
            assignee: None,
            creator: "user".to_string(),
            dependencies: Vec::new(),
            seq: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            result: None,
            blocked_reason: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn assigned_to(mut self, agent_id: impl Into<String>) -> Self {
        self.assignee = Some(agent_id.into());
        self
    }

    pub fn created_by(mut self, creator: impl Into<String>) -> Self {
        self.creator = creator.into();
        self
    }

    /// Tasks that must complete before this one is selectable.
    pub fn with_dependencies(mut self, deps: Vec<Uuid>) -> Self {
        self.dependencies = deps;
        self
    }

    /// Whether `agent_id` may pick this task: unassigned tasks are open to
    /// everyone, assigned ones only to their assignee.
    pub fn is_available_to(&self, agent_id: Option<&str>) -> bool {
        match (&self.assignee, agent_id) {
            (None, _) => true,
            (Some(assignee), Some(agent)) => assignee == agent,
            (Some(_), None) => false,
        }
    }
}

/// Status-specific fields recorded by
/// [`TaskQueue::update_status`](crate::TaskQueue::update_status).
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    /// Stored on `completed`.
    pub result: Option<serde_json::Value>,
    /// Stored on `blocked`.
    pub reason: Option<String>,
    /// Reassigns the task when set.
    pub assignee: Option<String>,
}

impl TaskUpdate {
    /// Update carrying a completion result.
    pub fn result(result: serde_json::Value) -> Self {
        Self {
            result: Some(result),
            ..Self::default()
        }
    }

    /// Update carrying a block reason.
    pub fn reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Update that (re)assigns the task.
    pub fn assignee(agent_id: impl Into<String>) -> Self {
        Self {
            assignee: Some(agent_id.into()),
            ..Self::default()
        }
    }
}

/// Filter for [`TaskQueue::get_tasks`](crate::TaskQueue::get_tasks). Empty
/// fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub assignee: Option<String>,
    pub priority: Option<Priority>,
    pub creator: Option<String>,
}

impl TaskFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_assignee(mut self, agent_id: impl Into<String>) -> Self {
        self.assignee = Some(agent_id.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }

    /// Whether `task` passes every set criterion.
    pub fn matches(&self, task: &Task) -> bool {
        self.status.map_or(true, |s| task.status == s)
            && self
                .assignee
                .as_deref()
                .map_or(true, |a| task.assignee.as_deref() == Some(a))
            && self.priority.map_or(true, |p| task.priority == p)
            && self.creator.as_deref().map_or(true, |c| task.creator == c)
    }
}

/// Aggregate ledger counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: usize,
    pub by_status: BTreeMap<TaskStatus, usize>,
    pub by_priority: BTreeMap<Priority, usize>,
    /// Pending tasks whose dependencies are all completed.
    pub ready: usize,
}

impl TaskStats {
    /// Number of tasks in `status`.
    pub fn count(&self, status: TaskStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_task_builder() {
        let task = Task::new("Ship parser")
            .with_action("implement")
            .with_priority(Priority::High)
            .assigned_to("developer")
            .created_by("analyst");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.action.as_deref(), Some("implement"));
        assert_eq!(task.creator, "analyst");
    }

    #[test]
    fn test_availability() {
        let open = Task::new("open");
        let owned = Task::new("owned").assigned_to("dev");
        assert!(open.is_available_to(None));
        assert!(open.is_available_to(Some("dev")));
        assert!(owned.is_available_to(Some("dev")));
        assert!(!owned.is_available_to(Some("qa")));
        assert!(!owned.is_available_to(None));
    }

    #[test]
    fn test_filter_matches() {
        let task = Task::new("t").assigned_to("dev").with_priority(Priority::Low);
        assert!(TaskFilter::new().matches(&task));
        assert!(TaskFilter::new().with_assignee("dev").matches(&task));
        assert!(!TaskFilter::new().with_priority(Priority::High).matches(&task));
        assert!(!TaskFilter::new()
            .with_status(TaskStatus::Completed)
            .matches(&task));
    }

    #[test]
    fn test_task_deserializes_with_defaults() {
        let now = Utc::now();
        let json = serde_json::json!({
            "id": Uuid::new_v4(),
            "title": "t",
            "status": "blocked",
            "creator": "user",
            "created_at": now,
            "updated_at": now,
        });
        let task: Task = serde_json::from_value(json).unwrap();
        assert_eq!(task.priority, Priority::Medium);
        assert!(task.dependencies.is_empty());
    }

    #[test]
    fn test_stats_serialize_keys_as_names() {
        let mut stats = TaskStats::default();
        stats.by_status.insert(TaskStatus::InProgress, 2);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["by_status"]["in_progress"], 2);
    }
}
