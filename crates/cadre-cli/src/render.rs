//! Plain-text rendering for command output.

use cadre_agent::AgentSnapshot;
use cadre_orchestrator::{AgentStatusReport, OrchestratorStatus, Task};
use std::fmt::Write;

fn short_id(id: &impl ToString) -> String {
    id.to_string().chars().take(8).collect()
}

/// Session, ledger, and recent-message summary.
pub fn status(status: &OrchestratorStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Session {}", status.session.id);
    let _ = writeln!(out, "  started:   {}", status.session.started_at.to_rfc3339());
    let _ = writeln!(out, "  agents:    {}", status.agents.join(", "));
    let _ = writeln!(out, "  workflows: {}", status.session.workflows.join(", "));

    let stats = &status.task_stats;
    let _ = writeln!(out, "Tasks: {} total, {} ready", stats.total, stats.ready);
    for (state, count) in &stats.by_status {
        let _ = writeln!(out, "  {:<12} {count}", state.to_string());
    }

    let _ = writeln!(
        out,
        "Activity: {} completed, {} failed, {} messages",
        status.activity.tasks_completed, status.activity.tasks_failed, status.activity.messages_sent
    );
    if !status.recent_messages.is_empty() {
        let _ = writeln!(out, "Recent messages:");
        for message in &status.recent_messages {
            let _ = writeln!(out, "  {} {}", short_id(&message.id), message.summary());
        }
    }
    out
}

/// One line per agent.
pub fn agents(agents: &[AgentSnapshot]) -> String {
    if agents.is_empty() {
        return "No agents configured.\n".to_string();
    }
    let mut out = String::new();
    for agent in agents {
        let _ = writeln!(
            out,
            "{:<12} {:<10} {:<8} {}",
            agent.id,
            agent.role,
            agent.status.to_string(),
            agent.capabilities.join(", ")
        );
    }
    out
}

/// Detailed report for one agent, with its recent tasks.
pub fn agent(report: &AgentStatusReport) -> String {
    let agent = &report.agent;
    let mut out = String::new();
    let _ = writeln!(out, "{} ({}), role {}", agent.name, agent.id, agent.role);
    let _ = writeln!(out, "  status:       {}", agent.status);
    if let Some(lead) = &agent.reports_to {
        let _ = writeln!(out, "  reports to:   {lead}");
    }
    let _ = writeln!(out, "  capabilities: {}", agent.capabilities.join(", "));
    let _ = writeln!(out, "  delegates:    {}", agent.can_delegate_to.join(", "));
    let _ = writeln!(
        out,
        "  tasks:        {} completed, {} failed, {} open",
        report.metrics.tasks_completed, report.metrics.tasks_failed, report.open_tasks
    );
    let _ = writeln!(
        out,
        "  messages:     {} sent, {} received, {} pending",
        report.metrics.messages_sent, report.metrics.messages_received, report.pending_messages
    );
    for task in &agent.recent_tasks {
        let _ = writeln!(
            out,
            "  - {} {:<12} {}",
            short_id(&task.id),
            task.status.to_string(),
            task.action
        );
    }
    out
}

/// One line per task, plus the reason for blocked ones.
pub fn tasks(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "No tasks.\n".to_string();
    }
    let mut out = String::new();
    for task in tasks {
        let _ = writeln!(
            out,
            "{} {:<12} {:<6} {:<12} {}",
            short_id(&task.id),
            task.status.to_string(),
            task.priority.to_string(),
            task.assignee.as_deref().unwrap_or("-"),
            task.title
        );
        if let Some(reason) = &task.blocked_reason {
            let _ = writeln!(out, "         blocked: {reason}");
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use cadre_core::{Priority, TaskStatus};

    #[test]
    fn test_tasks_table() {
        let mut task = Task::new("Ship it")
            .assigned_to("developer")
            .with_priority(Priority::High);
        task.status = TaskStatus::Blocked;
        task.blocked_reason = Some("tests red".into());

        let text = tasks(&[task.clone()]);
        assert!(text.starts_with(&task.id.to_string()[..8]));
        assert!(text.contains("blocked"));
        assert!(text.contains("developer"));
        assert!(text.contains("blocked: tests red"));
        assert_eq!(tasks(&[]), "No tasks.\n");
    }

    #[test]
    fn test_empty_agents() {
        assert_eq!(agents(&[]), "No agents configured.\n");
    }
}
