use cadre_core::{CoreEvent, EventSink, TaskStatus, TracingSink};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counters tracked per agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    /// Handler failures while this agent was the recipient.
    pub errors: u64,
    pub workflow_steps: u64,
}

impl AgentMetrics {
    fn add(&mut self, other: &AgentMetrics) {
        self.tasks_completed += other.tasks_completed;
        self.tasks_failed += other.tasks_failed;
        self.messages_sent += other.messages_sent;
        self.messages_received += other.messages_received;
        self.errors += other.errors;
        self.workflow_steps += other.workflow_steps;
    }
}

/// Event sink that keeps per-agent activity counters and forwards every event
/// to `tracing`.
#[derive(Default)]
pub struct ActivityMonitor {
    metrics: Mutex<BTreeMap<String, AgentMetrics>>,
    forward: TracingSink,
}

impl ActivityMonitor {
    /// Monitor with no counters, forwarding events to tracing.
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self, agent_id: &str, f: impl FnOnce(&mut AgentMetrics)) {
        let mut metrics = self.metrics.lock();
        f(metrics.entry(agent_id.to_string()).or_default());
    }

    /// Counters for one agent; zero for agents with no recorded activity.
    pub fn agent_metrics(&self, agent_id: &str) -> AgentMetrics {
        self.metrics
            .lock()
            .get(agent_id)
            .copied()
            .unwrap_or_default()
    }

    /// Counters for every agent seen so far, keyed by id.
    pub fn snapshot(&self) -> BTreeMap<String, AgentMetrics> {
        self.metrics.lock().clone()
    }

    /// Sum across all agents.
    pub fn totals(&self) -> AgentMetrics {
        let metrics = self.metrics.lock();
        let mut total = AgentMetrics::default();
        for m in metrics.values() {
            total.add(m);
        }
        total
    }

    /// Drop all counters.
    pub fn reset(&self) {
        self.metrics.lock().clear();
    }
}

impl EventSink for ActivityMonitor {
    fn emit(&self, event: &CoreEvent) {
        match event {
            CoreEvent::MessageSent { from, .. } => self.bump(from, |m| m.messages_sent += 1),
            CoreEvent::MessageDelivered { recipient, .. } => {
                self.bump(recipient, |m| m.messages_received += 1);
            }
            CoreEvent::DeliveryFailed { recipient, .. } => self.bump(recipient, |m| m.errors += 1),
            CoreEvent::TaskStatusChanged {
                agent_id: Some(agent_id),
                status,
                ..
            } => {
                if status == &TaskStatus::Completed.to_string() {
                    self.bump(agent_id, |m| m.tasks_completed += 1);
                } else if status == &TaskStatus::Blocked.to_string() {
                    self.bump(agent_id, |m| m.tasks_failed += 1);
                }
            }
            CoreEvent::WorkflowStepFinished { agent_id, .. } => {
                self.bump(agent_id, |m| m.workflow_steps += 1);
            }
            _ => {}
        }
        self.forward.emit(event);
    }
}
