//! Task ledger, team configuration, and the orchestration engine for cadre.
//!
//! The [`Orchestrator`] builds one agent per configured descriptor, connects
//! them to a shared [`MessageBus`](cadre_core::MessageBus), routes commands to
//! the right agent, and runs statically defined workflows. Every command and
//! workflow step is audited as a [`Task`] in the [`TaskQueue`].
//!
//! # Main types
//!
//! - [`Orchestrator`]: Composition root and command router.
//! - [`TaskQueue`]: Status-bucketed ledger with dependency gating and
//!   priority ordering.
//! - [`TeamConfig`]: Agents, workflows, and settings read from `cadre.toml`.
//! - [`ActivityMonitor`]: Event sink keeping per-agent counters.
//! - [`StateSnapshot`]: JSON export of the ledger and bus history.

/// Orchestration engine.
pub mod engine;
/// Team configuration.
pub mod config;
/// Per-agent activity counters.
pub mod monitor;
/// State export and import.
pub mod snapshot;
/// Task ledger.
pub mod task_queue;
/// Task, filter, and statistics types.
pub mod types;

pub use config::{Settings, TeamConfig, WorkflowDescriptor};
pub use engine::{AgentStatusReport, Orchestrator, OrchestratorStatus, SessionInfo};
pub use monitor::{ActivityMonitor, AgentMetrics};
pub use snapshot::{StateSnapshot, SNAPSHOT_VERSION};
pub use task_queue::TaskQueue;
pub use types::{Task, TaskFilter, TaskStats, TaskUpdate};
