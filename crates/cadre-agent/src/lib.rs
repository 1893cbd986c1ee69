//! Capability-gated agents for the cadre orchestrator.
//!
//! An [`Agent`] owns its identity, capability set, delegation targets, status,
//! and a bounded record of executed tasks. Role-specific logic lives behind the
//! [`RoleBehavior`] trait and is selected by name through a [`RoleRegistry`].
//!
//! # Main types
//!
//! - [`Agent`]: Executes actions, dispatches delivered messages by type, and
//!   delegates work to other agents over the shared bus.
//! - [`RoleBehavior`]: Extension point implemented once per role.
//! - [`RoleRegistry`]: Role-name to behavior-factory map.
//! - [`AgentProfile`]: Static descriptor an agent is built from.

/// Agent base: execution, messaging, and dispatch.
pub mod agent;
/// Role behavior trait.
pub mod behavior;
/// Role-name to factory registry.
pub mod registry;
/// Built-in reference roles.
pub mod roles;
/// Profiles, status, task records, and workflow step types.
pub mod types;

pub use agent::{Agent, DEFAULT_AGENT_HISTORY};
pub use behavior::{describe, RoleBehavior};
pub use registry::{RoleFactory, RoleRegistry};
pub use roles::{register_builtin_roles, DEFAULT_TEST_TIMEOUT};
pub use types::{AgentProfile, AgentSnapshot, AgentStatus, AgentTask, StepOutcome, WorkflowStep};
