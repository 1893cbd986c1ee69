//! Core types, error definitions, and the message bus for the cadre agent
//! orchestrator.
//!
//! # Main types
//!
//! - [`CadreError`]: Error taxonomy shared by every cadre crate.
//! - [`CadreResult`]: Convenience alias for `Result<T, CadreError>`.
//! - [`Message`]: Envelope exchanged between agents, with optional reply link.
//! - [`MessageBus`]: In-process publish/subscribe transport with deferred
//!   delivery, bounded history, and reply-chain reconstruction.
//! - [`BoundedHistory`]: Fixed-capacity ring buffer.
//! - [`EventSink`]: Output sink for structured [`CoreEvent`]s.

/// Publish/subscribe message bus.
pub mod bus;
/// Error taxonomy.
pub mod error;
/// Structured engine events and sinks.
pub mod event;
/// Fixed-capacity ring buffer.
pub mod history;
/// Message envelope, types, filters, and well-known payloads.
pub mod message;
/// Task status, priority, and workflow step outcomes.
pub mod task;

pub use bus::{MessageBus, MessageHandler, DEFAULT_HISTORY_CAPACITY};
pub use error::{CadreError, CadreResult};
pub use event::{CoreEvent, EventSink, TracingSink};
pub use history::BoundedHistory;
pub use task::{Priority, StepOutcome, TaskStatus};
pub use message::{
    Message, MessageFilter, MessageType, Recipient, TaskAssignment, TaskCompletion, TaskFailure,
};
