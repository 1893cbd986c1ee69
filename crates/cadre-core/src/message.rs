use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of a [`Message`]; drives handler dispatch on the receiving agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Ask the recipient to execute an action.
    TaskAssignment,
    /// Ask the recipient to review some work.
    ReviewRequest,
    /// Answer to a review request.
    ReviewFeedback,
    /// Free-form question.
    Question,
    /// Progress notification.
    StatusUpdate,
    /// An assigned task finished successfully.
    Completion,
    /// An assigned task failed.
    Error,
    /// Any type this build does not know about.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MessageType::TaskAssignment => "task_assignment",
            MessageType::ReviewRequest => "review_request",
            MessageType::ReviewFeedback => "review_feedback",
            MessageType::Question => "question",
            MessageType::StatusUpdate => "status_update",
            MessageType::Completion => "completion",
            MessageType::Error => "error",
            MessageType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Addressee of a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    /// A single agent id.
    Agent(String),
    /// Every subscriber except the sender.
    Broadcast,
}

impl Recipient {
    /// Address a single agent.
    pub fn agent(id: impl Into<String>) -> Self {
        Recipient::Agent(id.into())
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, Recipient::Broadcast)
    }

    /// Whether this recipient addresses `agent_id` directly.
    pub fn is(&self, agent_id: &str) -> bool {
        matches!(self, Recipient::Agent(id) if id == agent_id)
    }
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recipient::Agent(id) => f.write_str(id),
            Recipient::Broadcast => f.write_str("*"),
        }
    }
}

/// Envelope exchanged between agents over the [`MessageBus`](crate::MessageBus).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier; a nil id is replaced on publish.
    pub id: Uuid,
    /// Sending agent id.
    pub from: String,
    /// Addressee.
    pub to: Recipient,
    /// Handler selector.
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Opaque structured payload.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// UTC creation time.
    pub timestamp: DateTime<Utc>,
    /// Id of the message this one answers, if any.
    #[serde(default)]
    pub reply_to: Option<Uuid>,
}

impl Message {
    /// Creates a message with a fresh id and the current timestamp.
    pub fn new(
        from: impl Into<String>,
        to: Recipient,
        message_type: MessageType,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            from: from.into(),
            to,
            message_type,
            payload,
            timestamp: Utc::now(),
            reply_to: None,
        }
    }

    /// Creates a message addressed to every subscriber but the sender.
    pub fn broadcast(
        from: impl Into<String>,
        message_type: MessageType,
        payload: serde_json::Value,
    ) -> Self {
        Self::new(from, Recipient::Broadcast, message_type, payload)
    }

    /// Creates a reply to `original`, addressed to its sender.
    pub fn reply(
        original: &Message,
        from: impl Into<String>,
        message_type: MessageType,
        payload: serde_json::Value,
    ) -> Self {
        Self::new(from, Recipient::agent(&original.from), message_type, payload)
            .in_reply_to(original.id)
    }

    /// Link this message to the one it answers.
    pub fn in_reply_to(mut self, id: Uuid) -> Self {
        self.reply_to = Some(id);
        self
    }

    /// Whether this message involves exactly the pair `a`/`b`, in either direction.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.from == a && self.to.is(b)) || (self.from == b && self.to.is(a))
    }

    /// One-line summary used in status output and logs.
    pub fn summary(&self) -> String {
        format!("{} -> {} [{}]", self.from, self.to, self.message_type)
    }
}

/// Query over the bus history. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub from: Option<String>,
    pub to: Option<Recipient>,
    pub message_type: Option<MessageType>,
    /// Keep only the newest `limit` matches.
    pub limit: Option<usize>,
}

impl MessageFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_by(mut self, agent_id: impl Into<String>) -> Self {
        self.from = Some(agent_id.into());
        self
    }

    pub fn sent_to(mut self, recipient: Recipient) -> Self {
        self.to = Some(recipient);
        self
    }

    pub fn of_type(mut self, message_type: MessageType) -> Self {
        self.message_type = Some(message_type);
        self
    }

    /// Keep only the newest `limit` matches.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `message` passes every set criterion. `limit` is applied by
    /// the caller.
    pub fn matches(&self, message: &Message) -> bool {
        self.from.as_ref().map_or(true, |f| &message.from == f)
            && self.to.as_ref().map_or(true, |t| &message.to == t)
            && self.message_type.map_or(true, |t| message.message_type == t)
    }
}

// --- Payloads ---

/// Payload of a [`MessageType::TaskAssignment`] message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub task_id: Uuid,
    pub action: String,
    pub description: String,
}

/// Payload of a [`MessageType::Completion`] reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCompletion {
    pub task_id: Uuid,
    pub result: serde_json::Value,
}

/// Payload of a [`MessageType::Error`] reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task_id: Option<Uuid>,
    pub error: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_addresses_original_sender() {
        let original = Message::new(
            "developer",
            Recipient::agent("reviewer"),
            MessageType::ReviewRequest,
            serde_json::json!({"file": "src/lib.rs"}),
        );
        let reply = Message::reply(
            &original,
            "reviewer",
            MessageType::ReviewFeedback,
            serde_json::json!({"approved": true}),
        );
        assert_eq!(reply.to, Recipient::agent("developer"));
        assert_eq!(reply.reply_to, Some(original.id));
        assert!(reply.is_between("developer", "reviewer"));
    }

    #[test]
    fn test_unknown_type_deserializes() {
        let parsed: MessageType = serde_json::from_str("\"telepathy\"").unwrap();
        assert_eq!(parsed, MessageType::Unknown);
        let parsed: MessageType = serde_json::from_str("\"review_feedback\"").unwrap();
        assert_eq!(parsed, MessageType::ReviewFeedback);
    }

    #[test]
    fn test_display_matches_serde_name() {
        for t in [
            MessageType::TaskAssignment,
            MessageType::StatusUpdate,
            MessageType::Completion,
        ] {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json.trim_matches('"'), t.to_string());
        }
    }

    #[test]
    fn test_filter_matches() {
        let msg = Message::broadcast("analyst", MessageType::StatusUpdate, serde_json::json!({}));
        assert!(MessageFilter::new().matches(&msg));
        assert!(MessageFilter::new().sent_by("analyst").matches(&msg));
        assert!(MessageFilter::new().sent_to(Recipient::Broadcast).matches(&msg));
        assert!(!MessageFilter::new().of_type(MessageType::Question).matches(&msg));
        assert!(!MessageFilter::new().sent_by("tester").matches(&msg));
    }
}
