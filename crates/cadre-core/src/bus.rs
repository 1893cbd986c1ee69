use crate::error::{CadreError, CadreResult};
use crate::event::{CoreEvent, EventSink, TracingSink};
use crate::history::BoundedHistory;
use crate::message::{Message, MessageFilter, Recipient};
use async_trait::async_trait;
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default number of messages retained in the bus history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Delivery callback registered for one agent id.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message) -> CadreResult<()>;
}

#[derive(Clone)]
struct Subscriber {
    agent_id: String,
    handler: Arc<dyn MessageHandler>,
}

struct BusState {
    /// Registration order is broadcast order.
    subscribers: Vec<Subscriber>,
    /// Messages addressed to agents that were not subscribed at publish time.
    pending: HashMap<String, VecDeque<Message>>,
    /// Subscribers still draining their backlog. New messages for them are
    /// appended to `pending` so they land behind the older ones.
    flushing: HashSet<String>,
    history: BoundedHistory<Message>,
}

impl BusState {
    fn subscriber(&self, agent_id: &str) -> Option<&Subscriber> {
        self.subscribers.iter().find(|s| s.agent_id == agent_id)
    }

    fn enqueue(&mut self, agent_id: &str, message: Message) {
        self.pending
            .entry(agent_id.to_string())
            .or_default()
            .push_back(message);
    }

    /// Next backlog message for a flushing subscriber, or `None` once the
    /// backlog is empty (or the agent unsubscribed), which ends the flush.
    fn next_backlog(&mut self, agent_id: &str) -> Option<(Subscriber, Message)> {
        let subscriber = match self.subscriber(agent_id) {
            Some(subscriber) => subscriber.clone(),
            None => {
                self.flushing.remove(agent_id);
                return None;
            }
        };
        match self.pending.get_mut(agent_id).and_then(VecDeque::pop_front) {
            Some(message) => Some((subscriber, message)),
            None => {
                self.pending.remove(agent_id);
                self.flushing.remove(agent_id);
                None
            }
        }
    }
}

#[derive(Default)]
struct Routing {
    deliver: Vec<Subscriber>,
    /// Recipients with no subscriber at all.
    offline: Vec<String>,
}

/// Publish/subscribe transport between agents.
///
/// All mutable state sits behind one lock which is released before any handler
/// runs, so handlers may publish again while a delivery is in progress.
pub struct MessageBus {
    state: Mutex<BusState>,
    sink: Arc<dyn EventSink>,
}

impl MessageBus {
    /// Bus keeping the newest `history_capacity` messages, logging events
    /// through [`TracingSink`].
    pub fn new(history_capacity: usize) -> Self {
        Self {
            state: Mutex::new(BusState {
                subscribers: Vec::new(),
                pending: HashMap::new(),
                flushing: HashSet::new(),
                history: BoundedHistory::new(history_capacity),
            }),
            sink: Arc::new(TracingSink),
        }
    }

    /// Route bus events to `sink` instead of plain tracing.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Register `handler` for `agent_id`, then flush any messages queued for it
    /// in their original publish order.
    ///
    /// Until the backlog is empty, messages published to `agent_id` (including
    /// ones published by handlers running during the flush) are queued behind
    /// it rather than delivered directly. Subscribing an id that is already
    /// registered replaces its handler and keeps its broadcast position.
    pub async fn subscribe(&self, agent_id: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        let agent_id = agent_id.into();
        let backlog = {
            let mut state = self.state.lock();
            match state
                .subscribers
                .iter_mut()
                .find(|s| s.agent_id == agent_id)
            {
                Some(existing) => existing.handler = handler,
                None => state.subscribers.push(Subscriber {
                    agent_id: agent_id.clone(),
                    handler,
                }),
            }
            if state.flushing.contains(&agent_id) {
                // An outer subscribe call is already draining this backlog.
                return;
            }
            let backlog = state.pending.get(&agent_id).map_or(0, VecDeque::len);
            if backlog > 0 {
                state.flushing.insert(agent_id.clone());
            }
            backlog
        };

        info!(agent_id = %agent_id, backlog, "Agent subscribed to bus");

        loop {
            let next = self.state.lock().next_backlog(&agent_id);
            match next {
                Some((subscriber, message)) => self.deliver(&subscriber, message).await,
                None => break,
            }
        }
    }

    /// Remove the handler for `agent_id`. History is untouched.
    pub fn unsubscribe(&self, agent_id: &str) -> bool {
        let mut state = self.state.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|s| s.agent_id != agent_id);
        let removed = state.subscribers.len() != before;
        if removed {
            info!(agent_id = %agent_id, "Agent unsubscribed from bus");
        }
        removed
    }

    /// Record `message` in history and deliver it.
    ///
    /// A nil id is replaced with a fresh one. A `reply_to` that does not name a
    /// message in history is rejected with [`CadreError::NotFound`]. Handler
    /// failures never surface here.
    pub async fn publish(&self, mut message: Message) -> CadreResult<Uuid> {
        if message.id.is_nil() {
            message.id = Uuid::new_v4();
        }
        let id = message.id;

        let routing = {
            let mut state = self.state.lock();
            if let Some(parent) = message.reply_to {
                if !state.history.iter().any(|m| m.id == parent) {
                    return Err(CadreError::not_found("reply target message", parent));
                }
            }
            state.history.push(message.clone());

            let mut routing = Routing::default();
            let targets: Vec<String> = match &message.to {
                Recipient::Broadcast => state
                    .subscribers
                    .iter()
                    .filter(|s| s.agent_id != message.from)
                    .map(|s| s.agent_id.clone())
                    .collect(),
                Recipient::Agent(agent_id) => vec![agent_id.clone()],
            };
            for target in targets {
                if state.flushing.contains(&target) {
                    state.enqueue(&target, message.clone());
                } else if let Some(subscriber) = state.subscriber(&target) {
                    routing.deliver.push(subscriber.clone());
                } else {
                    state.enqueue(&target, message.clone());
                    routing.offline.push(target);
                }
            }
            routing
        };

        self.sink.emit(&CoreEvent::MessageSent {
            message_id: id,
            from: message.from.clone(),
            to: message.to.clone(),
            message_type: message.message_type,
        });

        for recipient in routing.offline {
            self.sink.emit(&CoreEvent::MessageQueued {
                message_id: id,
                recipient,
            });
        }
        for target in &routing.deliver {
            self.deliver(target, message.clone()).await;
        }

        Ok(id)
    }

    /// Invoke one handler, isolating its failure (error or panic) from the
    /// sender and from other recipients.
    async fn deliver(&self, subscriber: &Subscriber, message: Message) {
        let message_id = message.id;
        let message_type = message.message_type;
        let outcome = AssertUnwindSafe(subscriber.handler.handle(message))
            .catch_unwind()
            .await;

        let error = match outcome {
            Ok(Ok(())) => {
                self.sink.emit(&CoreEvent::MessageDelivered {
                    message_id,
                    recipient: subscriber.agent_id.clone(),
                    message_type,
                });
                return;
            }
            Ok(Err(e)) => CadreError::Delivery(e.to_string()),
            Err(_) => CadreError::Delivery("handler panicked".to_string()),
        };

        warn!(
            message_id = %message_id,
            recipient = %subscriber.agent_id,
            error = %error,
            "Handler failed; continuing delivery"
        );
        self.sink.emit(&CoreEvent::DeliveryFailed {
            message_id,
            recipient: subscriber.agent_id.clone(),
            error: error.to_string(),
        });
    }

    // --- Read-only queries ---

    /// Messages in history matching `filter`, oldest-first.
    pub fn history(&self, filter: &MessageFilter) -> Vec<Message> {
        let state = self.state.lock();
        let mut matched: Vec<Message> = state
            .history
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            let skip = matched.len().saturating_sub(limit);
            matched.drain(..skip);
        }
        matched
    }

    /// Point-to-point messages exchanged between `a` and `b`, oldest-first.
    pub fn conversation(&self, a: &str, b: &str) -> Vec<Message> {
        let state = self.state.lock();
        state
            .history
            .iter()
            .filter(|m| m.is_between(a, b))
            .cloned()
            .collect()
    }

    /// Walk `reply_to` links from `message_id` back to the root, returned oldest-first.
    ///
    /// The walk stops early if a link points at a message already evicted from
    /// history. An unknown `message_id` yields an empty chain.
    pub fn reply_chain(&self, message_id: Uuid) -> Vec<Message> {
        let state = self.state.lock();
        let by_id: HashMap<Uuid, &Message> = state.history.iter().map(|m| (m.id, m)).collect();

        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = Some(message_id);
        while let Some(id) = cursor {
            if !seen.insert(id) {
                break;
            }
            match by_id.get(&id) {
                Some(message) => {
                    chain.push((*message).clone());
                    cursor = message.reply_to;
                }
                None => {
                    if !chain.is_empty() {
                        debug!(missing = %id, "Reply chain truncated by history eviction");
                    }
                    break;
                }
            }
        }
        chain.reverse();
        chain
    }

    /// The newest `n` messages, oldest-first.
    pub fn recent(&self, n: usize) -> Vec<Message> {
        self.state.lock().history.latest(n).cloned().collect()
    }

    /// A message still in history.
    pub fn get(&self, message_id: Uuid) -> Option<Message> {
        self.state
            .lock()
            .history
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
    }

    /// Number of messages waiting for `agent_id` to subscribe.
    pub fn pending_count(&self, agent_id: &str) -> usize {
        self.state.lock().pending.get(agent_id).map_or(0, VecDeque::len)
    }

    /// Subscribed agent ids in registration order.
    pub fn subscribers(&self) -> Vec<String> {
        self.state
            .lock()
            .subscribers
            .iter()
            .map(|s| s.agent_id.clone())
            .collect()
    }

    /// Whether `agent_id` currently has a handler.
    pub fn is_subscribed(&self, agent_id: &str) -> bool {
        self.state
            .lock()
            .subscribers
            .iter()
            .any(|s| s.agent_id == agent_id)
    }

    /// Number of messages in history.
    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    /// Forget all history. Pending queues are kept.
    pub fn clear_history(&self) {
        self.state.lock().history.clear();
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::message::MessageType;

    struct Recorder {
        seen: Mutex<Vec<Message>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }

        fn payloads(&self) -> Vec<serde_json::Value> {
            self.seen.lock().iter().map(|m| m.payload.clone()).collect()
        }
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle(&self, message: Message) -> CadreResult<()> {
            self.seen.lock().push(message);
            Ok(())
        }
    }

    fn direct(from: &str, to: &str, n: u32) -> Message {
        Message::new(
            from,
            Recipient::agent(to),
            MessageType::StatusUpdate,
            serde_json::json!(n),
        )
    }

    #[tokio::test]
    async fn test_direct_delivery() {
        let bus = MessageBus::default();
        let rec = Recorder::new();
        bus.subscribe("b", rec.clone()).await;

        bus.publish(direct("a", "b", 1)).await.unwrap();
        assert_eq!(rec.payloads(), vec![serde_json::json!(1)]);
        assert_eq!(bus.history_len(), 1);
    }

    #[tokio::test]
    async fn test_nil_id_is_replaced() {
        let bus = MessageBus::default();
        let mut msg = direct("a", "b", 1);
        msg.id = Uuid::nil();
        let id = bus.publish(msg).await.unwrap();
        assert!(!id.is_nil());
        assert!(bus.get(id).is_some());
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let bus = MessageBus::default();
        let a = Recorder::new();
        let b = Recorder::new();
        bus.subscribe("a", a.clone()).await;
        bus.subscribe("b", b.clone()).await;

        bus.publish(Message::broadcast(
            "a",
            MessageType::StatusUpdate,
            serde_json::json!("hello"),
        ))
        .await
        .unwrap();

        assert!(a.payloads().is_empty());
        assert_eq!(b.payloads().len(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_queues_later_messages() {
        let bus = MessageBus::default();
        let rec = Recorder::new();
        bus.subscribe("b", rec.clone()).await;
        assert!(bus.unsubscribe("b"));
        assert!(!bus.unsubscribe("b"));

        bus.publish(direct("a", "b", 7)).await.unwrap();
        assert!(rec.payloads().is_empty());
        assert_eq!(bus.pending_count("b"), 1);
        assert_eq!(bus.history_len(), 1);
    }

    #[tokio::test]
    async fn test_reply_to_unknown_message_rejected() {
        let bus = MessageBus::default();
        let msg = direct("a", "b", 1).in_reply_to(Uuid::new_v4());
        let err = bus.publish(msg).await.unwrap_err();
        assert!(matches!(err, CadreError::NotFound(_)));
        assert_eq!(bus.history_len(), 0);
    }

    #[tokio::test]
    async fn test_history_limit_keeps_newest() {
        let bus = MessageBus::new(3);
        for n in 0..5 {
            bus.publish(direct("a", "b", n)).await.unwrap();
        }
        assert_eq!(bus.history_len(), 3);

        let last_two = bus.history(&MessageFilter::new().limit(2));
        let payloads: Vec<_> = last_two.iter().map(|m| m.payload.clone()).collect();
        assert_eq!(payloads, vec![serde_json::json!(3), serde_json::json!(4)]);
    }

    #[tokio::test]
    async fn test_conversation_excludes_third_parties() {
        let bus = MessageBus::default();
        bus.publish(direct("a", "b", 1)).await.unwrap();
        bus.publish(direct("b", "a", 2)).await.unwrap();
        bus.publish(direct("a", "c", 3)).await.unwrap();

        let convo = bus.conversation("a", "b");
        assert_eq!(convo.len(), 2);
        assert_eq!(convo[0].payload, serde_json::json!(1));
    }

    #[tokio::test]
    async fn test_reply_chain_unknown_id_is_empty() {
        let bus = MessageBus::default();
        assert!(bus.reply_chain(Uuid::new_v4()).is_empty());
    }

    #[tokio::test]
    async fn test_resubscribe_keeps_single_entry() {
        let bus = MessageBus::default();
        bus.subscribe("a", Recorder::new()).await;
        bus.subscribe("b", Recorder::new()).await;
        bus.subscribe("a", Recorder::new()).await;
        assert_eq!(bus.subscribers(), vec!["a".to_string(), "b".to_string()]);
    }
}
