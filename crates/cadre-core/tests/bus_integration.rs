#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use cadre_core::*;
use parking_lot::Mutex;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Test handlers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Message>>,
}

impl Recorder {
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

struct Failing;

#[async_trait]
impl MessageHandler for Failing {
    async fn handle(&self, _message: Message) -> CadreResult<()> {
        Err(CadreError::TaskExecution("boom".to_string()))
    }
}

struct Panicking;

#[async_trait]
impl MessageHandler for Panicking {
    async fn handle(&self, _message: Message) -> CadreResult<()> {
        panic!("handler exploded");
    }
}

/// Replies to every message it receives, once.
struct Echo {
    id: &'static str,
    bus: Arc<MessageBus>,
}

#[async_trait]
impl MessageHandler for Echo {
    async fn handle(&self, message: Message) -> CadreResult<()> {
        if message.reply_to.is_none() {
            let reply = Message::reply(
                &message,
                self.id,
                MessageType::Completion,
                serde_json::json!("echo"),
            );
            self.bus.publish(reply).await?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct CountingSink {
    failures: Mutex<usize>,
    queued: Mutex<usize>,
}

impl EventSink for CountingSink {
    fn emit(&self, event: &CoreEvent) {
        match event {
            CoreEvent::DeliveryFailed { .. } => *self.failures.lock() += 1,
            CoreEvent::MessageQueued { .. } => *self.queued.lock() += 1,
            _ => {}
        }
    }
}

fn status(from: &str, to: &str, n: u32) -> Message {
    Message::new(
        from,
        Recipient::agent(to),
        MessageType::StatusUpdate,
        serde_json::json!(n),
    )
}

// ---------------------------------------------------------------------------
// 1. Deferred delivery: queued before subscribe, flushed once, in order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queued_messages_flush_once_in_publish_order() {
    let sink = Arc::new(CountingSink::default());
    let bus = MessageBus::default().with_sink(sink.clone());

    for n in 0..3 {
        bus.publish(status("a", "late", n)).await.unwrap();
    }
    assert_eq!(bus.pending_count("late"), 3);
    assert_eq!(*sink.queued.lock(), 3);

    let rec = Arc::new(Recorder::default());
    bus.subscribe("late", rec.clone()).await;
    assert_eq!(
        rec.payloads(),
        vec![serde_json::json!(0), serde_json::json!(1), serde_json::json!(2)]
    );
    assert_eq!(bus.pending_count("late"), 0);

    // A post-subscribe message lands after the backlog, and the backlog is not replayed.
    bus.publish(status("a", "late", 3)).await.unwrap();
    bus.subscribe("late", rec.clone()).await;
    assert_eq!(rec.payloads().len(), 4);
    assert_eq!(rec.payloads()[3], serde_json::json!(3));
}

// ---------------------------------------------------------------------------
// 2. Broadcast failure isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn broadcast_survives_one_failing_handler() {
    let sink = Arc::new(CountingSink::default());
    let bus = MessageBus::default().with_sink(sink.clone());

    let first = Arc::new(Recorder::default());
    let last = Arc::new(Recorder::default());
    bus.subscribe("first", first.clone()).await;
    bus.subscribe("broken", Arc::new(Failing)).await;
    bus.subscribe("last", last.clone()).await;

    let result = bus
        .publish(Message::broadcast(
            "sender",
            MessageType::StatusUpdate,
            serde_json::json!("all hands"),
        ))
        .await;

    assert!(result.is_ok());
    assert_eq!(first.payloads().len(), 1);
    assert_eq!(last.payloads().len(), 1);
    assert_eq!(*sink.failures.lock(), 1);
}

#[tokio::test]
async fn panicking_handler_does_not_reach_sender() {
    let bus = MessageBus::default();
    let after = Arc::new(Recorder::default());
    bus.subscribe("panics", Arc::new(Panicking)).await;
    bus.subscribe("after", after.clone()).await;

    bus.publish(Message::broadcast(
        "sender",
        MessageType::Question,
        serde_json::json!("anyone?"),
    ))
    .await
    .unwrap();

    bus.publish(status("sender", "panics", 1)).await.unwrap();
    assert_eq!(after.payloads().len(), 1);
}

// ---------------------------------------------------------------------------
// 3. Reply chains
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reply_chain_is_oldest_first() {
    let bus = MessageBus::default();

    let m1 = Message::new(
        "a",
        Recipient::agent("b"),
        MessageType::Question,
        serde_json::json!("why?"),
    );
    let m2 = Message::reply(&m1, "b", MessageType::Question, serde_json::json!("why not?"));
    let m3 = Message::reply(&m2, "a", MessageType::StatusUpdate, serde_json::json!("fair"));

    let id1 = bus.publish(m1).await.unwrap();
    let id2 = bus.publish(m2).await.unwrap();
    let id3 = bus.publish(m3).await.unwrap();

    let chain: Vec<_> = bus.reply_chain(id3).iter().map(|m| m.id).collect();
    assert_eq!(chain, vec![id1, id2, id3]);
    assert!(bus.reply_chain(id1).iter().all(|m| m.reply_to.is_none()));
}

#[tokio::test]
async fn reply_chain_truncates_at_evicted_root() {
    let bus = MessageBus::new(2);
    let m1 = status("a", "b", 1);
    let m2 = Message::reply(&m1, "b", MessageType::StatusUpdate, serde_json::json!(2));
    let m3 = Message::reply(&m2, "a", MessageType::StatusUpdate, serde_json::json!(3));
    bus.publish(m1).await.unwrap();
    let id2 = bus.publish(m2).await.unwrap();
    let id3 = bus.publish(m3).await.unwrap();

    let chain: Vec<_> = bus.reply_chain(id3).iter().map(|m| m.id).collect();
    assert_eq!(chain, vec![id2, id3]);
}

// ---------------------------------------------------------------------------
// 4. Re-entrant publish from inside a handler
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handler_can_reply_during_delivery() {
    let bus = Arc::new(MessageBus::default());
    let asker = Arc::new(Recorder::default());
    bus.subscribe("asker", asker.clone()).await;
    bus.subscribe(
        "echo",
        Arc::new(Echo {
            id: "echo",
            bus: bus.clone(),
        }),
    )
    .await;

    let question_id = bus.publish(status("asker", "echo", 1)).await.unwrap();

    let replies = asker.seen.lock().clone();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].reply_to, Some(question_id));
    assert_eq!(bus.conversation("asker", "echo").len(), 2);
}

// ---------------------------------------------------------------------------
// 5. Per-sender ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn point_to_point_order_is_preserved() {
    let bus = MessageBus::default();
    let rec = Arc::new(Recorder::default());
    bus.subscribe("b", rec.clone()).await;

    for n in 0..20 {
        bus.publish(status("a", "b", n)).await.unwrap();
    }
    let expected: Vec<_> = (0..20).map(|n| serde_json::json!(n)).collect();
    assert_eq!(rec.payloads(), expected);

    let from_a = bus.history(&MessageFilter::new().sent_by("a").of_type(MessageType::StatusUpdate));
    assert_eq!(from_a.len(), 20);
}

// ---------------------------------------------------------------------------
// 6. Messages published while a backlog flushes land behind it
// ---------------------------------------------------------------------------

/// Records every payload and answers the first message it sees.
struct AnswerFirst {
    id: &'static str,
    bus: Arc<MessageBus>,
    seen: Mutex<Vec<serde_json::Value>>,
}

#[async_trait]
impl MessageHandler for AnswerFirst {
    async fn handle(&self, message: Message) -> CadreResult<()> {
        let first = {
            let mut seen = self.seen.lock();
            seen.push(message.payload.clone());
            seen.len() == 1
        };
        if first {
            let reply = Message::reply(
                &message,
                self.id,
                MessageType::Completion,
                serde_json::json!("ack"),
            );
            self.bus.publish(reply).await?;
        }
        Ok(())
    }
}

/// Sends one follow-up status to `target` whenever it hears back.
struct FollowUp {
    id: &'static str,
    target: &'static str,
    bus: Arc<MessageBus>,
}

#[async_trait]
impl MessageHandler for FollowUp {
    async fn handle(&self, _message: Message) -> CadreResult<()> {
        self.bus.publish(status(self.id, self.target, 99)).await?;
        Ok(())
    }
}

#[tokio::test]
async fn publish_during_backlog_flush_keeps_sender_order() {
    let bus = Arc::new(MessageBus::default());
    bus.subscribe(
        "a",
        Arc::new(FollowUp {
            id: "a",
            target: "late",
            bus: bus.clone(),
        }),
    )
    .await;

    bus.publish(status("a", "late", 0)).await.unwrap();
    bus.publish(status("a", "late", 1)).await.unwrap();

    let late = Arc::new(AnswerFirst {
        id: "late",
        bus: bus.clone(),
        seen: Mutex::new(Vec::new()),
    });
    bus.subscribe("late", late.clone()).await;

    assert_eq!(
        *late.seen.lock(),
        vec![serde_json::json!(0), serde_json::json!(1), serde_json::json!(99)]
    );
    assert_eq!(bus.pending_count("late"), 0);

    // Direct delivery resumes once the backlog is drained.
    bus.publish(status("a", "late", 2)).await.unwrap();
    assert_eq!(late.seen.lock().len(), 4);
}

#[tokio::test]
async fn broadcast_during_backlog_flush_is_queued_behind_it() {
    let bus = Arc::new(MessageBus::default());
    let rec = Arc::new(Recorder::default());
    bus.publish(status("a", "late", 0)).await.unwrap();
    bus.publish(status("a", "late", 1)).await.unwrap();

    /// Broadcasts once, on its first delivery.
    struct Shout {
        bus: Arc<MessageBus>,
        done: Mutex<bool>,
        rec: Arc<Recorder>,
    }

    #[async_trait]
    impl MessageHandler for Shout {
        async fn handle(&self, message: Message) -> CadreResult<()> {
            let first = !std::mem::replace(&mut *self.done.lock(), true);
            self.rec.seen.lock().push(message);
            if first {
                let shout = Message::new(
                    "a",
                    Recipient::Broadcast,
                    MessageType::StatusUpdate,
                    serde_json::json!("all"),
                );
                self.bus.publish(shout).await?;
            }
            Ok(())
        }
    }

    bus.subscribe(
        "late",
        Arc::new(Shout {
            bus: bus.clone(),
            done: Mutex::new(false),
            rec: rec.clone(),
        }),
    )
    .await;

    assert_eq!(
        rec.payloads(),
        vec![serde_json::json!(0), serde_json::json!(1), serde_json::json!("all")]
    );
}
