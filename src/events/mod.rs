// src/events/mod.rs
// In-process pub/sub: fire-and-forget publish, isolated subscriber failure

pub mod handlers;

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

// Ingestion topics. Producers publish these after the primary-store insert.
pub const TOPIC_MEMORY_LOG_STORED: &str = "memory_log.stored";
pub const TOPIC_MENTAL_NOTE_STORED: &str = "mental_note.stored";
pub const TOPIC_CONVERSATION_STORED: &str = "conversation.stored";

// Embedding lifecycle topics.
pub const TOPIC_EMBEDDING_CACHE_HIT: &str = "embedding.cache_hit";
pub const TOPIC_EMBEDDING_GENERATED: &str = "embedding.generated";
pub const TOPIC_EMBEDDING_ERROR: &str = "embedding.error";
pub const TOPIC_EMBEDDING_BATCH_GENERATED: &str = "embedding.batch_generated";
pub const TOPIC_EMBEDDING_HEALTH_CHECK: &str = "embedding.health_check";

/// An event on the bus: topic name plus a JSON payload.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Payload contract for `memory_log.stored`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryLogStored {
    pub memory_log_id: i64,
    pub task: String,
    pub agent: String,
    pub date: Option<String>,
    pub raw_data: serde_json::Value,
    pub user_id: String,
    pub project_id: String,
}

/// Payload contract for `mental_note.stored`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentalNoteStored {
    pub mental_note_id: i64,
    pub session_id: String,
    pub start_time: i64,
    pub raw_data: serde_json::Value,
    pub user_id: String,
    pub project_id: String,
}

/// Payload contract for `conversation.stored`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationStored {
    pub conversation_db_id: i64,
    pub conversation_id: String,
    pub model: String,
    pub raw_data: serde_json::Value,
    pub user_id: String,
    pub project_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// A subscriber receives events for one topic, in publish order. Returning
/// an error only logs it; the publisher and other subscribers are unaffected.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn handle(&self, event: Event) -> anyhow::Result<()>;
}

struct SubscriberHandle {
    name: String,
    tx: mpsc::UnboundedSender<Event>,
}

/// In-process event bus.
///
/// Each subscriber gets a dedicated unbounded channel drained by its own
/// task, so publish never blocks and delivery is FIFO per (topic,
/// subscriber). Registration is rare and takes a coarse write lock; publish
/// only reads.
pub struct EventBus {
    topics: RwLock<HashMap<String, Vec<SubscriberHandle>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// Register a subscriber for a topic and spawn its consumer task.
    pub fn subscribe(
        &self,
        topic: &str,
        name: &str,
        subscriber: std::sync::Arc<dyn EventSubscriber>,
    ) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let task_name = name.to_string();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let topic = event.topic.clone();
                if let Err(e) = subscriber.handle(event).await {
                    warn!("Subscriber '{}' failed on '{}': {:#}", task_name, topic, e);
                }
            }
        });

        let mut topics = self.topics.write().expect("event bus lock poisoned");
        topics.entry(topic.to_string()).or_default().push(SubscriberHandle {
            name: name.to_string(),
            tx,
        });
    }

    /// Fire-and-forget publish. Dead subscribers (dropped consumer tasks)
    /// are skipped.
    pub fn publish(&self, topic: &str, payload: serde_json::Value) {
        let topics = self.topics.read().expect("event bus lock poisoned");
        let Some(subs) = topics.get(topic) else {
            debug!("No subscribers for topic '{}'", topic);
            return;
        };

        for sub in subs {
            let event = Event {
                topic: topic.to_string(),
                payload: payload.clone(),
            };
            if sub.tx.send(event).is_err() {
                warn!("Subscriber '{}' channel closed for '{}'", sub.name, topic);
            }
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .expect("event bus lock poisoned")
            .get(topic)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl EventSubscriber for Recorder {
        async fn handle(&self, event: Event) -> anyhow::Result<()> {
            let n = event.payload["n"].as_i64().unwrap();
            self.seen.lock().await.push(n);
            Ok(())
        }
    }

    struct Failing {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventSubscriber for Failing {
        async fn handle(&self, _event: Event) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("boom")
        }
    }

    #[tokio::test]
    async fn delivery_is_fifo_per_subscriber() {
        let bus = EventBus::new();
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        bus.subscribe("t", "recorder", recorder.clone());

        for n in 0..20 {
            bus.publish("t", serde_json::json!({ "n": n }));
        }

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let seen = recorder.seen.lock().await;
        assert_eq!(*seen, (0..20).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn failing_subscriber_does_not_affect_others() {
        let bus = EventBus::new();
        let failing = Arc::new(Failing {
            calls: AtomicUsize::new(0),
        });
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        bus.subscribe("t", "failing", failing.clone());
        bus.subscribe("t", "recorder", recorder.clone());

        bus.publish("t", serde_json::json!({ "n": 7 }));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*recorder.seen.lock().await, vec![7]);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let bus = EventBus::new();
        bus.publish("nobody", serde_json::json!({}));
        assert_eq!(bus.subscriber_count("nobody"), 0);
    }
}
