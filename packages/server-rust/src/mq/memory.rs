use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};

use super::{Consumer, Message, MqError, Producer, Topic};

struct TopicQueue {
    tx: mpsc::UnboundedSender<Message>,
    rx: Mutex<mpsc::UnboundedReceiver<Message>>,
}

impl TopicQueue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }
}

/// In-memory queue with one unbounded FIFO per topic.
///
/// Topics are created on first use by either side.
#[derive(Default)]
pub struct MemoryQueue {
    topics: DashMap<Topic, Arc<TopicQueue>>,
}

impl MemoryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared process-wide queue, created on first use.
    #[must_use]
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<MemoryQueue>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
    }

    /// Drops every topic along with any unconsumed messages.
    pub fn clear(&self) {
        self.topics.clear();
    }

    fn queue(&self, topic: &Topic) -> Arc<TopicQueue> {
        Arc::clone(
            self.topics
                .entry(topic.clone())
                .or_insert_with(|| Arc::new(TopicQueue::new()))
                .value(),
        )
    }
}

impl Producer for MemoryQueue {
    fn produce(&self, message: Message) -> Result<(), MqError> {
        if message.topic.as_str().is_empty() {
            return Err(MqError::EmptyTopic);
        }
        let queue = self.queue(&message.topic);
        queue
            .tx
            .send(message)
            .map_err(|e| MqError::Closed(e.0.topic))
    }
}

#[async_trait]
impl Consumer for MemoryQueue {
    async fn consume(&self, topic: &Topic) -> Result<Message, MqError> {
        let queue = self.queue(topic);
        let mut rx = queue.rx.lock().await;
        let next = rx.recv().await;
        next.ok_or_else(|| MqError::Closed(topic.clone()))
    }

    fn try_consume(&self, topic: &Topic) -> Option<Message> {
        let queue = self.topics.get(topic).map(|q| Arc::clone(q.value()))?;
        let mut rx = queue.rx.try_lock().ok()?;
        rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn produce_then_consume_in_fifo_order() {
        let mq = MemoryQueue::new();
        let topic = Topic::new("test");
        mq.produce(Message::new("test", "hello")).unwrap();
        mq.produce(Message::new("test", "world")).unwrap();

        assert_eq!(mq.consume(&topic).await.unwrap().payload, "hello");
        assert_eq!(mq.consume(&topic).await.unwrap().payload, "world");
        assert!(mq.try_consume(&topic).is_none());
    }

    #[tokio::test]
    async fn consume_waits_for_a_producer() {
        let mq = Arc::new(MemoryQueue::new());
        let topic = Topic::new("later");

        let reader = {
            let mq = Arc::clone(&mq);
            let topic = topic.clone();
            tokio::spawn(async move { mq.consume(&topic).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        mq.produce(Message::new("later", "done")).unwrap();

        let message = reader.await.unwrap().unwrap();
        assert_eq!(message.payload, "done");
    }

    #[test]
    fn topics_are_independent() {
        let mq = MemoryQueue::new();
        mq.produce(Message::new("a", "1")).unwrap();
        assert!(mq.try_consume(&Topic::new("b")).is_none());
        assert_eq!(mq.try_consume(&Topic::new("a")).unwrap().payload, "1");
    }

    #[test]
    fn empty_topic_is_rejected() {
        let mq = MemoryQueue::new();
        assert_eq!(mq.produce(Message::new("", "x")), Err(MqError::EmptyTopic));
    }

    #[test]
    fn clear_drops_pending_messages() {
        let mq = MemoryQueue::new();
        mq.produce(Message::new("a", "1")).unwrap();
        mq.clear();
        assert!(mq.try_consume(&Topic::new("a")).is_none());
    }
}
