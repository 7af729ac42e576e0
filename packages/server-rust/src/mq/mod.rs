//! Publish/subscribe queue collaborator used for log shipping.
//!
//! Producers and consumers depend on separate traits so a component that
//! only writes (the access-log sidecar) never sees the read side.

pub mod memory;

use std::fmt;

use async_trait::async_trait;

pub use memory::MemoryQueue;

/// Name of a queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(String);

impl Topic {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A single queued message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: Topic,
    pub payload: String,
}

impl Message {
    #[must_use]
    pub fn new(topic: impl Into<Topic>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MqError {
    #[error("topic name is empty")]
    EmptyTopic,
    #[error("topic {0} is closed")]
    Closed(Topic),
}

/// Write side of the queue. Producing never blocks.
pub trait Producer: Send + Sync {
    /// # Errors
    ///
    /// Returns [`MqError`] if the message cannot be queued.
    fn produce(&self, message: Message) -> Result<(), MqError>;
}

/// Read side of the queue.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Waits for the next message on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`MqError`] if the topic can no longer yield messages.
    async fn consume(&self, topic: &Topic) -> Result<Message, MqError>;

    /// Next message on `topic` if one is already waiting.
    fn try_consume(&self, topic: &Topic) -> Option<Message>;
}
