use std::collections::BTreeSet;

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::{RateError, Result};

/// A published quote: routing topic plus display payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMessage {
    pub topic: String,
    pub payload: String,
}

impl TopicMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Frames written by the publisher to a subscriber connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    Quote {
        topic: String,
        payload: String,
    },
    Ack {
        status: String,
        prefix: Option<String>,
        message: String,
    },
}

impl ServerFrame {
    pub fn ack_success(prefix: &str, message: &str) -> Self {
        ServerFrame::Ack {
            status: "success".to_string(),
            prefix: Some(prefix.to_string()),
            message: message.to_string(),
        }
    }

    pub fn ack_error(prefix: Option<String>, message: &str) -> Self {
        ServerFrame::Ack {
            status: "error".to_string(),
            prefix,
            message: message.to_string(),
        }
    }
}

impl From<TopicMessage> for ServerFrame {
    fn from(msg: TopicMessage) -> Self {
        ServerFrame::Quote {
            topic: msg.topic,
            payload: msg.payload,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SubscriptionMessage {
    pub action: String, // "subscribe" | "unsubscribe"
    pub prefix: String,
}

impl SubscriptionMessage {
    pub fn subscribe(prefix: &str) -> Self {
        Self {
            action: "subscribe".to_string(),
            prefix: prefix.to_string(),
        }
    }

    pub fn unsubscribe(prefix: &str) -> Self {
        Self {
            action: "unsubscribe".to_string(),
            prefix: prefix.to_string(),
        }
    }
}

/// Byte-wise topic prefix filter. The empty prefix matches every topic.
#[derive(Debug, Clone, Default)]
pub struct TopicFilter {
    prefixes: BTreeSet<String>,
}

impl TopicFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the prefix was already present.
    pub fn add(&mut self, prefix: &str) -> bool {
        self.prefixes.insert(prefix.to_string())
    }

    pub fn remove(&mut self, prefix: &str) -> bool {
        self.prefixes.remove(prefix)
    }

    pub fn matches(&self, topic: &str) -> bool {
        self.prefixes
            .iter()
            .any(|prefix| topic.as_bytes().starts_with(prefix.as_bytes()))
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }
}

/// Destination for published quotes.
pub trait MessageSink: Send + Sync {
    /// Publishes one message, returning how many receivers it reached.
    fn publish(&self, message: &TopicMessage) -> Result<usize>;
}

/// In-process fan-out of quotes to every connected subscriber. Each
/// connection filters the shared stream by its own prefixes.
pub struct TopicBus {
    sender: broadcast::Sender<TopicMessage>,
}

impl TopicBus {
    pub fn new(channel_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TopicMessage> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl MessageSink for TopicBus {
    fn publish(&self, message: &TopicMessage) -> Result<usize> {
        if message.topic.is_empty() {
            return Err(RateError::Transport("refusing to publish with an empty topic".to_string()));
        }

        match self.sender.send(message.clone()) {
            Ok(count) => Ok(count),
            Err(_) => {
                debug!("No active subscribers for topic: {}", message.topic);
                Ok(0)
            }
        }
    }
}
