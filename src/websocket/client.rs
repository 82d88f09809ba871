use futures::{SinkExt, Stream, StreamExt};
use log::{debug, info, warn};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::data::{ServerFrame, SubscriptionMessage, TopicMessage};
use crate::error::{RateError, Result};
use crate::websocket::handler::RATES_PATH;

/// Turns `host:port` into the publisher's WebSocket URL; full `ws://` and
/// `wss://` URLs pass through unchanged.
pub fn endpoint_url(endpoint: &str) -> String {
    if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        endpoint.to_string()
    } else {
        format!("ws://{}{}", endpoint, RATES_PATH)
    }
}

/// Connects to the publisher and registers `topic_prefix`. Returns once the
/// publisher has acknowledged the filter.
pub async fn subscribe(endpoint: &str, topic_prefix: &str) -> Result<Subscription> {
    let url = endpoint_url(endpoint);
    let (stream, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| RateError::Transport(format!("failed to connect to {}: {}", url, e)))?;

    info!("Connected to {}", url);

    let mut subscription = Subscription {
        stream,
        prefix: topic_prefix.to_string(),
    };
    subscription.register().await?;
    Ok(subscription)
}

/// Unbounded sequence of quotes whose topic starts with the subscribed
/// prefix. Never ends cleanly: a closed connection is a transport error.
pub struct Subscription {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    prefix: String,
}

impl Subscription {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    async fn register(&mut self) -> Result<()> {
        let request = serde_json::to_string(&SubscriptionMessage::subscribe(&self.prefix))
            .map_err(|e| RateError::Transport(e.to_string()))?;
        self.stream.send(Message::Text(request)).await?;

        loop {
            match self.next_frame().await? {
                ServerFrame::Ack { status, message, .. } => {
                    if status == "success" {
                        info!("Subscribed to prefix '{}'", self.prefix);
                        return Ok(());
                    }
                    return Err(RateError::Transport(format!(
                        "subscription to '{}' rejected: {}",
                        self.prefix, message
                    )));
                }
                ServerFrame::Quote { topic, .. } => {
                    debug!("Ignoring quote for {} received before subscription ack", topic);
                }
            }
        }
    }

    /// Waits for the next matching quote.
    pub async fn next_message(&mut self) -> Result<TopicMessage> {
        loop {
            match self.next_frame().await? {
                ServerFrame::Quote { topic, payload } => {
                    if topic.as_bytes().starts_with(self.prefix.as_bytes()) {
                        return Ok(TopicMessage { topic, payload });
                    }
                    warn!("Dropping quote for unsubscribed topic {}", topic);
                }
                ServerFrame::Ack { status, message, .. } => {
                    debug!("Publisher ack ({}): {}", status, message);
                }
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<TopicMessage>> {
        futures::stream::unfold(self, |mut subscription| async move {
            let item = subscription.next_message().await;
            Some((item, subscription))
        })
    }

    /// Closes the connection; the publisher drops the subscription.
    pub async fn close(mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<ServerFrame> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(RateError::Transport("connection closed by publisher".to_string())),
            };

            match msg {
                Message::Text(text) => {
                    return serde_json::from_str::<ServerFrame>(&text)
                        .map_err(|e| RateError::Transport(format!("malformed frame from publisher: {}", e)));
                }
                Message::Close(frame) => {
                    return Err(RateError::Transport(format!("publisher closed the connection: {:?}", frame)));
                }
                _ => {}
            }
        }
    }
}
