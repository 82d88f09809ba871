use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use uuid::Uuid;

use crate::data::{ServerFrame, SubscriptionMessage, TopicBus, TopicFilter, TopicMessage};

/// Path subscribers upgrade on.
pub const RATES_PATH: &str = "/rates";

/// Filter changes requested by the read half, applied by the write half.
#[derive(Debug)]
enum FilterCommand {
    Subscribe(String),
    Unsubscribe(String),
    Invalid(String),
}

/// Accepts subscriber connections until the listener fails.
pub async fn serve_subscribers(listener: TcpListener, bus: Arc<TopicBus>) {
    while let Ok((stream, addr)) = listener.accept().await {
        let peer_addr = addr.to_string();
        let rx = bus.subscribe();

        tokio::spawn(async move {
            let handler = WebSocketHandler::new(peer_addr);
            handler.handle_connection(stream, rx).await;
        });
    }
    error!("Subscriber listener stopped accepting connections");
}

pub struct WebSocketHandler {
    peer_addr: String,
    connection_id: Uuid,
}

impl WebSocketHandler {
    pub fn new(peer_addr: String) -> Self {
        Self {
            peer_addr,
            connection_id: Uuid::new_v4(),
        }
    }

    pub async fn handle_connection(self, stream: TcpStream, rx: broadcast::Receiver<TopicMessage>) {
        let ws_stream = match accept_hdr_async(stream, |req: &Request, response: Response| {
            self.check_path(req, response)
        })
        .await
        {
            Ok(ws) => ws,
            Err(e) => {
                error!("WebSocket handshake failed for {}: {:?}", self.peer_addr, e);
                return;
            }
        };

        self.handle_websocket_connection(ws_stream, rx).await;
    }

    fn check_path(&self, req: &Request, response: Response) -> Result<Response, ErrorResponse> {
        let path = req.uri().path();
        if path == RATES_PATH {
            info!("Subscriber connection request from {}", self.peer_addr);
            Ok(response)
        } else {
            warn!("Unknown WebSocket path '{}' from {}", path, self.peer_addr);
            let mut error = ErrorResponse::new(Some("Invalid WebSocket path".to_string()));
            *error.status_mut() = StatusCode::NOT_FOUND;
            Err(error)
        }
    }

    async fn handle_websocket_connection(
        &self,
        ws_stream: WebSocketStream<TcpStream>,
        rx: broadcast::Receiver<TopicMessage>,
    ) {
        let (write, read) = ws_stream.split();
        let short_id = self.short_id();

        info!("Subscriber {} connected from {}", short_id, self.peer_addr);

        let (command_tx, command_rx) = mpsc::channel::<FilterCommand>(16);

        let write_task = self.spawn_write_task(write, rx, command_rx);
        let read_task = self.spawn_read_task(read, command_tx);

        tokio::select! {
            _ = write_task => {
                info!("Write task completed for subscriber {}", short_id);
            }
            _ = read_task => {
                info!("Read task completed for subscriber {}", short_id);
            }
        }

        info!("Subscriber {} disconnected from {}", short_id, self.peer_addr);
    }

    fn short_id(&self) -> String {
        self.connection_id.to_string()[..8].to_string()
    }

    /// Owns the connection's filter. An ack is written only after its
    /// filter change is in place.
    fn spawn_write_task(
        &self,
        mut write: futures::stream::SplitSink<WebSocketStream<TcpStream>, Message>,
        mut rx: broadcast::Receiver<TopicMessage>,
        mut command_rx: mpsc::Receiver<FilterCommand>,
    ) -> tokio::task::JoinHandle<()> {
        let short_id = self.short_id();

        tokio::spawn(async move {
            let mut filter = TopicFilter::new();

            loop {
                let frame = tokio::select! {
                    command = command_rx.recv() => {
                        match command {
                            Some(command) => apply_command(&mut filter, command, &short_id),
                            None => {
                                info!("Read side closed for subscriber {}", short_id);
                                break;
                            }
                        }
                    }
                    published = rx.recv() => {
                        match published {
                            Ok(message) if filter.matches(&message.topic) => ServerFrame::from(message),
                            Ok(_) => continue,
                            Err(RecvError::Lagged(skipped)) => {
                                warn!("Subscriber {} lagged, skipped {} messages", short_id, skipped);
                                continue;
                            }
                            Err(RecvError::Closed) => {
                                info!("Topic bus closed, ending subscriber {}", short_id);
                                break;
                            }
                        }
                    }
                };

                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to serialize frame for subscriber {}: {}", short_id, e);
                        continue;
                    }
                };

                if let Err(e) = write.send(Message::Text(text)).await {
                    error!("Error sending to subscriber {}: {:?}", short_id, e);
                    break;
                }
            }

            if let Err(e) = write.close().await {
                debug!("Close handshake with subscriber {} failed: {:?}", short_id, e);
            }
        })
    }

    fn spawn_read_task(
        &self,
        mut read: futures::stream::SplitStream<WebSocketStream<TcpStream>>,
        command_tx: mpsc::Sender<FilterCommand>,
    ) -> tokio::task::JoinHandle<()> {
        let short_id = self.short_id();

        tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        let command = match serde_json::from_str::<SubscriptionMessage>(&text) {
                            Ok(sub) => match sub.action.as_str() {
                                "subscribe" => FilterCommand::Subscribe(sub.prefix),
                                "unsubscribe" => FilterCommand::Unsubscribe(sub.prefix),
                                other => FilterCommand::Invalid(format!("Unknown action: {}", other)),
                            },
                            Err(e) => FilterCommand::Invalid(format!("Malformed subscription message: {}", e)),
                        };
                        if command_tx.send(command).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        info!("Subscriber {} sent close frame: {:?}", short_id, frame);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("WebSocket error for subscriber {}: {:?}", short_id, e);
                        break;
                    }
                }
            }
        })
    }
}

fn apply_command(filter: &mut TopicFilter, command: FilterCommand, short_id: &str) -> ServerFrame {
    match command {
        FilterCommand::Subscribe(prefix) => {
            if filter.add(&prefix) {
                info!("Subscriber {} subscribed to prefix '{}'", short_id, prefix);
                ServerFrame::ack_success(&prefix, "Successfully subscribed")
            } else {
                ServerFrame::ack_error(Some(prefix), "Already subscribed to this prefix")
            }
        }
        FilterCommand::Unsubscribe(prefix) => {
            if filter.remove(&prefix) {
                info!("Subscriber {} unsubscribed from prefix '{}'", short_id, prefix);
                ServerFrame::ack_success(&prefix, "Successfully unsubscribed")
            } else {
                ServerFrame::ack_error(Some(prefix), "Not subscribed to this prefix")
            }
        }
        FilterCommand::Invalid(reason) => {
            warn!("Subscriber {}: {}", short_id, reason);
            ServerFrame::ack_error(None, &reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_creation() {
        let handler = WebSocketHandler::new("127.0.0.1:5563".to_string());
        assert_eq!(handler.peer_addr, "127.0.0.1:5563");
        assert_eq!(handler.short_id().len(), 8);
    }

    #[test]
    fn test_apply_command_acks() {
        let mut filter = TopicFilter::new();

        let ack = apply_command(&mut filter, FilterCommand::Subscribe("USD".to_string()), "test");
        assert_eq!(ack, ServerFrame::ack_success("USD", "Successfully subscribed"));
        assert!(filter.matches("USD"));

        let ack = apply_command(&mut filter, FilterCommand::Subscribe("USD".to_string()), "test");
        assert!(matches!(ack, ServerFrame::Ack { ref status, .. } if status == "error"));

        let ack = apply_command(&mut filter, FilterCommand::Unsubscribe("EUR".to_string()), "test");
        assert!(matches!(ack, ServerFrame::Ack { ref status, .. } if status == "error"));

        apply_command(&mut filter, FilterCommand::Unsubscribe("USD".to_string()), "test");
        assert!(filter.is_empty());
    }
}
