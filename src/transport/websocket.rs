use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{ChannelEvent, ChannelHandle, Connector};
use crate::error::SessionError;
use crate::protocol::OutboundMessage;

const WS_CHANNEL_CAPACITY: usize = 256;

/// Opens JSON-over-WebSocket channels with `tokio-tungstenite`
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    capacity: usize,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self {
            capacity: WS_CHANNEL_CAPACITY,
        }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &Url) -> Result<ChannelHandle, SessionError> {
        let host = url.host_str().unwrap_or("<unknown>").to_string();
        info!("Opening conversation channel to {}", host);

        let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        info!("Conversation channel open: {}", host);

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundMessage>(self.capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel::<ChannelEvent>(self.capacity);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outgoing = outbound_rx.recv() => {
                        let Some(message) = outgoing else {
                            debug!("Channel handle dropped, closing WebSocket");
                            if let Err(e) = ws_sink.close().await {
                                debug!("WebSocket close failed: {}", e);
                            }
                            break;
                        };

                        let json = match message.to_json() {
                            Ok(json) => json,
                            Err(e) => {
                                error!("Failed to serialize {}: {}", message.kind(), e);
                                continue;
                            }
                        };

                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            error!("Failed to send WebSocket message: {}", e);
                            let _ = inbound_tx.send(ChannelEvent::Error(e.to_string())).await;
                            break;
                        }
                    }

                    incoming = ws_stream.next() => {
                        match incoming {
                            Some(Ok(Message::Text(text))) => {
                                let event = ChannelEvent::Message(text.as_str().to_owned());
                                if inbound_tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                    error!("Failed to send pong: {}", e);
                                }
                            }
                            Some(Ok(Message::Binary(data))) => {
                                warn!("Ignoring {} byte binary frame", data.len());
                            }
                            Some(Ok(Message::Close(frame))) => {
                                info!("WebSocket closed by server: {:?}", frame);
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                error!("WebSocket error: {}", e);
                                let _ = inbound_tx.send(ChannelEvent::Error(e.to_string())).await;
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }

            let _ = inbound_tx.send(ChannelEvent::Closed).await;
            debug!("WebSocket pump finished");
        });

        Ok(ChannelHandle::new(outbound_tx, inbound_rx))
    }
}
