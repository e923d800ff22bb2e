//! WebSocket transport
//!
//! Uses tokio-tungstenite. One pump task per connection owns both halves of
//! the socket; everything else talks to it through the link queues.

use std::future::Future;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use super::transport_types::{ChannelError, ChannelEvent, ChannelTransport, Frame, Link};

/// WebSocket transport
#[derive(Debug, Clone, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

impl ChannelTransport for WsTransport {
    fn connect(&self, url: &str) -> impl Future<Output = Result<Link, ChannelError>> + Send {
        let url = url.to_string();
        async move {
            let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| ChannelError::Connect(e.to_string()))?;

            let (mut sink, mut stream) = socket.split();
            let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();
            let (inbound_tx, inbound) = mpsc::unbounded_channel::<ChannelEvent>();

            let pump = tokio::spawn(async move {
                loop {
                    tokio::select! {
                        frame = outbound_rx.recv() => match frame {
                            Some(Frame::Text(text)) => {
                                if let Err(e) = sink.send(Message::Text(text)).await {
                                    let _ = inbound_tx.send(ChannelEvent::Disconnected(e.to_string()));
                                    break;
                                }
                            }
                            Some(Frame::Close) | None => {
                                let _ = sink.send(Message::Close(None)).await;
                                break;
                            }
                        },
                        message = stream.next() => match message {
                            Some(Ok(Message::Text(text))) => {
                                let _ = inbound_tx.send(ChannelEvent::from_frame(&text));
                            }
                            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                                Ok(text) => {
                                    let _ = inbound_tx.send(ChannelEvent::from_frame(&text));
                                }
                                Err(_) => warn!("non-utf8 binary frame dropped"),
                            },
                            Some(Ok(Message::Close(frame))) => {
                                let reason = frame
                                    .map(|f| format!("closed by server ({})", u16::from(f.code)))
                                    .unwrap_or_else(|| "closed by server".to_string());
                                let _ = inbound_tx.send(ChannelEvent::Disconnected(reason));
                                break;
                            }
                            // ping/pong are answered by tungstenite
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                let _ = inbound_tx.send(ChannelEvent::Disconnected(e.to_string()));
                                break;
                            }
                            None => {
                                let _ = inbound_tx
                                    .send(ChannelEvent::Disconnected("stream ended".to_string()));
                                break;
                            }
                        },
                    }
                }
                debug!("websocket pump stopped");
            });

            Ok(Link {
                outbound,
                inbound,
                pump,
            })
        }
    }
}
