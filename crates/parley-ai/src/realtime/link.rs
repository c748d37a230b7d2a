//! A live connection to the upstream voice-AI service.
//!
//! A [`RealtimeLink`] is a pair of channels: outbound client events go through
//! the [`LinkSender`], inbound server events arrive on `events`. The socket
//! itself is owned by background writer/reader tasks, so the room that holds
//! the link never blocks on I/O.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::protocol::{RealtimeClientEvent, RealtimeServerEvent};
use crate::AiError;

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Event(RealtimeServerEvent),
    /// The link is gone. Always the last event delivered.
    Closed { reason: String },
}

/// Cloneable handle for writing to a link.
#[derive(Debug, Clone)]
pub struct LinkSender {
    tx: mpsc::UnboundedSender<RealtimeClientEvent>,
    cancel: CancellationToken,
}

impl LinkSender {
    pub fn send(&self, event: RealtimeClientEvent) -> Result<(), AiError> {
        if self.cancel.is_cancelled() {
            return Err(AiError::Closed);
        }
        self.tx.send(event).map_err(|_| AiError::Closed)
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}

pub struct RealtimeLink {
    pub sender: LinkSender,
    pub events: mpsc::UnboundedReceiver<LinkEvent>,
}

/// The far side of an in-process link.
pub struct LinkPeer {
    pub outbound: mpsc::UnboundedReceiver<RealtimeClientEvent>,
    pub inbound: mpsc::UnboundedSender<LinkEvent>,
    pub cancel: CancellationToken,
}

impl RealtimeLink {
    /// Build a link whose other end is handed back to the caller instead of a
    /// socket. Transports and test doubles drive the returned [`LinkPeer`].
    pub fn pair() -> (RealtimeLink, LinkPeer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let link = RealtimeLink {
            sender: LinkSender {
                tx: out_tx,
                cancel: cancel.clone(),
            },
            events: in_rx,
        };
        let peer = LinkPeer {
            outbound: out_rx,
            inbound: in_tx,
            cancel,
        };
        (link, peer)
    }
}

#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    async fn connect(&self) -> Result<RealtimeLink, AiError>;
}

// ---------------------------------------------------------------------------
// WebSocket transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WsRealtimeConnector {
    pub url: String,
    pub model: String,
    pub api_key: String,
    pub connect_timeout: Duration,
}

impl WsRealtimeConnector {
    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            url: url.into(),
            model: model.into(),
            api_key: api_key.into(),
            connect_timeout,
        }
    }

    fn endpoint(&self) -> String {
        if self.model.is_empty() {
            self.url.clone()
        } else if self.url.contains('?') {
            format!("{}&model={}", self.url, self.model)
        } else {
            format!("{}?model={}", self.url, self.model)
        }
    }
}

#[async_trait]
impl RealtimeConnector for WsRealtimeConnector {
    async fn connect(&self) -> Result<RealtimeLink, AiError> {
        let endpoint = self.endpoint();
        let mut request = endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| AiError::Connection(e.to_string()))?;
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| AiError::Connection(e.to_string()))?;
        request.headers_mut().insert("Authorization", auth);
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        info!(url = %self.url, model = %self.model, "Connecting upstream realtime link");

        let (ws_stream, _) =
            match tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(request))
                .await
            {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => return Err(AiError::Connection(e.to_string())),
                Err(_elapsed) => return Err(AiError::Timeout),
            };

        let (link, peer) = RealtimeLink::pair();
        let LinkPeer {
            mut outbound,
            inbound,
            cancel,
        } = peer;
        let (mut ws_write, mut ws_read) = ws_stream.split();

        // Writer: drain outbound events until the link is cancelled.
        let writer_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_cancel.cancelled() => {
                        let _ = ws_write.send(WsMessage::Close(None)).await;
                        break;
                    }
                    next = outbound.recv() => {
                        let Some(event) = next else { break };
                        let json = match event.to_json() {
                            Ok(json) => json,
                            Err(e) => {
                                warn!(error = %e, "Dropping unserializable upstream event");
                                continue;
                            }
                        };
                        if ws_write.send(WsMessage::Text(json.into())).await.is_err() {
                            writer_cancel.cancel();
                            break;
                        }
                    }
                }
            }
        });

        // Reader: parse frames and hand them to the owner.
        tokio::spawn(async move {
            let reason = loop {
                tokio::select! {
                    _ = cancel.cancelled() => break "closed locally".to_string(),
                    msg = ws_read.next() => match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            match RealtimeServerEvent::parse(&text) {
                                Ok(event) => {
                                    if inbound.send(LinkEvent::Event(event)).is_err() {
                                        break "owner dropped".to_string();
                                    }
                                }
                                Err(e) => debug!(error = %e, "Unparseable upstream frame"),
                            }
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            break frame
                                .map(|f| f.reason.to_string())
                                .filter(|r| !r.is_empty())
                                .unwrap_or_else(|| "closed by upstream".to_string());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break e.to_string(),
                        None => break "stream ended".to_string(),
                    }
                }
            };
            cancel.cancel();
            info!(reason = %reason, "Upstream realtime link closed");
            let _ = inbound.send(LinkEvent::Closed { reason });
        });

        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pair_delivers_both_directions() {
        let (mut link, mut peer) = RealtimeLink::pair();
        link.sender
            .send(RealtimeClientEvent::InputAudioCommit)
            .unwrap();
        assert_eq!(
            peer.outbound.recv().await,
            Some(RealtimeClientEvent::InputAudioCommit)
        );

        peer.inbound
            .send(LinkEvent::Event(RealtimeServerEvent::SessionCreated))
            .unwrap();
        assert_eq!(
            link.events.recv().await,
            Some(LinkEvent::Event(RealtimeServerEvent::SessionCreated))
        );
    }

    #[tokio::test]
    async fn closed_sender_rejects_events() {
        let (link, peer) = RealtimeLink::pair();
        link.sender.close();
        assert!(peer.cancel.is_cancelled());
        assert!(link.sender.is_closed());
        assert!(matches!(
            link.sender.send(RealtimeClientEvent::ResponseCancel),
            Err(AiError::Closed)
        ));
    }

    #[test]
    fn endpoint_appends_model() {
        let c = WsRealtimeConnector::new(
            "wss://example.test/v1/realtime",
            "model-a",
            "k",
            Duration::from_secs(1),
        );
        assert_eq!(c.endpoint(), "wss://example.test/v1/realtime?model=model-a");

        let c = WsRealtimeConnector::new("wss://x/rt?v=2", "m", "k", Duration::from_secs(1));
        assert_eq!(c.endpoint(), "wss://x/rt?v=2&model=m");
    }

    #[tokio::test]
    async fn connect_to_unreachable_host_fails() {
        let c = WsRealtimeConnector::new(
            "ws://127.0.0.1:1/realtime",
            "",
            "k",
            Duration::from_secs(2),
        );
        let result = c.connect().await;
        assert!(matches!(
            result,
            Err(AiError::Connection(_)) | Err(AiError::Timeout)
        ));
    }
}
