//! Per-connection handler: wait for the join, register with the room, then
//! pump frames both ways until either side goes away.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use parley_social::protocol::{ClientMessage, ErrorPayload, JoinRequest, ServerMessage};
use parley_social::RegistryHandle;

type Sink = SplitSink<WebSocketStream<TcpStream>, Message>;
type Stream = SplitStream<WebSocketStream<TcpStream>>;

/// Handle a single WebSocket connection.
pub async fn handle_connection(
    ws: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    registry: RegistryHandle,
    hello_timeout: Duration,
) {
    let (mut sink, mut stream) = ws.split();

    // 1. The first frame must be room:join.
    let request = match read_join(&mut stream, addr, hello_timeout).await {
        Ok(request) => request,
        Err(Some(message)) => {
            let error = ServerMessage::Error(ErrorPayload {
                code: "INVALID_HELLO".into(),
                message,
                active_speaker_id: None,
            });
            let _ = send_message(&mut sink, &error).await;
            let _ = sink.close().await;
            return;
        }
        Err(None) => return,
    };

    // 2. Join. The room writes room:joined to our queue before replying.
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let room_id = request.room_id.clone();
    let (room, peer) = match registry.join(request, tx).await {
        Ok(joined) => joined,
        Err(e) => {
            tracing::info!(peer = %addr, room_id = %room_id, error = %e, "Join refused");
            let _ = send_message(&mut sink, &ServerMessage::error(&e)).await;
            let _ = sink.close().await;
            return;
        }
    };

    tracing::info!(
        peer = %addr,
        room_id = %room_id,
        peer_id = %peer.id,
        name = %peer.display_name,
        "Client joined"
    );

    // 3. Forwarding loop.
    loop {
        tokio::select! {
            // Room → this client. The queue closes when the room drops us.
            outbound = rx.recv() => {
                let Some(message) = outbound else { break };
                if send_message(&mut sink, &message).await.is_err() {
                    break;
                }
            }

            // This client → room.
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let message = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(message) => message,
                            Err(e) => {
                                tracing::debug!(peer = %addr, error = %e, "Unparseable client frame");
                                continue;
                            }
                        };
                        let leaving = matches!(message, ClientMessage::Leave);
                        if room.client(&peer.id, message).is_err() {
                            break;
                        }
                        if leaving {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    // 4. Cleanup. A no-op when the peer already left or the room closed.
    tracing::info!(peer = %addr, room_id = %room_id, peer_id = %peer.id, "Client disconnected");
    let _ = room.leave(&peer.id, "disconnect");
    let _ = sink.close().await;
}

/// Read the first frame as a `room:join`.
///
/// `Err(Some(reason))` is reported to the client; `Err(None)` means the
/// connection is already gone.
async fn read_join(
    stream: &mut Stream,
    addr: SocketAddr,
    hello_timeout: Duration,
) -> Result<JoinRequest, Option<String>> {
    let frame = tokio::time::timeout(hello_timeout, stream.next()).await;

    match frame {
        Ok(Some(Ok(Message::Text(text)))) => match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Join(request)) => Ok(request),
            Ok(other) => {
                tracing::warn!(peer = %addr, event = other.event_name(), "Expected room:join first");
                Err(Some(format!("expected room:join, got {}", other.event_name())))
            }
            Err(e) => {
                tracing::warn!(peer = %addr, error = %e, "Invalid join message");
                Err(Some("invalid room:join".into()))
            }
        },
        Ok(Some(Ok(_))) => {
            tracing::warn!(peer = %addr, "Expected text join, got another frame");
            Err(Some("expected a text room:join frame".into()))
        }
        Ok(Some(Err(e))) => {
            tracing::warn!(peer = %addr, error = %e, "WS error during join");
            Err(None)
        }
        Ok(None) => {
            tracing::debug!(peer = %addr, "Connection closed before join");
            Err(None)
        }
        Err(_) => {
            tracing::warn!(peer = %addr, timeout_secs = hello_timeout.as_secs(), "Join timeout");
            Err(Some("timed out waiting for room:join".into()))
        }
    }
}

/// Send a server message as a JSON text frame.
async fn send_message(
    sink: &mut Sink,
    message: &ServerMessage,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let json = match message.to_json() {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(error = %e, "Dropping unserializable server message");
            return Ok(());
        }
    };
    sink.send(Message::Text(json.into())).await
}
