use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

use super::*;
use crate::peers::PeerDirectory;
use crate::protocol::ErrorPayload;
use crate::types::RoomConfig;

/// A scripted relay: one room, accepts connections on demand.
struct FakeRelay {
    listener: TcpListener,
    directory: PeerDirectory,
}

impl FakeRelay {
    async fn start() -> (Self, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let directory = PeerDirectory::new("r1", &RoomConfig::default(), "facilitator", 8);
        (Self { listener, directory }, url)
    }

    async fn accept(&self) -> WebSocketStream<TcpStream> {
        let (stream, _) = self.listener.accept().await.unwrap();
        tokio_tungstenite::accept_async(stream).await.unwrap()
    }

    async fn read_client(ws: &mut WebSocketStream<TcpStream>) -> ClientMessage {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .expect("client frame")
                .unwrap()
                .unwrap();
            if let WsMessage::Text(text) = frame {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn write(ws: &mut WebSocketStream<TcpStream>, message: &ServerMessage) {
        let json = serde_json::to_string(message).unwrap();
        ws.send(WsMessage::Text(json.into())).await.unwrap();
    }

    /// Read a join and answer with `room:joined`.
    async fn admit(&mut self, ws: &mut WebSocketStream<TcpStream>) -> JoinRequest {
        let ClientMessage::Join(request) = Self::read_client(ws).await else {
            panic!("expected room:join first");
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let peer = self
            .directory
            .join(
                &request.display_name,
                request.avatar.clone(),
                request.peer_id.clone(),
                tx,
                1_000,
            )
            .unwrap();
        let joined = ServerMessage::Joined {
            room: self.directory.info(),
            local_peer: peer,
            peers: Vec::new(),
            ai_state: Default::default(),
        };
        Self::write(ws, &joined).await;
        request
    }
}

fn fast_config(url: &str) -> RoomClientConfig {
    let mut config = RoomClientConfig::new(url, "r1", "Ada");
    config.policy.base_delay = Duration::from_millis(5);
    config.policy.max_delay = Duration::from_millis(20);
    config.policy.jitter = 0.0;
    config.join_timeout = Duration::from_secs(2);
    config
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("client event")
        .expect("event stream open")
}

#[tokio::test]
async fn connect_joins_and_tracks_peers() {
    let (mut relay, url) = FakeRelay::start().await;
    let server = tokio::spawn(async move {
        let mut ws = relay.accept().await;
        relay.admit(&mut ws).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let bo = relay.directory.join("Bo", None, None, tx, 2_000).unwrap();
        FakeRelay::write(&mut ws, &ServerMessage::PeerJoined { peer: bo }).await;
        FakeRelay::read_client(&mut ws).await
    });

    let (client, mut events) = RoomClient::connect(fast_config(&url)).await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::Message(ServerMessage::Joined { .. })
    ));
    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::Message(ServerMessage::PeerJoined { .. })
    ));

    let snap = client.snapshot().await;
    assert_eq!(snap.room_id, "r1");
    assert_eq!(snap.local_peer_id, client.local_peer().id);
    assert_eq!(snap.peers.len(), 1);
    assert_eq!(snap.peers[0].display_name, "Bo");

    client.send(ClientMessage::Heartbeat).unwrap();
    assert_eq!(server.await.unwrap(), ClientMessage::Heartbeat);
}

#[tokio::test]
async fn rejected_join_surfaces_the_error_code() {
    let (relay, url) = FakeRelay::start().await;
    tokio::spawn(async move {
        let mut ws = relay.accept().await;
        FakeRelay::read_client(&mut ws).await;
        let error = ServerMessage::Error(ErrorPayload::from(&parley_common::RoomError::RoomFull));
        FakeRelay::write(&mut ws, &error).await;
    });

    match RoomClient::connect(fast_config(&url)).await {
        Err(ClientError::Rejected { code, .. }) => assert_eq!(code, "ROOM_FULL"),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("join should have been rejected"),
    }
}

#[tokio::test]
async fn dropped_connection_rejoins_with_saved_peer_id() {
    let (mut relay, url) = FakeRelay::start().await;
    let server = tokio::spawn(async move {
        let mut first = relay.accept().await;
        relay.admit(&mut first).await;
        let peer_id = relay.directory.peer_ids().remove(0);
        drop(first);
        relay.directory.leave(&peer_id);

        let mut second = relay.accept().await;
        let rejoin = relay.admit(&mut second).await;
        (peer_id, rejoin, second)
    });

    let (client, mut events) = RoomClient::connect(fast_config(&url)).await.unwrap();
    let original_id = client.local_peer().id.clone();

    let mut saw_reconnecting = false;
    loop {
        match next_event(&mut events).await {
            ClientEvent::Reconnecting { attempt, .. } => {
                assert_eq!(attempt, 1);
                saw_reconnecting = true;
            }
            ClientEvent::Reconnected { .. } => break,
            ClientEvent::Disconnected { reason } => panic!("gave up: {reason}"),
            ClientEvent::Message(_) => {}
        }
    }
    assert!(saw_reconnecting);

    let (server_side_id, rejoin, _socket) = server.await.unwrap();
    assert_eq!(server_side_id, original_id);
    assert_eq!(rejoin.peer_id.as_deref(), Some(original_id.as_str()));
    assert_eq!(rejoin.room_id, "r1");

    match next_event(&mut events).await {
        ClientEvent::Message(ServerMessage::Joined { local_peer, .. }) => {
            assert_eq!(local_peer.id, original_id)
        }
        other => panic!("expected room:joined, got {other:?}"),
    }
    assert_eq!(client.snapshot().await.local_peer_id, original_id);
}

#[tokio::test]
async fn room_closed_stops_the_client() {
    let (mut relay, url) = FakeRelay::start().await;
    tokio::spawn(async move {
        let mut ws = relay.accept().await;
        relay.admit(&mut ws).await;
        let closed = ServerMessage::RoomClosed {
            reason: "meeting over".into(),
        };
        FakeRelay::write(&mut ws, &closed).await;
        // Keep the socket open; the client must stop on the event alone.
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let (client, mut events) = RoomClient::connect(fast_config(&url)).await.unwrap();
    loop {
        match next_event(&mut events).await {
            ClientEvent::Disconnected { reason } => {
                assert_eq!(reason, "meeting over");
                break;
            }
            ClientEvent::Reconnecting { .. } => panic!("closed rooms are not rejoined"),
            _ => {}
        }
    }
    assert!(client.snapshot().await.peers.is_empty());
}

#[tokio::test]
async fn leave_sends_goodbye_and_ends_stream() {
    let (mut relay, url) = FakeRelay::start().await;
    let server = tokio::spawn(async move {
        let mut ws = relay.accept().await;
        relay.admit(&mut ws).await;
        FakeRelay::read_client(&mut ws).await
    });

    let (client, mut events) = RoomClient::connect(fast_config(&url)).await.unwrap();
    client.leave().unwrap();
    assert_eq!(server.await.unwrap(), ClientMessage::Leave);
    loop {
        if let ClientEvent::Disconnected { reason } = next_event(&mut events).await {
            assert_eq!(reason, "left");
            break;
        }
    }
}
