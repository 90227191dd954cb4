//! End-to-end tests over real sockets.
//!
//! Each test binds a server on an ephemeral port, talks to it with
//! tokio-tungstenite clients and shuts it down afterwards.

use std::{net::SocketAddr, time::Duration};

use futures::{SinkExt, StreamExt};
use huddle_proto::{ClientMessage, JoinRequest, PositionUpdate, ServerMessage};
use huddle_server::{DriverConfig, GREETING, Server, ServerRuntimeConfig};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::oneshot,
    task::JoinHandle,
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_millis(250);

struct Running {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Running {
    async fn start() -> Self {
        Self::with_config(ServerRuntimeConfig::default()).await
    }

    async fn with_config(config: ServerRuntimeConfig) -> Self {
        let config = ServerRuntimeConfig { bind_address: "127.0.0.1:0".to_string(), ..config };
        let server = Server::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (shutdown, rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let _ = server
                .run_until(async move {
                    let _ = rx.await;
                })
                .await;
        });

        Self { addr, shutdown, task }
    }

    async fn client(&self) -> Client {
        let (ws, _) = connect_async(format!("ws://{}/ws", self.addr)).await.unwrap();
        ws
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        let finished = tokio::time::timeout(Duration::from_secs(5), self.task).await;
        assert!(finished.is_ok(), "server did not shut down");
    }
}

async fn send(ws: &mut Client, message: ClientMessage) {
    ws.send(Message::text(message.encode().unwrap())).await.unwrap();
}

fn join(room: &str, name: &str) -> ClientMessage {
    ClientMessage::Join(JoinRequest { room_name: room.to_string(), username: name.to_string() })
}

/// Next relay event, or `None` if nothing arrives within [`WAIT`].
async fn next_event(ws: &mut Client) -> Option<ServerMessage> {
    loop {
        let frame = tokio::time::timeout(WAIT, ws.next()).await.ok()??.ok()?;
        match frame {
            Message::Text(text) => return Some(ServerMessage::decode(text.as_str()).unwrap()),
            Message::Close(_) => return None,
            _ => {},
        }
    }
}

/// Keep reading (and so answering pings) without sending anything.
async fn listen_for(ws: &mut Client, period: Duration) {
    let _ = tokio::time::timeout(period, async {
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;
}

/// Join `room` from `joiner` until `watcher` hears about it.
///
/// The two sockets are independent, so the watcher's own join may still be
/// in flight the first time round.
async fn join_until_seen(
    joiner: &mut Client,
    watcher: &mut Client,
    room: &str,
    name: &str,
) -> ServerMessage {
    for _ in 0..20 {
        send(joiner, join(room, name)).await;
        if let Some(event) = next_event(watcher).await {
            return event;
        }
    }
    panic!("{name} joining {room} was never announced");
}

#[tokio::test]
async fn greeting_on_root() {
    let running = Running::start().await;

    let mut stream = TcpStream::connect(running.addr).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains(&format!("\"{GREETING}\"")));

    running.stop().await;
}

#[tokio::test]
async fn lobby_over_websockets() {
    let running = Running::start().await;
    let mut alice = running.client().await;
    let mut bob = running.client().await;

    send(&mut alice, join("lobby", "alice")).await;
    let ServerMessage::UserJoined(joined) =
        join_until_seen(&mut bob, &mut alice, "lobby", "bob").await
    else {
        panic!("expected userJoined");
    };
    assert_eq!(joined.username, "bob");
    assert!(joined.color.is_well_formed());
    let bob_id = joined.user_id.clone();

    send(&mut bob, ClientMessage::MousePosition(PositionUpdate { x: 10.0, y: 20.0 })).await;
    let position = loop {
        match next_event(&mut alice).await {
            Some(ServerMessage::MousePosition(position)) => break position,
            Some(ServerMessage::UserJoined(_)) => {},
            other => panic!("expected mousePosition, got {other:?}"),
        }
    };
    assert_eq!(position.username, "bob");
    assert_eq!((position.x, position.y), (10.0, 20.0));
    assert_eq!(position.color, joined.color);

    bob.close(None).await.unwrap();
    let left = loop {
        match next_event(&mut alice).await {
            Some(ServerMessage::UserLeft(left)) => break left,
            Some(_) => {},
            None => panic!("alice never heard bob leave"),
        }
    };
    assert_eq!(left.user_id, bob_id);

    alice.close(None).await.unwrap();
    running.stop().await;
}

#[tokio::test]
async fn malformed_frames_are_dropped() {
    let running = Running::start().await;
    let mut alice = running.client().await;
    let mut bob = running.client().await;

    alice.send(Message::text("not json".to_string())).await.unwrap();
    alice.send(Message::text(r#"{"event":"dance","data":{}}"#.to_string())).await.unwrap();
    send(&mut alice, join("lobby", "alice")).await;

    let event = join_until_seen(&mut bob, &mut alice, "lobby", "bob").await;
    assert_eq!(event.event_name(), "userJoined");

    alice.close(None).await.unwrap();
    bob.close(None).await.unwrap();
    running.stop().await;
}

#[tokio::test]
async fn passive_listeners_outlive_the_idle_timeout() {
    let running = Running::with_config(ServerRuntimeConfig {
        tick_interval: Duration::from_millis(50),
        heartbeat_interval: Duration::from_millis(50),
        driver: DriverConfig {
            connection: huddle_core::ConnectionConfig { idle_timeout: Duration::from_millis(400) },
            ..Default::default()
        },
        ..Default::default()
    })
    .await;
    let mut alice = running.client().await;
    let mut bob = running.client().await;

    send(&mut alice, join("lobby", "alice")).await;
    join_until_seen(&mut bob, &mut alice, "lobby", "bob").await;

    // Neither side sends a message for several idle timeouts.
    for _ in 0..6 {
        listen_for(&mut alice, Duration::from_millis(100)).await;
        listen_for(&mut bob, Duration::from_millis(100)).await;
    }

    send(&mut bob, ClientMessage::MousePosition(PositionUpdate { x: 1.0, y: 2.0 })).await;
    let position = loop {
        match next_event(&mut alice).await {
            Some(ServerMessage::MousePosition(position)) => break position,
            Some(ServerMessage::UserJoined(_)) => {},
            other => panic!("alice was dropped while listening: {other:?}"),
        }
    };
    assert_eq!(position.username, "bob");

    alice.close(None).await.unwrap();
    bob.close(None).await.unwrap();
    running.stop().await;
}
