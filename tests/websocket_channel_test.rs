//! WebSocket channel tests
//!
//! Run the real [`WebSocketConnector`] against a local axum WebSocket server
//! and check the handshake, inbound decoding, outbound frames, reconnects,
//! and a full sign-in flow through the controller.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chat_client::state::{SessionIdentity, SessionStore};
use chat_client::validation::{InputLimits, SignInForm};
use chat_client::websocket::{
    ChannelConnector, ChannelEnvelope, ChannelEvent, ClientEvent, ConnectionState,
    OutgoingMessage, ReconnectPolicy, ServerEvent, WebSocketConnector,
};
use chat_client::api::HttpChatApi;
use chat_client::ChatClient;
use serial_test::serial;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const NEW_MESSAGE: &str = r#"{"event":"new-message","data":{"_id":"m1","chat":"c1","sender":{"_id":"u2","name":"Bob","email":"bob@example.com"},"message":"hello","createdAt":"2024-05-01T12:00:00.000Z"}}"#;

#[derive(Clone)]
struct ServerState {
    /// Text frames received from clients, in order
    received: mpsc::UnboundedSender<String>,
    /// Connections accepted so far
    connections: Arc<AtomicUsize>,
    /// Drop the first connection right after its setup frame
    drop_first: bool,
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(mut socket: WebSocket, state: ServerState) {
    let index = state.connections.fetch_add(1, Ordering::SeqCst);

    // The first frame of every connection is the setup handshake
    if let Some(Ok(WsMessage::Text(text))) = socket.recv().await {
        let _ = state.received.send(text);
    }
    if state.drop_first && index == 0 {
        let _ = socket.send(WsMessage::Close(None)).await;
        return;
    }

    let _ = socket
        .send(WsMessage::Text(r#"{"event":"connection"}"#.to_string()))
        .await;
    let _ = socket.send(WsMessage::Text(NEW_MESSAGE.to_string())).await;

    while let Some(Ok(frame)) = socket.recv().await {
        match frame {
            WsMessage::Text(text) => {
                let _ = state.received.send(text);
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }
}

async fn spawn_server(drop_first: bool) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let state = ServerState {
        received: tx,
        connections: Arc::new(AtomicUsize::new(0)),
        drop_first,
    };
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, rx)
}

fn identity() -> SessionIdentity {
    SessionIdentity {
        user_id: "u1".to_string(),
        name: "Ada".to_string(),
        email: "ada@example.com".to_string(),
    }
}

fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(200),
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChannelEnvelope>) -> ChannelEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for channel event")
        .expect("event stream ended")
        .event
}

async fn next_frame(rx: &mut mpsc::UnboundedReceiver<String>) -> ClientEvent {
    let text = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("server stopped");
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn test_handshake_inbound_and_outbound() {
    let (addr, mut frames) = spawn_server(false).await;
    let connector = WebSocketConnector::new(format!("http://{}/ws", addr), fast_policy(3));
    let (tx, mut events) = mpsc::unbounded_channel();

    let channel = connector.open(identity(), tx).await.unwrap();

    assert_eq!(
        next_event(&mut events).await,
        ChannelEvent::State(ConnectionState::Connecting)
    );
    assert_eq!(
        next_event(&mut events).await,
        ChannelEvent::State(ConnectionState::Connected)
    );
    assert_eq!(next_frame(&mut frames).await, ClientEvent::Setup(identity()));
    assert!(channel.is_connected());

    assert_eq!(
        next_event(&mut events).await,
        ChannelEvent::Server(ServerEvent::Connection)
    );
    match next_event(&mut events).await {
        ChannelEvent::Server(ServerEvent::NewMessage(message)) => {
            assert_eq!(message.id, "m1");
            assert_eq!(message.conversation_id, "c1");
            assert_eq!(message.sender.id, "u2");
            assert_eq!(message.body, "hello");
        }
        other => panic!("unexpected event: {:?}", other),
    }

    let outgoing = ClientEvent::SendMessage(OutgoingMessage {
        conversation_id: "c1".to_string(),
        body: "hi".to_string(),
    });
    channel.emit(outgoing.clone()).await.unwrap();
    assert_eq!(next_frame(&mut frames).await, outgoing);

    channel.close().await;
    assert_eq!(
        next_event(&mut events).await,
        ChannelEvent::State(ConnectionState::Closed)
    );
    assert!(!channel.is_connected());
}

#[tokio::test]
async fn test_reconnect_repeats_setup() {
    let (addr, mut frames) = spawn_server(true).await;
    let connector = WebSocketConnector::new(format!("ws://{}/ws", addr), fast_policy(3));
    let (tx, mut events) = mpsc::unbounded_channel();

    let channel = connector.open(identity(), tx).await.unwrap();

    // First connection is dropped by the server after setup
    assert_eq!(next_frame(&mut frames).await, ClientEvent::Setup(identity()));
    let mut states = Vec::new();
    loop {
        match next_event(&mut events).await {
            ChannelEvent::State(state) => {
                states.push(state);
                if state == ConnectionState::Connected && states.len() > 2 {
                    break;
                }
            }
            ChannelEvent::Server(_) => {}
        }
    }
    assert_eq!(
        states,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Reconnecting { attempt: 1 },
            ConnectionState::Connected,
        ]
    );
    assert_eq!(next_frame(&mut frames).await, ClientEvent::Setup(identity()));

    channel.close().await;
}

#[tokio::test]
#[serial]
async fn test_sign_in_and_receive_through_controller() {
    let (addr, mut frames) = spawn_server(false).await;
    let mut server = mockito::Server::new_async().await;
    let _login = server
        .mock("POST", "/api/user/login")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"_id":"u1","name":"Ada","email":"ada@example.com","token":"jwt"}"#,
        )
        .create_async()
        .await;
    let _chats = server
        .mock("GET", "/api/chat")
        .match_header("authorization", "Bearer jwt")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[{"_id":"c1","isGroupChat":false,"chatName":"sender","users":[{"_id":"u1","name":"Ada"},{"_id":"u2","name":"Bob"}]}]"#,
        )
        .create_async()
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let client = ChatClient::new(
        Arc::new(HttpChatApi::new(reqwest::Client::new(), server.url())),
        Arc::new(WebSocketConnector::new(
            format!("ws://{}/ws", addr),
            fast_policy(3),
        )),
        SessionStore::new(dir.path().join("session.json")),
        InputLimits::default(),
    );

    client
        .sign_in(&SignInForm {
            email: "ada@example.com".to_string(),
            password: "secret123".to_string(),
        })
        .await
        .unwrap();
    client.enter_authenticated_area().await.unwrap();
    client.load_conversations().await.unwrap();
    assert_eq!(next_frame(&mut frames).await, ClientEvent::Setup(identity()));

    // The pump applies the server's new-message to the unread count
    let state = client.state();
    let mut delivered = false;
    for _ in 0..200 {
        if state.read().await.unread_count("c1") == 1 {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(delivered, "new-message was not applied");
    assert!(state.read().await.server_acknowledged);
    assert!(state.read().await.is_ready());

    client.leave_authenticated_area().await;
    assert!(client.channel_id().await.is_none());
}
