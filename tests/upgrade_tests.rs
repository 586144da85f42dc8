//! WebSocket upgrade tests over real sockets.
//!
//! A `WsServer` is started on an ephemeral port and driven with a plain
//! `tungstenite` client, so handshake routing, frame ordering and the close
//! lifecycle are all exercised end to end.

mod common;

use common::test_server::setup_may_runtime;
use panrouter::router::Router;
use panrouter::server::{ServerHandle, WsServer};
use panrouter::session::SessionRegistry;
use panrouter::upgrade::{ConnectionContext, ConnectionHandler, EchoConnection};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::CloseFrame;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

type Events = Arc<Mutex<Vec<String>>>;

struct Recording {
    events: Events,
}

impl ConnectionHandler for Recording {
    fn on_connect(&mut self, _ctx: &ConnectionContext) -> anyhow::Result<()> {
        self.events.lock().unwrap().push("connect".into());
        Ok(())
    }

    fn on_message(&mut self, ctx: &ConnectionContext, text: &str) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(format!("message {text}"));
        ctx.send(&text.to_uppercase())?;
        Ok(())
    }

    fn on_close(&mut self, _ctx: &ConnectionContext, code: u16, reason: &str) {
        self.events.lock().unwrap().push(format!("close {code} {reason}"));
    }
}

/// Relays every message to the other live sessions.
struct Chat;

impl ConnectionHandler for Chat {
    fn on_message(&mut self, ctx: &ConnectionContext, text: &str) -> anyhow::Result<()> {
        ctx.broadcast(text);
        Ok(())
    }
}

/// Test fixture with automatic teardown using RAII
struct WsFixture {
    handle: Option<ServerHandle>,
    sessions: Arc<SessionRegistry>,
    events: Events,
}

impl WsFixture {
    fn new() -> Self {
        setup_may_runtime();
        let events = Events::default();
        let mut router = Router::new();
        let sessions = router.sessions();

        router
            .upgrade("/echo", || Box::new(EchoConnection::default()) as Box<dyn ConnectionHandler>)
            .unwrap();
        let recorded = Arc::clone(&events);
        router
            .upgrade("/record", move || {
                Box::new(Recording {
                    events: Arc::clone(&recorded),
                }) as Box<dyn ConnectionHandler>
            })
            .unwrap();
        router
            .upgrade("/chat", || Box::new(Chat) as Box<dyn ConnectionHandler>)
            .unwrap();

        let (_dispatcher, bridge) = router.build();
        let handle = WsServer::new(Arc::new(bridge))
            .with_poll_interval(Duration::from_millis(10))
            .start("127.0.0.1:0")
            .unwrap();

        Self {
            handle: Some(handle),
            sessions,
            events,
        }
    }

    fn url(&self, path: &str) -> String {
        let addr = self.handle.as_ref().unwrap().addr();
        format!("ws://{addr}{path}")
    }

    fn connect(&self, path: &str) -> WebSocket<MaybeTlsStream<TcpStream>> {
        let (socket, _response) = tungstenite::connect(self.url(path)).unwrap();
        if let MaybeTlsStream::Plain(stream) = socket.get_ref() {
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
        }
        socket
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl Drop for WsFixture {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.stop();
        }
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

fn read_text(socket: &mut WebSocket<MaybeTlsStream<TcpStream>>) -> String {
    loop {
        match socket.read().unwrap() {
            Message::Text(text) => return text.as_str().to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

fn close(mut socket: WebSocket<MaybeTlsStream<TcpStream>>, reason: &str) {
    socket
        .close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: reason.to_string().into(),
        }))
        .unwrap();
    loop {
        match socket.read() {
            Ok(_) => continue,
            Err(_) => break,
        }
    }
}

#[test]
fn test_echo_returns_hello() {
    let fixture = WsFixture::new();
    let mut socket = fixture.connect("/echo");
    socket.send(Message::text("Hello")).unwrap();
    assert_eq!(read_text(&mut socket), "Hello");
    close(socket, "done");
    assert!(wait_until(|| fixture.sessions.is_empty()));
}

#[test]
fn test_unknown_path_is_rejected_during_handshake() {
    let fixture = WsFixture::new();
    for path in ["/nope", "/echo/", "/echo/extra"] {
        match tungstenite::connect(fixture.url(path)) {
            Err(tungstenite::Error::Http(response)) => {
                assert_eq!(response.status(), 404, "{path}");
            }
            other => panic!("{path} should be rejected, got {:?}", other.map(|_| ())),
        }
    }
    assert!(fixture.sessions.is_empty());
}

#[test]
fn test_lifecycle_events_arrive_in_order_and_close_once() {
    let fixture = WsFixture::new();
    let mut socket = fixture.connect("/record");
    for text in ["one", "two", "three"] {
        socket.send(Message::text(text)).unwrap();
        assert_eq!(read_text(&mut socket), text.to_uppercase());
    }
    close(socket, "bye");

    assert!(wait_until(|| fixture.events().len() == 5));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(
        fixture.events(),
        ["connect", "message one", "message two", "message three", "close 1000 bye"]
    );
}

#[test]
fn test_dropped_client_still_delivers_close() {
    let fixture = WsFixture::new();
    let socket = fixture.connect("/record");
    assert!(wait_until(|| fixture.sessions.len() == 1));
    drop(socket);

    assert!(wait_until(|| fixture.events().iter().any(|e| e.starts_with("close"))));
    let closes = fixture
        .events()
        .into_iter()
        .filter(|e| e.starts_with("close"))
        .count();
    assert_eq!(closes, 1);
    assert!(wait_until(|| fixture.sessions.is_empty()));
}

#[test]
fn test_broadcast_reaches_other_sessions() {
    let fixture = WsFixture::new();
    let mut alice = fixture.connect("/chat");
    let mut bob = fixture.connect("/chat");
    assert!(wait_until(|| fixture.sessions.len() == 2));

    alice.send(Message::text("hi bob")).unwrap();
    assert_eq!(read_text(&mut bob), "hi bob");

    bob.send(Message::text("hi alice")).unwrap();
    assert_eq!(read_text(&mut alice), "hi alice");

    close(alice, "");
    close(bob, "");
    assert!(wait_until(|| fixture.sessions.is_empty()));
}

#[test]
fn test_connections_get_independent_handlers() {
    let fixture = WsFixture::new();
    let mut a = fixture.connect("/echo");
    let mut b = fixture.connect("/echo");
    a.send(Message::text("from a")).unwrap();
    b.send(Message::text("from b")).unwrap();
    assert_eq!(read_text(&mut b), "from b");
    assert_eq!(read_text(&mut a), "from a");
    close(a, "");
    close(b, "");
}
