use may::net::{TcpListener, TcpStream};
use may::sync::mpsc::{self, Receiver, Sender};
use may::sync::Mutex;
use std::io;
use std::net::ToSocketAddrs;
use std::sync::mpsc::TryRecvError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::CloseFrame;
use tungstenite::{Message, WebSocket};

use super::http_server::ServerHandle;
use crate::session::Outbound;
use crate::upgrade::{Connection, UpgradeBridge, ABNORMAL_CLOSURE};

/// Close code sent when a handler fails.
const INTERNAL_ERROR: u16 = 1011;
/// Close code reported when the peer closes without a status.
const NO_STATUS: u16 = 1005;

enum Frame {
    Text(String),
    Close(u16, String),
}

/// [`Outbound`] backed by a queue that the connection's own coroutine drains.
///
/// `may`'s `Sender` is `Send` but not `Sync`, and [`Outbound`] is shared
/// through the session registry, so the sender sits behind a coroutine-aware
/// lock.
struct QueueOutbound {
    tx: Mutex<Sender<Frame>>,
}

impl QueueOutbound {
    fn push(&self, frame: Frame) -> io::Result<()> {
        let tx = self
            .tx
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "outbound queue poisoned"))?;
        tx.send(frame)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "connection is gone"))
    }
}

impl Outbound for QueueOutbound {
    fn send_text(&self, text: &str) -> io::Result<()> {
        self.push(Frame::Text(text.to_string()))
    }

    fn close(&self, code: u16, reason: &str) -> io::Result<()> {
        self.push(Frame::Close(code, reason.to_string()))
    }
}

/// WebSocket listener feeding an [`UpgradeBridge`].
///
/// Each accepted socket gets its own coroutine, which owns the
/// [`Connection`] and alternates between flushing queued outbound frames and
/// reading with a short timeout.
pub struct WsServer {
    bridge: Arc<UpgradeBridge>,
    poll_interval: Duration,
}

impl WsServer {
    #[must_use]
    pub fn new(bridge: Arc<UpgradeBridge>) -> Self {
        Self {
            bridge,
            poll_interval: Duration::from_millis(50),
        }
    }

    /// How long a read waits before the outbound queue is checked again.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Bind `addr` and start accepting connections.
    ///
    /// Port `0` binds an ephemeral port; [`ServerHandle::addr`] reports it.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or the port cannot be bound.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid address"))?;
        let listener = TcpListener::bind(addr)?;
        let local = listener.local_addr()?;
        info!(addr = %local, paths = ?self.bridge.paths(), "WebSocket listener started");

        let bridge = self.bridge;
        let poll = self.poll_interval;
        // SAFETY: may::coroutine::spawn() is marked unsafe by the may runtime.
        // The closure owns everything it touches and is Send + 'static.
        let handle = unsafe { may::coroutine::spawn(move || accept_loop(&listener, &bridge, poll)) };
        Ok(ServerHandle::new(local, handle))
    }
}

fn accept_loop(listener: &TcpListener, bridge: &Arc<UpgradeBridge>, poll: Duration) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let bridge = Arc::clone(bridge);
                // SAFETY: same as above; the coroutine owns its stream and bridge.
                unsafe {
                    may::coroutine::spawn(move || serve(stream, &bridge, poll));
                }
            }
            Err(e) => warn!(error = %e, "WebSocket accept failed"),
        }
    }
}

fn serve(stream: TcpStream, bridge: &UpgradeBridge, poll: Duration) {
    let peer = stream.peer_addr().ok();
    let mut path = String::new();

    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let target = req.uri().path();
        if bridge.is_upgrade_path(target) {
            path = target.to_string();
            Ok(resp)
        } else {
            let mut rejection = ErrorResponse::new(Some("Not Found".to_string()));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            warn!(target = %target, remote_addr = ?peer, "Upgrade rejected: no binding");
            Err(rejection)
        }
    };

    let mut ws = match tungstenite::accept_hdr(stream, callback) {
        Ok(ws) => ws,
        Err(e) => {
            debug!(remote_addr = ?peer, error = %e, "WebSocket handshake failed");
            return;
        }
    };

    if let Err(e) = ws.get_ref().set_read_timeout(Some(poll)) {
        error!(error = %e, "Failed to set WebSocket read timeout");
        return;
    }

    let (tx, rx) = mpsc::channel();
    let outbound = Arc::new(QueueOutbound { tx: Mutex::new(tx) });
    let Some(mut conn) = bridge.accept(&path, outbound) else {
        return;
    };

    if let Err(e) = conn.connect() {
        warn!(connection_id = %conn.id(), error = %e, "on_connect failed, closing");
        if let Err(e) = conn.context().close(INTERNAL_ERROR, "on_connect failed") {
            debug!(connection_id = %conn.id(), error = %e, "Close after failed connect not queued");
        }
    }

    run(&mut ws, &mut conn, &rx);
    // Connection's Drop reports 1006 if no close event was delivered.
    drop(conn);
}

fn run(ws: &mut WebSocket<TcpStream>, conn: &mut Connection, rx: &Receiver<Frame>) {
    loop {
        if !flush(ws, conn, rx) {
            return;
        }

        match ws.read() {
            Ok(Message::Text(text)) => {
                if let Err(e) = conn.message(text.as_str()) {
                    warn!(connection_id = %conn.id(), error = %e, "on_message failed, closing");
                    if let Err(e) = conn.context().close(INTERNAL_ERROR, "handler error") {
                        debug!(connection_id = %conn.id(), error = %e, "Close after handler error not queued");
                    }
                }
            }
            Ok(Message::Close(frame)) => {
                let (code, reason) = frame
                    .map(|f| (u16::from(f.code), f.reason.as_str().to_string()))
                    .unwrap_or((NO_STATUS, String::new()));
                conn.close(code, &reason);
                // tungstenite queued the close reply; push it out.
                if let Err(e) = ws.flush() {
                    debug!(connection_id = %conn.id(), error = %e, "Close reply not flushed");
                }
            }
            Ok(Message::Binary(data)) => {
                debug!(connection_id = %conn.id(), len = data.len(), "Binary frame ignored");
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(e))
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => return,
            Err(e) => {
                debug!(connection_id = %conn.id(), error = %e, "WebSocket read failed");
                conn.close(ABNORMAL_CLOSURE, "abnormal closure");
                return;
            }
        }
    }
}

/// Write every queued frame. Returns `false` once the socket is unusable.
fn flush(ws: &mut WebSocket<TcpStream>, conn: &Connection, rx: &Receiver<Frame>) -> bool {
    loop {
        let frame = match rx.try_recv() {
            Ok(frame) => frame,
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => return true,
        };
        let sent = match frame {
            Frame::Text(text) => ws.send(Message::text(text)),
            Frame::Close(code, reason) => ws.close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: reason.into(),
            })),
        };
        match sent {
            Ok(()) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                return false
            }
            Err(e) => {
                debug!(connection_id = %conn.id(), error = %e, "WebSocket write failed");
                return false;
            }
        }
    }
}
