use may::coroutine::JoinHandle;
use may_minihttp::HttpService;
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const READY_POLL: Duration = Duration::from_millis(5);

/// Starts a `may_minihttp` server for any cloneable [`HttpService`].
pub struct HttpServer<T>(pub T);

/// A listener running in its own coroutine, HTTP or WebSocket.
pub struct ServerHandle {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl ServerHandle {
    pub(crate) fn new(addr: SocketAddr, handle: JoinHandle<()>) -> Self {
        Self { addr, handle }
    }

    /// The listen address. Only [`WsServer`](super::WsServer) resolves a
    /// requested port `0` to the real one.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Block until a TCP connect to [`ServerHandle::addr`] succeeds.
    ///
    /// # Errors
    ///
    /// `TimedOut` when the listener is not accepting within 250ms.
    pub fn wait_ready(&self) -> io::Result<()> {
        self.wait_ready_for(Duration::from_millis(250))
    }

    /// [`ServerHandle::wait_ready`] with an explicit deadline.
    ///
    /// # Errors
    ///
    /// `TimedOut` when `timeout` passes first.
    pub fn wait_ready_for(&self, timeout: Duration) -> io::Result<()> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(READY_POLL);
        }
        Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("listener on {} not ready after {timeout:?}", self.addr),
        ))
    }

    /// Cancel the listener coroutine and wait for it to unwind.
    ///
    /// Connections already handed to their own coroutines are not cancelled.
    pub fn stop(self) {
        // SAFETY: cancel() is marked unsafe by the may runtime. The handle is
        // owned here and the coroutine is not referenced after the join.
        unsafe {
            self.handle.coroutine().cancel();
        }
        if self.handle.join().is_err() {
            warn!(addr = %self.addr, "Listener coroutine panicked before stop");
        }
        info!(addr = %self.addr, "Listener stopped");
    }

    /// Block until the listener coroutine returns.
    ///
    /// # Errors
    ///
    /// The coroutine panicked.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}

impl<T: HttpService + Clone + Send + Sync + 'static> HttpServer<T> {
    /// Bind `addr` and serve.
    ///
    /// # Errors
    ///
    /// The address does not resolve or cannot be bound.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "address did not resolve"))?;
        let handle = may_minihttp::HttpServer(self.0).start(addr)?;
        info!(addr = %addr, "HTTP listener started");
        Ok(ServerHandle::new(addr, handle))
    }
}
