//! Embedded loopback HTTP server
//!
//! Blocking, thread-per-connection server:
//! - One accept thread bound to `127.0.0.1`
//! - One short-lived worker per connection, with socket timeouts
//! - One request per connection (`Connection: close`)
//! - Best-effort shutdown of in-flight workers on stop

use crate::assets::AssetStore;
use crate::config::ServerConfig;
use crate::cors::Cors;
use crate::parser::{parse_head, read_head};
use crate::registry::{ApiHandler, HandlerRegistry};
use crate::router::route;
use crate::{Error, Request, Response, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::io::{self, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const LISTEN_BACKLOG: i32 = 50;
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(10);
const WAKE_TIMEOUT: Duration = Duration::from_millis(500);

/// Server state shared by the accept thread and all workers
pub struct ServerState {
    /// API handlers by prefix
    pub handlers: HandlerRegistry,
    /// Static assets by path
    pub assets: AssetStore,
    /// CORS policy applied to every response
    pub cors: Cors,
    /// In-flight connections
    pub tracker: Arc<ConnectionTracker>,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            handlers: HandlerRegistry::new(),
            assets: AssetStore::new(),
            cors: Cors::permissive(),
            tracker: Arc::new(ConnectionTracker::new()),
        }
    }

    /// Produce the response for one request head
    ///
    /// Returns `None` for a malformed head: the connection is closed
    /// without a response.
    pub fn respond(&self, head: &[u8]) -> Option<Response> {
        let raw = parse_head(head)?;

        if raw.method == "OPTIONS" {
            return Some(self.cors.preflight());
        }

        let req = Request::from_raw(raw);
        let mut res = route(&req, &self.handlers, &self.assets);
        tracing::trace!(method = %req.method, path = %req.path, status = res.status.0, "request");

        res.headers
            .push(("Cache-Control".to_string(), "no-cache".to_string()));
        self.cors.apply(&mut res);
        Some(res)
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Embedded HTTP server
pub struct Server {
    config: ServerConfig,
    state: Arc<ServerState>,
    running: Arc<AtomicBool>,
    local_addr: Option<SocketAddr>,
    accept_thread: Option<JoinHandle<()>>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: Arc::new(ServerState::new()),
            running: Arc::new(AtomicBool::new(false)),
            local_addr: None,
            accept_thread: None,
        }
    }

    /// Register an API handler for a path prefix (replaces any existing one)
    pub fn register_handler<H: ApiHandler + 'static>(&self, prefix: &str, handler: H) {
        self.state.handlers.register(prefix, handler);
    }

    /// Add a single static asset
    pub fn add_asset(&self, path: &str, body: impl Into<Bytes>) {
        self.state.assets.insert(path, body);
    }

    /// Add several static assets
    pub fn add_assets<I, P, B>(&self, files: I)
    where
        I: IntoIterator<Item = (P, B)>,
        P: AsRef<str>,
        B: Into<Bytes>,
    {
        self.state.assets.extend(files);
    }

    /// Shared state (handlers, assets, connection tracker)
    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Bind the loopback listener and start the accept thread
    ///
    /// Bind failure is returned to the caller. Calling `start` on a running
    /// server does nothing.
    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::Acquire) {
            return Ok(());
        }

        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, self.config.port));
        let listener = bind_loopback(&addr).map_err(|source| Error::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        self.state.tracker.reset();
        self.running.store(true, Ordering::Release);

        let state = Arc::clone(&self.state);
        let running = Arc::clone(&self.running);
        let timeout = self.config.timeout();
        let head_limit = self.config.head_limit();

        let spawned = std::thread::Builder::new()
            .name("periscope-accept".to_string())
            .spawn(move || accept_loop(listener, state, running, timeout, head_limit));

        match spawned {
            Ok(handle) => self.accept_thread = Some(handle),
            Err(e) => {
                self.running.store(false, Ordering::Release);
                return Err(Error::Io(e));
            }
        }

        self.local_addr = Some(local_addr);
        tracing::info!(addr = %local_addr, "HTTP server started on http://{local_addr}");
        Ok(())
    }

    /// Stop accepting, close the listener, and interrupt in-flight workers
    ///
    /// Workers are not awaited; a request being written when the socket is
    /// shut down may be cut short.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        self.state.tracker.start_shutdown();

        // Unblock the pending accept() so the loop observes the stop flag
        if let Some(addr) = self.local_addr {
            let _ = TcpStream::connect_timeout(&addr, WAKE_TIMEOUT);
        }
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }

        tracing::info!("HTTP server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Configured port (0 means ephemeral; see [`Server::local_addr`])
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Address actually bound, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Create a loopback listener
fn bind_loopback(addr: &SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;

    // SO_REUSEADDR - allow rebinding while old connections sit in TIME_WAIT
    socket.set_reuse_address(true)?;

    socket.bind(&(*addr).into())?;
    socket.listen(LISTEN_BACKLOG)?;
    Ok(socket.into())
}

fn accept_loop(
    listener: TcpListener,
    state: Arc<ServerState>,
    running: Arc<AtomicBool>,
    timeout: Duration,
    head_limit: usize,
) {
    for conn in listener.incoming() {
        if !running.load(Ordering::Acquire) {
            break;
        }

        match conn {
            Ok(stream) => spawn_worker(stream, &state, timeout, head_limit),
            Err(e) => {
                if !running.load(Ordering::Acquire) {
                    break;
                }
                tracing::warn!(error = %e, "accept error");
                std::thread::sleep(ACCEPT_ERROR_BACKOFF);
            }
        }
    }
    tracing::debug!("accept loop exited");
}

fn spawn_worker(stream: TcpStream, state: &Arc<ServerState>, timeout: Duration, head_limit: usize) {
    if let Err(e) = stream
        .set_read_timeout(Some(timeout))
        .and_then(|_| stream.set_write_timeout(Some(timeout)))
    {
        tracing::debug!(error = %e, "failed to set socket timeouts");
        return;
    }

    let state = Arc::clone(state);
    let spawned = std::thread::Builder::new()
        .name("periscope-http".to_string())
        .spawn(move || {
            let Some(_guard) = state.tracker.track(&stream) else {
                return;
            };
            if let Err(e) = handle_connection(stream, &state, head_limit) {
                // Resets and timeouts are routine for a local HTTP server
                tracing::trace!(error = %e, "connection ended with error");
            }
        });

    if let Err(e) = spawned {
        tracing::warn!(error = %e, "failed to spawn connection worker");
    }
}

fn handle_connection(mut stream: TcpStream, state: &ServerState, head_limit: usize) -> io::Result<()> {
    let head = read_head(&mut stream, head_limit)?;

    let Some(response) = state.respond(&head) else {
        tracing::trace!(bytes = head.len(), "malformed request, closing");
        return Ok(());
    };

    stream.write_all(&response.to_http1_bytes())?;
    stream.flush()
}

// ============================================================================
// Connection Tracking for Shutdown
// ============================================================================

/// Tracks in-flight connections so shutdown can interrupt them
///
/// Each worker registers a clone of its stream. On shutdown every tracked
/// stream is shut down in both directions, which unblocks pending reads and
/// writes.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    next_id: AtomicU64,
    /// Live connections by tracking ID
    active: Mutex<HashMap<u64, TcpStream>>,
    /// Shutdown signal received
    shutting_down: AtomicBool,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection
    ///
    /// Returns `None` once shutdown has started; the caller should drop the
    /// connection.
    pub fn track(self: &Arc<Self>, stream: &TcpStream) -> Option<ConnectionGuard> {
        let clone = stream.try_clone().ok()?;
        let mut active = self.active.lock();
        if self.is_shutting_down() {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        active.insert(id, clone);
        Some(ConnectionGuard {
            tracker: Arc::clone(self),
            id,
        })
    }

    /// Get current active connection count
    pub fn count(&self) -> usize {
        self.active.lock().len()
    }

    /// Signal shutdown and interrupt every tracked connection
    pub fn start_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let active = self.active.lock();
        for stream in active.values() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Check if shutdown is in progress
    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Reset shutdown state (on restart)
    pub fn reset(&self) {
        self.shutting_down.store(false, Ordering::SeqCst);
    }
}

/// Removes its connection from the tracker when dropped
#[derive(Debug)]
pub struct ConnectionGuard {
    tracker: Arc<ConnectionTracker>,
    id: u64,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.tracker.active.lock().remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HandlerResult;
    use crate::StatusCode;

    #[test]
    fn test_respond_options_short_circuits() {
        let state = ServerState::new();
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        state.handlers.register("/api/", move |_: &Request| -> HandlerResult {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some("{}".into()))
        });

        let res = state.respond(b"OPTIONS /api/v1/game HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(res.status, StatusCode::NO_CONTENT);
        assert!(res.body.is_empty());
        assert_eq!(res.header("access-control-allow-origin"), Some("*"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_respond_adds_standard_headers() {
        let state = ServerState::new();
        let res = state.respond(b"GET /missing HTTP/1.1\r\n\r\n").unwrap();

        assert_eq!(res.status, StatusCode::NOT_FOUND);
        assert_eq!(res.header("cache-control"), Some("no-cache"));
        assert_eq!(res.header("access-control-allow-origin"), Some("*"));
    }

    #[test]
    fn test_respond_malformed_is_none() {
        let state = ServerState::new();
        assert!(state.respond(b"NONSENSE\r\n\r\n").is_none());
        assert!(state.respond(b"").is_none());
    }

    #[test]
    fn test_tracker_refuses_after_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let tracker = Arc::new(ConnectionTracker::new());

        let guard = tracker.track(&client).unwrap();
        assert_eq!(tracker.count(), 1);
        drop(guard);
        assert_eq!(tracker.count(), 0);

        tracker.start_shutdown();
        assert!(tracker.track(&client).is_none());
        tracker.reset();
        assert!(tracker.track(&client).is_some());
    }
}
