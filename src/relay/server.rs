//! Relay server: TCP listener + per-client state + camera streaming.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::TcpListener;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use calloop::generic::Generic;
use calloop::{EventLoop, Interest, LoopHandle, Mode, PostAction};
use tracing::{debug, error, info, warn};

use crate::frame::encode_png;
use crate::session::Session;

use super::http::{self, ParseOutcome, Response};
use super::routes::{self, HeadControl, RouteAction};

/// Maximum write buffer before skipping stream frames (256 KiB).
const MAX_WRITE_BUFFER: usize = 262_144;

/// Default rate limit: requests per second per client.
const DEFAULT_RATE_LIMIT: u32 = 60;

/// Rate limit window duration in seconds.
const RATE_LIMIT_WINDOW_SECS: u64 = 1;

/// How long the event loop blocks per iteration.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Multipart boundary for the camera stream.
const STREAM_BOUNDARY: &str = "frame";

/// Per-client rate limiter.
pub struct RateLimiter {
    window_start: Instant,
    request_count: u32,
    pub max_per_second: u32,
}

impl RateLimiter {
    fn new(max_per_second: u32) -> Self {
        Self {
            window_start: Instant::now(),
            request_count: 0,
            max_per_second,
        }
    }

    /// Check if a request is allowed.  Returns true if within rate limit.
    fn check(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.window_start);
        if elapsed.as_secs() >= RATE_LIMIT_WINDOW_SECS {
            // New window
            self.window_start = now;
            self.request_count = 1;
            true
        } else {
            self.request_count += 1;
            self.request_count <= self.max_per_second
        }
    }
}

/// Per-client relay connection state.
pub struct RelayClient {
    pub stream: TcpStream,
    pub read_buf: Vec<u8>,
    pub write_buf: Vec<u8>,
    pub id: u64,
    /// Set once the connection is upgraded to the camera stream; no
    /// further requests are served on it.
    pub streaming: bool,
    /// Sequence of the last frame pushed to a streaming client.
    pub last_frame_seq: u64,
    /// Drop the connection once the write buffer drains.
    pub close_after_flush: bool,
    /// Per-client rate limiter.
    pub rate_limiter: RateLimiter,
}

impl RelayClient {
    fn new(stream: TcpStream, id: u64) -> Self {
        stream.set_nonblocking(true).ok();

        Self {
            stream,
            read_buf: Vec::with_capacity(4096),
            write_buf: Vec::new(),
            id,
            streaming: false,
            last_frame_seq: 0,
            close_after_flush: false,
            rate_limiter: RateLimiter::new(DEFAULT_RATE_LIMIT),
        }
    }

    /// Attempt to flush pending writes.
    pub fn flush_writes(&mut self) -> io::Result<()> {
        while !self.write_buf.is_empty() {
            match self.stream.write(&self.write_buf) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "write zero")),
                Ok(n) => {
                    self.write_buf.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn enqueue(&mut self, bytes: &[u8]) {
        self.write_buf.extend_from_slice(bytes);
    }
}

/// Loop state shared by the listener callback and the per-iteration
/// polls.
pub struct RelayState {
    pub session: Arc<Session>,
    pub server: RelayServer,
    pub control: HeadControl,
}

/// Relay server managing the listener socket and all client connections.
pub struct RelayServer {
    pub clients: HashMap<u64, RelayClient>,
    next_client_id: u64,
    /// Multipart body for the last encoded frame, keyed by sequence,
    /// so one frame is encoded once no matter how many viewers.
    encoded: Option<(u64, Arc<Vec<u8>>)>,
}

impl RelayServer {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            encoded: None,
        }
    }

    /// Register an already-bound listener with calloop.  Binding is
    /// the caller's job so bind failures surface before the relay
    /// thread starts.
    pub fn register(
        listener: TcpListener,
        loop_handle: &LoopHandle<'static, RelayState>,
    ) -> anyhow::Result<()> {
        listener.set_nonblocking(true)?;

        let source = Generic::new(listener, Interest::READ, Mode::Level);
        loop_handle.insert_source(source, |_event, listener, state| {
            // Accept new connections
            loop {
                match listener.accept() {
                    Ok((stream, addr)) => {
                        let client_id = state.server.next_client_id;
                        state.server.next_client_id += 1;

                        info!(client_id, %addr, "relay client connected");

                        let client = RelayClient::new(stream, client_id);
                        state.server.clients.insert(client_id, client);
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        error!("accept error: {}", e);
                        break;
                    }
                }
            }
            Ok(PostAction::Continue)
        })?;

        Ok(())
    }

    /// Poll all clients for readable data, dispatch requests, flush
    /// writes.  Called once per event loop iteration.
    pub fn poll_clients(state: &mut RelayState) {
        let client_ids: Vec<u64> = state.server.clients.keys().copied().collect();
        let mut disconnected = Vec::new();

        for client_id in client_ids {
            // Read available data
            let mut buf = [0u8; 4096];
            let read_result = {
                let client = state.server.clients.get_mut(&client_id).unwrap();
                match client.stream.read(&mut buf) {
                    Ok(0) => Err(io::Error::new(io::ErrorKind::ConnectionReset, "eof")),
                    Ok(n) => {
                        client.read_buf.extend_from_slice(&buf[..n]);
                        Ok(())
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
                    Err(e) => Err(e),
                }
            };

            if let Err(e) = read_result {
                debug!(client_id, "client disconnected: {}", e);
                disconnected.push(client_id);
                continue;
            }

            // Parse and dispatch complete requests
            loop {
                let outcome = {
                    let client = state.server.clients.get_mut(&client_id).unwrap();
                    http::parse_request(&client.read_buf)
                };
                match outcome {
                    ParseOutcome::Partial => break,
                    ParseOutcome::Invalid(reason) => {
                        // Protocol violation — answer once and drop
                        warn!(client_id, reason, "dropping client");
                        let client = state.server.clients.get_mut(&client_id).unwrap();
                        client.read_buf.clear();
                        client.enqueue(&Response::text(400, reason).into_bytes());
                        client.close_after_flush = true;
                        break;
                    }
                    ParseOutcome::Complete { request, consumed } => {
                        let (rate_ok, streaming) = {
                            let client = state.server.clients.get_mut(&client_id).unwrap();
                            client.read_buf.drain(..consumed);
                            (client.rate_limiter.check(), client.streaming)
                        };

                        if !rate_ok {
                            warn!(client_id, "rate limit exceeded, dropping request");
                            if let Some(client) = state.server.clients.get_mut(&client_id) {
                                client.enqueue(&Response::text(429, "slow down").into_bytes());
                            }
                            continue;
                        }
                        if streaming {
                            debug!(client_id, "request on a streaming connection ignored");
                            continue;
                        }

                        let action =
                            routes::handle_request(&state.session, &mut state.control, &request);
                        if let Some(client) = state.server.clients.get_mut(&client_id) {
                            match action {
                                RouteAction::Respond(response) => {
                                    client.enqueue(&response.into_bytes());
                                }
                                RouteAction::StartStream => {
                                    debug!(client_id, "camera stream started");
                                    client.streaming = true;
                                    client.enqueue(stream_header().as_bytes());
                                }
                            }
                        }
                    }
                }
            }

            // Flush writes
            if let Some(client) = state.server.clients.get_mut(&client_id) {
                if let Err(e) = client.flush_writes() {
                    debug!(client_id, "write error: {}", e);
                    disconnected.push(client_id);
                } else if client.close_after_flush && client.write_buf.is_empty() {
                    disconnected.push(client_id);
                }
            }
        }

        // Clean up disconnected clients
        for id in disconnected {
            info!(client_id = id, "removing relay client");
            state.server.clients.remove(&id);
        }
    }

    /// Push the newest frame to all streaming clients.  The frame is
    /// encoded once and the multipart body shared across connections.
    pub fn push_frames(state: &mut RelayState) {
        if !state.server.clients.values().any(|c| c.streaming) {
            return;
        }
        let Some(frame) = state.session.frames().latest() else {
            return;
        };

        let part = match &state.server.encoded {
            Some((seq, part)) if *seq == frame.seq => part.clone(),
            _ => {
                let png = match encode_png(&frame) {
                    Ok(png) => png,
                    Err(e) => {
                        error!("frame encode failed: {}", e);
                        return;
                    }
                };
                let part = Arc::new(stream_part(&png));
                state.server.encoded = Some((frame.seq, part.clone()));
                part
            }
        };

        let mut disconnected = Vec::new();
        for client in state.server.clients.values_mut() {
            if !client.streaming || client.last_frame_seq >= frame.seq {
                continue;
            }
            // A stalled viewer misses frames instead of ballooning the
            // buffer; it catches up on the next one it has room for.
            if client.write_buf.len() > MAX_WRITE_BUFFER {
                debug!(client_id = client.id, "write buffer full, skipping frame");
                continue;
            }
            client.enqueue(&part);
            client.last_frame_seq = frame.seq;
            if let Err(e) = client.flush_writes() {
                debug!(client_id = client.id, "write error: {}", e);
                disconnected.push(client.id);
            }
        }

        for id in disconnected {
            info!(client_id = id, "removing relay client");
            state.server.clients.remove(&id);
        }
    }
}

fn stream_header() -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; \
         boundary={}\r\nCache-Control: no-cache, no-store, must-revalidate\r\n\r\n",
        STREAM_BOUNDARY,
    )
}

fn stream_part(png: &[u8]) -> Vec<u8> {
    let head = format!(
        "--{}\r\nContent-Type: image/png\r\nContent-Length: {}\r\n\r\n",
        STREAM_BOUNDARY,
        png.len(),
    );
    let mut part = head.into_bytes();
    part.extend_from_slice(png);
    part.extend_from_slice(b"\r\n");
    part
}

/// Run the relay until shutdown.  Owns the calloop event loop; meant
/// to live on its own thread.
pub fn run(session: Arc<Session>, listener: TcpListener) -> anyhow::Result<()> {
    let mut event_loop = EventLoop::<RelayState>::try_new()?;
    RelayServer::register(listener, &event_loop.handle())?;

    let mut state = RelayState {
        session,
        server: RelayServer::new(),
        control: HeadControl::default(),
    };

    let mut last_status_log = Instant::now();
    let status_interval = Duration::from_secs(60);
    info!("relay ready, entering event loop");

    while !state.session.is_shutdown() {
        event_loop.dispatch(Some(POLL_INTERVAL), &mut state)?;
        RelayServer::poll_clients(&mut state);
        RelayServer::push_frames(&mut state);

        // Periodic status logging
        if last_status_log.elapsed() >= status_interval {
            let streaming = state.server.clients.values().filter(|c| c.streaming).count();
            info!(
                "relay status: {} client(s), {} streaming",
                state.server.clients.len(),
                streaming,
            );
            last_status_log = Instant::now();
        }
    }

    info!(
        "relay shutting down ({} client(s))",
        state.server.clients.len()
    );
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────
