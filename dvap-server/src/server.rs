//! Server assembly
//!
//! Binds the listeners and spawns the broadcast loop, the event stream and
//! the event pump. [`Server::spawn_thread`] runs everything on a dedicated
//! thread for hosts without an async runtime, such as a debugger's embedded
//! interpreter.

use std::net::SocketAddr;
use std::thread;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use dvap_utils::{DvapError, Result};

use crate::config::ServerConfig;
use crate::events::{event_channel, EventPump, EventQueue, EventSender};
use crate::sse::run_event_server;
use crate::state::StateStore;
use crate::websocket::run_broadcast_loop;

/// Configured but not yet running server
pub struct Server {
    config: ServerConfig,
    store: StateStore,
    events: EventQueue,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let events = EventQueue::new(config.events.max_queued);
        Self {
            config,
            store: StateStore::new(),
            events,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    /// Bind the listeners and spawn the server tasks on the current runtime
    pub async fn start(self) -> Result<ServerHandle> {
        let ws_listener = bind(self.config.websocket.socket_addr().await?).await?;
        let websocket_addr = ws_listener.local_addr()?;

        let events_listener = if self.config.events.enabled {
            Some(bind(self.config.events.socket_addr().await?).await?)
        } else {
            None
        };
        let events_addr = events_listener
            .as_ref()
            .map(|l| l.local_addr())
            .transpose()?;

        let (shutdown_tx, _) = broadcast::channel(1);
        let (event_sender, event_rx) = event_channel();
        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(run_broadcast_loop(
            ws_listener,
            self.store.clone(),
            self.config.websocket.clone(),
            shutdown_tx.subscribe(),
        )));

        if let Some(listener) = events_listener {
            tasks.push(tokio::spawn(run_event_server(
                listener,
                self.events.clone(),
                self.config.events.poll_interval(),
                shutdown_tx.subscribe(),
            )));
        }

        let pump = EventPump::new(event_rx, self.store.clone(), self.events.clone());
        tasks.push(tokio::spawn(pump.run(shutdown_tx.subscribe())));

        info!(
            "Server started: websocket={} events={}",
            websocket_addr,
            events_addr
                .map(|a| a.to_string())
                .unwrap_or_else(|| "disabled".into())
        );

        Ok(ServerHandle {
            websocket_addr,
            events_addr,
            store: self.store,
            events: self.events,
            event_sender,
            shutdown_tx,
            tasks,
        })
    }

    /// Run the server on a dedicated thread with its own runtime
    ///
    /// Returns once both listeners are bound.
    pub fn spawn_thread(self) -> Result<ServerThread> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let handle = runtime.block_on(self.start())?;
        let control = handle.control();

        let thread = thread::Builder::new()
            .name("dvap-net".into())
            .spawn(move || {
                runtime.block_on(handle.wait());
            })?;

        Ok(ServerThread { control, thread })
    }
}

async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| DvapError::Bind { addr, source })
}

/// Cloneable access to a running server
#[derive(Debug, Clone)]
pub struct ServerControl {
    websocket_addr: SocketAddr,
    events_addr: Option<SocketAddr>,
    store: StateStore,
    events: EventQueue,
    event_sender: EventSender,
    shutdown_tx: broadcast::Sender<()>,
}

impl ServerControl {
    pub fn websocket_addr(&self) -> SocketAddr {
        self.websocket_addr
    }

    pub fn events_addr(&self) -> Option<SocketAddr> {
        self.events_addr
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    pub fn event_sender(&self) -> EventSender {
        self.event_sender.clone()
    }

    /// Signal every server task to stop
    pub fn shutdown(&self) {
        // No receivers left means everything already stopped
        let _ = self.shutdown_tx.send(());
    }
}

/// Running server on the caller's runtime
pub struct ServerHandle {
    websocket_addr: SocketAddr,
    events_addr: Option<SocketAddr>,
    store: StateStore,
    events: EventQueue,
    event_sender: EventSender,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn websocket_addr(&self) -> SocketAddr {
        self.websocket_addr
    }

    /// `None` when the event stream is disabled
    pub fn events_addr(&self) -> Option<SocketAddr> {
        self.events_addr
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    pub fn event_sender(&self) -> EventSender {
        self.event_sender.clone()
    }

    pub fn control(&self) -> ServerControl {
        ServerControl {
            websocket_addr: self.websocket_addr,
            events_addr: self.events_addr,
            store: self.store.clone(),
            events: self.events.clone(),
            event_sender: self.event_sender.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Wait for every server task to finish
    pub async fn wait(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Server task failed: {}", e);
            }
        }
        info!("Server stopped");
    }
}

/// Server running on its own thread
pub struct ServerThread {
    control: ServerControl,
    thread: thread::JoinHandle<()>,
}

impl ServerThread {
    pub fn control(&self) -> &ServerControl {
        &self.control
    }

    /// Stop the server and join its thread
    pub fn shutdown(self) -> Result<()> {
        self.control.shutdown();
        self.thread
            .join()
            .map_err(|_| DvapError::internal("server thread panicked"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use dvap_protocol::{BreakpointChange, BreakpointInfo, DebugEvent, FrameCodec, ThreadInfo};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio_util::codec::Decoder;

    const HANDSHAKE: &[u8] = b"GET / HTTP/1.1\r\n\
        Host: localhost\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\r\n";

    fn test_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.websocket.port = 0;
        config.websocket.tick_interval_ms = 10;
        config.events.port = 0;
        config.events.poll_interval_ms = 10;
        config
    }

    /// Complete the handshake and return the upgrade response plus leftover bytes
    async fn handshake(stream: &mut TcpStream) -> (String, BytesMut) {
        stream.write_all(HANDSHAKE).await.unwrap();

        let mut buf = BytesMut::new();
        loop {
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = buf.split_to(end + 4);
                return (String::from_utf8(head.to_vec()).unwrap(), buf);
            }
            let n = stream.read_buf(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed during handshake");
        }
    }

    async fn next_frame(stream: &mut TcpStream, buf: &mut BytesMut) -> String {
        let mut codec = FrameCodec::new();
        loop {
            if let Some(text) = codec.decode(buf).unwrap() {
                return text;
            }
            let n = stream.read_buf(buf).await.unwrap();
            assert!(n > 0, "connection closed before a frame arrived");
        }
    }

    // ==================== End-to-End Tests ====================

    #[tokio::test]
    async fn test_handshake_then_state_frame() {
        let server = Server::new(test_config());
        server.store().update_threads(vec![
            ThreadInfo::new(2, "/src/worker.c", Some(88), 4242),
            ThreadInfo::new(1, "/src/main.c", Some(12), 4241),
        ]);
        server
            .store()
            .upsert_breakpoint(BreakpointInfo::new(1, "/src/main.c", 12));

        let handle = server.start().await.unwrap();
        let expected = handle.store().snapshot().render();

        let result = tokio::time::timeout(Duration::from_secs(2), async {
            let mut stream = TcpStream::connect(handle.websocket_addr()).await.unwrap();
            let (head, mut rest) = handshake(&mut stream).await;
            let frame = next_frame(&mut stream, &mut rest).await;
            (head, frame)
        })
        .await
        .expect("no frame within the deadline");

        let (head, frame) = result;
        assert!(head.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(head.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert_eq!(frame, expected);
        assert_eq!(
            frame,
            "thread:1:/src/main.c:12:4241\n\
             thread:2:/src/worker.c:88:4242\n\
             bp:1:/src/main.c:12:software:/src/main.c:12:true:true"
        );

        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle.wait())
            .await
            .expect("server did not stop");
    }

    #[tokio::test]
    async fn test_first_frame_arrives_within_two_ticks() {
        const TICK_MS: u64 = 50;
        // Scheduler jitter on a loaded machine
        const SLACK: Duration = Duration::from_millis(100);

        let mut config = test_config();
        config.websocket.tick_interval_ms = TICK_MS;
        let server = Server::new(config);
        server
            .store()
            .update_threads(vec![ThreadInfo::new(1, "/src/main.c", Some(12), 4241)]);
        let handle = server.start().await.unwrap();

        let bound = Duration::from_millis(TICK_MS) * 2 + SLACK;
        let mut worst = Duration::ZERO;
        for _ in 0..5 {
            let started = std::time::Instant::now();
            let mut stream = TcpStream::connect(handle.websocket_addr()).await.unwrap();
            let (_, mut rest) = handshake(&mut stream).await;
            let frame = tokio::time::timeout(
                Duration::from_secs(2),
                next_frame(&mut stream, &mut rest),
            )
            .await
            .expect("no frame within the deadline");
            worst = worst.max(started.elapsed());
            assert_eq!(frame, "thread:1:/src/main.c:12:4241");
        }
        assert!(worst <= bound, "first frame took {:?}, bound {:?}", worst, bound);

        handle.shutdown();
        handle.wait().await;
    }

    #[tokio::test]
    async fn test_events_reach_websocket_viewers() {
        let handle = Server::new(test_config()).start().await.unwrap();
        let sender = handle.event_sender();

        let mut stream = TcpStream::connect(handle.websocket_addr()).await.unwrap();
        let (_, mut rest) = handshake(&mut stream).await;

        sender
            .send(DebugEvent::BreakpointChanged(BreakpointChange::Created(
                BreakpointInfo::new(7, "lib.c", 3),
            )))
            .unwrap();

        let wanted = "bp:7:lib.c:3:software:lib.c:3:true:true";
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if next_frame(&mut stream, &mut rest).await == wanted {
                    break;
                }
            }
        })
        .await
        .expect("breakpoint never broadcast");

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_events_disabled_has_no_event_listener() {
        let mut config = test_config();
        config.events.enabled = false;
        let handle = Server::new(config).start().await.unwrap();
        assert!(handle.events_addr().is_none());
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = test_config();
        config.websocket.port = taken.local_addr().unwrap().port();

        let result = Server::new(config).start().await;
        assert!(matches!(result, Err(DvapError::Bind { .. })));
    }

    // ==================== Thread Tests ====================

    #[test]
    fn test_spawn_thread_serves_and_stops() {
        let server = Server::new(test_config());
        let running = server.spawn_thread().unwrap();
        let control = running.control().clone();

        control
            .store()
            .update_threads(vec![ThreadInfo::error(1, "Invalid thread handle")]);

        let mut stream = std::net::TcpStream::connect(control.websocket_addr()).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        std::io::Write::write_all(&mut stream, HANDSHAKE).unwrap();

        let expected = b"thread:1:!error:Invalid thread handle";
        let mut received = Vec::new();
        let mut buf = [0u8; 512];
        while !received.windows(expected.len()).any(|w| w == expected) {
            let n = std::io::Read::read(&mut stream, &mut buf).unwrap();
            assert!(n > 0, "connection closed");
            received.extend_from_slice(&buf[..n]);
        }

        running.shutdown().unwrap();
    }
}
