//! WebSocket connection registry
//!
//! Owns every viewer socket and drives its non-blocking I/O. A connection
//! starts in [`ConnectionState::PendingHandshake`], moves to
//! [`ConnectionState::Active`] once a request carrying a usable key has been
//! answered, and is dropped from the registry as soon as a read or write
//! fails.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;

use bytes::{Buf, BytesMut};
use tokio::net::TcpStream;
use tracing::debug;

use dvap_protocol::respond;

/// Upper bound on reads per active connection per pass
const MAX_DRAIN_READS: usize = 16;

/// Non-blocking byte transport
///
/// Both calls return `WouldBlock` instead of waiting.
pub trait Transport {
    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize>;
    fn try_write(&self, buf: &[u8]) -> io::Result<usize>;
}

impl Transport for TcpStream {
    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        TcpStream::try_read(self, buf)
    }

    fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        TcpStream::try_write(self, buf)
    }
}

/// Unique connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Connection({})", self.0)
    }
}

/// Lifecycle of a viewer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    PendingHandshake,
    Active,
    Closed,
}

/// Why a connection was removed
#[derive(Debug, thiserror::Error)]
pub enum Disconnect {
    #[error("peer closed the connection")]
    PeerClosed,

    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    #[error("write failed: {0}")]
    Write(#[source] io::Error),
}

/// One viewer socket
pub struct Connection<T> {
    id: ConnectionId,
    peer: SocketAddr,
    transport: T,
    state: ConnectionState,
    /// Bytes accepted for sending but not yet written
    outbound: BytesMut,
}

impl<T> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("outbound", &self.outbound.len())
            .finish()
    }
}

impl<T: Transport> Connection<T> {
    fn new(id: ConnectionId, peer: SocketAddr, transport: T) -> Self {
        Self {
            id,
            peer,
            transport,
            state: ConnectionState::PendingHandshake,
            outbound: BytesMut::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Write as much of the outbound buffer as the socket takes right now
    ///
    /// Returns `Ok(true)` once the buffer is empty.
    fn flush(&mut self) -> Result<bool, Disconnect> {
        while !self.outbound.is_empty() {
            match self.transport.try_write(&self.outbound) {
                Ok(0) => {
                    return Err(Disconnect::Write(io::Error::from(io::ErrorKind::WriteZero)));
                }
                Ok(n) => self.outbound.advance(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Disconnect::Write(e)),
            }
        }
        Ok(true)
    }

    /// Attempt one handshake read; returns whether the connection upgraded
    fn advance_handshake(&mut self, buf: &mut [u8]) -> Result<bool, Disconnect> {
        // Remainder of an earlier response goes out first
        if !self.flush()? {
            return Ok(false);
        }

        let n = match self.transport.try_read(buf) {
            Ok(0) => return Err(Disconnect::PeerClosed),
            Ok(n) => n,
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                return Ok(false)
            }
            Err(e) => return Err(Disconnect::Read(e)),
        };

        let response = respond(&buf[..n]);
        self.outbound.extend_from_slice(&response.to_bytes());
        self.flush()?;

        if response.is_upgrade() {
            self.state = ConnectionState::Active;
            Ok(true)
        } else {
            debug!("{} from {} sent an unusable handshake", self.id, self.peer);
            Ok(false)
        }
    }

    /// Read and discard whatever the viewer sent
    fn drain(&mut self, buf: &mut [u8]) -> Result<(), Disconnect> {
        for _ in 0..MAX_DRAIN_READS {
            match self.transport.try_read(buf) {
                Ok(0) => return Err(Disconnect::PeerClosed),
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Disconnect::Read(e)),
            }
        }
        Ok(())
    }
}

/// Result of one broadcast pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections the frame was handed to
    pub delivered: usize,
    /// Connections still busy with an earlier frame
    pub skipped: usize,
    /// Connections removed because a write failed
    pub evicted: usize,
}

/// Registry of viewer connections
///
/// Owned by the broadcast loop; not shared between tasks.
pub struct ConnectionRegistry<T> {
    connections: HashMap<ConnectionId, Connection<T>>,
    next_id: u64,
    read_buf: Vec<u8>,
}

impl<T: Transport> ConnectionRegistry<T> {
    pub fn new(read_buffer_size: usize) -> Self {
        Self {
            connections: HashMap::new(),
            next_id: 1,
            read_buf: vec![0; read_buffer_size.max(1)],
        }
    }

    // ==================== Lifecycle ====================

    /// Register a freshly accepted connection in PendingHandshake
    pub fn register(&mut self, transport: T, peer: SocketAddr) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        self.connections.insert(id, Connection::new(id, peer, transport));
        debug!("Registered {} from {}", id, peer);
        id
    }

    /// Give every pending connection one handshake attempt
    ///
    /// Returns `(promoted, evicted)`.
    pub fn advance_handshakes(&mut self) -> (usize, usize) {
        let Self {
            connections,
            read_buf,
            ..
        } = self;

        let mut promoted = 0;
        let mut failed = Vec::new();
        for conn in connections.values_mut() {
            if conn.state != ConnectionState::PendingHandshake {
                continue;
            }
            match conn.advance_handshake(read_buf) {
                Ok(true) => {
                    debug!("{} from {} upgraded", conn.id, conn.peer);
                    promoted += 1;
                }
                Ok(false) => {}
                Err(reason) => failed.push((conn.id, reason)),
            }
        }

        let evicted = failed.len();
        self.evict(failed);
        (promoted, evicted)
    }

    /// Discard inbound bytes on active connections; returns the number evicted
    pub fn drain_active(&mut self) -> usize {
        let Self {
            connections,
            read_buf,
            ..
        } = self;

        let failed: Vec<_> = connections
            .values_mut()
            .filter(|conn| conn.state == ConnectionState::Active)
            .filter_map(|conn| conn.drain(read_buf).err().map(|reason| (conn.id, reason)))
            .collect();

        let evicted = failed.len();
        self.evict(failed);
        evicted
    }

    /// Hand `frame` to every active connection
    ///
    /// A connection still holding part of an earlier frame skips this one.
    /// A write failure removes that connection only.
    pub fn broadcast(&mut self, frame: &[u8]) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();

        for conn in self.connections.values_mut() {
            if conn.state != ConnectionState::Active {
                continue;
            }
            let result = conn.flush().and_then(|idle| {
                if !idle {
                    return Ok(false);
                }
                conn.outbound.extend_from_slice(frame);
                conn.flush().map(|_| true)
            });
            match result {
                Ok(true) => report.delivered += 1,
                Ok(false) => report.skipped += 1,
                Err(reason) => failed.push((conn.id, reason)),
            }
        }

        report.evicted = failed.len();
        self.evict(failed);
        report
    }

    fn evict(&mut self, failed: Vec<(ConnectionId, Disconnect)>) {
        for (id, reason) in failed {
            if let Some(mut conn) = self.connections.remove(&id) {
                conn.state = ConnectionState::Closed;
                debug!("Removed {} from {}: {}", id, conn.peer, reason);
            }
        }
    }

    // ==================== Queries ====================

    /// State of a connection; `None` once it has been removed
    pub fn state(&self, id: ConnectionId) -> Option<ConnectionState> {
        self.connections.get(&id).map(|c| c.state)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection<T>> {
        self.connections.get(&id)
    }

    pub fn active_count(&self) -> usize {
        self.count(ConnectionState::Active)
    }

    pub fn pending_count(&self) -> usize {
        self.count(ConnectionState::PendingHandshake)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn count(&self, state: ConnectionState) -> usize {
        self.connections
            .values()
            .filter(|c| c.state == state)
            .count()
    }
}
