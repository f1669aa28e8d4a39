//! Fixed-tick broadcast of the debugger state

use bytes::BytesMut;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::codec::Encoder;
use tracing::{debug, info, trace, warn};

use dvap_protocol::FrameCodec;

use super::registry::{ConnectionRegistry, Transport};
use crate::accept::AcceptBackoff;
use crate::config::WebSocketConfig;
use crate::state::StateStore;

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub promoted: usize,
    pub delivered: usize,
    pub skipped: usize,
    pub evicted: usize,
}

/// Run one broadcast tick
///
/// Advances handshakes, drains viewer input, then sends the current snapshot
/// to every active connection. Rendering is skipped when nobody listens.
pub fn run_tick<T: Transport>(
    registry: &mut ConnectionRegistry<T>,
    store: &StateStore,
    codec: &mut FrameCodec,
    frame: &mut BytesMut,
) -> TickReport {
    let (promoted, mut evicted) = registry.advance_handshakes();
    evicted += registry.drain_active();

    let mut report = TickReport {
        promoted,
        evicted,
        ..TickReport::default()
    };

    if registry.active_count() == 0 {
        return report;
    }

    let snapshot = store.snapshot();
    let text = snapshot.render();
    frame.clear();
    if let Err(e) = codec.encode(text.as_str(), frame) {
        warn!("Failed to encode state frame: {}", e);
        return report;
    }

    let sent = registry.broadcast(&frame[..]);
    report.delivered = sent.delivered;
    report.skipped = sent.skipped;
    report.evicted += sent.evicted;
    report
}

/// Accept viewers and broadcast until shutdown is signalled
pub async fn run_broadcast_loop(
    listener: TcpListener,
    store: StateStore,
    config: WebSocketConfig,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut registry = ConnectionRegistry::new(config.read_buffer_size);
    let mut codec = FrameCodec::new();
    let mut frame = BytesMut::new();

    let mut ticker = interval(config.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Capped at one tick so a failing listener never stalls the broadcast
    let mut backoff = AcceptBackoff::new("WebSocket", config.tick_interval());

    match listener.local_addr() {
        Ok(addr) => info!("WebSocket server listening on ws://{}/", addr),
        Err(e) => warn!("WebSocket listener has no local address: {}", e),
    }

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        backoff.reset();
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                        }
                        registry.register(stream, peer);
                    }
                    Err(e) => {
                        tokio::time::sleep(backoff.failed(&e)).await;
                    }
                }
            }
            _ = ticker.tick() => {
                let report = run_tick(&mut registry, &store, &mut codec, &mut frame);
                if report != TickReport::default() {
                    trace!(
                        "tick: promoted={} delivered={} skipped={} evicted={} open={}",
                        report.promoted,
                        report.delivered,
                        report.skipped,
                        report.evicted,
                        registry.len()
                    );
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping WebSocket broadcast");
                break;
            }
        }
    }
}
