//! Debugger events and the notification queue
//!
//! Integrations push [`DebugEvent`]s through an [`EventSender`]. The
//! [`EventPump`] task applies state changes to the [`StateStore`] and turns
//! lifecycle events into JSON-RPC notifications queued for the event stream.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use dvap_protocol::{BreakpointChange, DebugEvent, Notification, NotificationMethod};
use dvap_utils::{DvapError, Result};

use crate::state::StateStore;

/// Bounded FIFO of pending notifications
///
/// Shared by the event pump (producer) and every event stream (consumers).
/// When full, the oldest notification is dropped.
#[derive(Debug, Clone)]
pub struct EventQueue {
    inner: Arc<Mutex<VecDeque<Notification>>>,
    max_queued: usize,
}

impl EventQueue {
    pub fn new(max_queued: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
            max_queued: max_queued.max(1),
        }
    }

    /// Queue a notification built from a method and its params
    pub fn queue_event(&self, method: NotificationMethod, params: Map<String, Value>) {
        self.push(Notification::new(method, params));
    }

    pub fn push(&self, notification: Notification) {
        let mut queue = self.inner.lock();
        if queue.len() >= self.max_queued {
            if let Some(dropped) = queue.pop_front() {
                warn!(
                    "Event queue full ({}), dropping oldest {:?} notification",
                    self.max_queued, dropped.method
                );
            }
        }
        queue.push_back(notification);
    }

    pub fn pop(&self) -> Option<Notification> {
        self.inner.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Producer handle for debugger events; cheap to clone, usable from any thread
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<DebugEvent>,
}

impl EventSender {
    pub fn send(&self, event: DebugEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| DvapError::EventChannelClosed)
    }
}

/// Create the event channel
pub fn event_channel() -> (EventSender, mpsc::UnboundedReceiver<DebugEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, rx)
}

/// Applies debugger events to the state store and the notification queue
pub struct EventPump {
    rx: mpsc::UnboundedReceiver<DebugEvent>,
    store: StateStore,
    queue: EventQueue,
}

impl EventPump {
    pub fn new(
        rx: mpsc::UnboundedReceiver<DebugEvent>,
        store: StateStore,
        queue: EventQueue,
    ) -> Self {
        Self { rx, store, queue }
    }

    /// Apply a single event
    pub fn apply(&self, event: DebugEvent) {
        match event {
            DebugEvent::ThreadsUpdated(threads) => {
                debug!("Threads updated: {} threads", threads.len());
                self.store.update_threads(threads);
            }
            DebugEvent::BreakpointChanged(change) => match change {
                BreakpointChange::Created(bp) | BreakpointChange::Modified(bp) => {
                    debug!("Breakpoint {} set at {}", bp.num, bp.location);
                    self.store.upsert_breakpoint(bp);
                }
                BreakpointChange::Deleted { num } => {
                    if !self.store.remove_breakpoint(num) {
                        debug!("Delete for unknown breakpoint {}", num);
                    }
                }
            },
            DebugEvent::ProcessStopped { reason, thread_id } => {
                self.queue.push(Notification::with_value(
                    NotificationMethod::Stopped,
                    json!({ "reason": reason.as_str(), "threadId": thread_id }),
                ));
            }
            DebugEvent::ProcessContinued { thread_id } => {
                let thread_id = match thread_id {
                    Some(id) => json!(id),
                    None => json!("all"),
                };
                self.queue.push(Notification::with_value(
                    NotificationMethod::Continued,
                    json!({ "threadId": thread_id }),
                ));
            }
            DebugEvent::ProcessExited { exit_code } => {
                info!("Debugged process exited with code {}", exit_code);
                self.store.clear_threads();
                self.queue.push(Notification::with_value(
                    NotificationMethod::Terminated,
                    json!({ "exitCode": exit_code }),
                ));
            }
            DebugEvent::ModuleLoaded { path } => {
                self.queue.push(Notification::with_value(
                    NotificationMethod::Module,
                    json!({ "newModule": path }),
                ));
            }
            DebugEvent::ModulesCleared => {
                self.queue.push(Notification::with_value(
                    NotificationMethod::Module,
                    json!({ "event": "cleared" }),
                ));
            }
        }
    }

    /// Apply events until every sender is dropped or shutdown is signalled
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                event = self.rx.recv() => {
                    match event {
                        Some(event) => self.apply(event),
                        None => {
                            debug!("All event senders dropped, stopping event pump");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping event pump");
                    break;
                }
            }
        }
    }
}

/// Forward newline-delimited JSON events from `reader` until end of input
///
/// Blank lines are skipped and malformed lines are logged and skipped.
/// Returns the number of events forwarded.
pub async fn forward_json_lines<R>(reader: R, sender: &EventSender) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;
    let mut line_no = 0;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<DebugEvent>(line) {
            Ok(event) => {
                sender.send(event)?;
                forwarded += 1;
            }
            Err(e) => warn!("Ignoring malformed event on line {}: {}", line_no, e),
        }
    }

    Ok(forwarded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dvap_protocol::{BreakpointInfo, StopReason, ThreadInfo};
    use std::time::Duration;

    fn pump() -> (EventPump, StateStore, EventQueue) {
        let (_tx, rx) = event_channel();
        let store = StateStore::new();
        let queue = EventQueue::new(16);
        (EventPump::new(rx, store.clone(), queue.clone()), store, queue)
    }

    fn params(n: &Notification) -> Value {
        Value::Object(n.params.clone())
    }

    // ==================== EventQueue Tests ====================

    #[test]
    fn test_queue_is_fifo() {
        let queue = EventQueue::new(8);
        queue.queue_event(NotificationMethod::Stopped, Map::new());
        queue.queue_event(NotificationMethod::Continued, Map::new());

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().method, NotificationMethod::Stopped);
        assert_eq!(queue.pop().unwrap().method, NotificationMethod::Continued);
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_drops_oldest_when_full() {
        let queue = EventQueue::new(2);
        queue.queue_event(NotificationMethod::Stopped, Map::new());
        queue.queue_event(NotificationMethod::Continued, Map::new());
        queue.queue_event(NotificationMethod::Terminated, Map::new());

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().method, NotificationMethod::Continued);
        assert_eq!(queue.pop().unwrap().method, NotificationMethod::Terminated);
    }

    #[test]
    fn test_queue_clones_share_entries() {
        let queue = EventQueue::new(4);
        let other = queue.clone();
        queue.queue_event(NotificationMethod::Module, Map::new());
        assert_eq!(other.len(), 1);
    }

    // ==================== EventSender Tests ====================

    #[test]
    fn test_send_after_receiver_dropped() {
        let (tx, rx) = event_channel();
        drop(rx);
        assert!(matches!(
            tx.send(DebugEvent::ModulesCleared),
            Err(DvapError::EventChannelClosed)
        ));
    }

    // ==================== EventPump Tests ====================

    #[test]
    fn test_state_events_update_store() {
        let (pump, store, queue) = pump();

        pump.apply(DebugEvent::ThreadsUpdated(vec![ThreadInfo::new(
            1,
            "main.c",
            Some(10),
            100,
        )]));
        pump.apply(DebugEvent::BreakpointChanged(BreakpointChange::Created(
            BreakpointInfo::new(1, "main.c", 10),
        )));
        pump.apply(DebugEvent::BreakpointChanged(BreakpointChange::Modified(
            BreakpointInfo {
                enabled: false,
                ..BreakpointInfo::new(1, "main.c", 10)
            },
        )));

        let snap = store.snapshot();
        assert_eq!(snap.threads().len(), 1);
        assert!(!snap.breakpoints()[&1].enabled);

        pump.apply(DebugEvent::BreakpointChanged(BreakpointChange::Deleted {
            num: 1,
        }));
        assert!(store.snapshot().breakpoints().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_stopped_notification() {
        let (pump, _store, queue) = pump();
        pump.apply(DebugEvent::ProcessStopped {
            reason: StopReason::Breakpoint,
            thread_id: Some(3),
        });

        let n = queue.pop().unwrap();
        assert_eq!(n.method, NotificationMethod::Stopped);
        assert_eq!(params(&n), json!({"reason": "breakpoint", "threadId": 3}));
    }

    #[test]
    fn test_continued_notification_all_threads() {
        let (pump, _store, queue) = pump();
        pump.apply(DebugEvent::ProcessContinued { thread_id: None });
        pump.apply(DebugEvent::ProcessContinued { thread_id: Some(2) });

        assert_eq!(params(&queue.pop().unwrap()), json!({"threadId": "all"}));
        assert_eq!(params(&queue.pop().unwrap()), json!({"threadId": 2}));
    }

    #[test]
    fn test_exit_clears_threads_and_notifies() {
        let (pump, store, queue) = pump();
        store.update_threads(vec![ThreadInfo::new(1, "main.c", Some(1), 1)]);
        store.upsert_breakpoint(BreakpointInfo::new(1, "main.c", 1));

        pump.apply(DebugEvent::ProcessExited { exit_code: 7 });

        let snap = store.snapshot();
        assert!(snap.threads().is_empty());
        assert_eq!(snap.breakpoints().len(), 1);

        let n = queue.pop().unwrap();
        assert_eq!(n.method, NotificationMethod::Terminated);
        assert_eq!(params(&n), json!({"exitCode": 7}));
    }

    #[test]
    fn test_module_notifications() {
        let (pump, _store, queue) = pump();
        pump.apply(DebugEvent::ModuleLoaded {
            path: "/usr/lib/libc.so.6".into(),
        });
        pump.apply(DebugEvent::ModulesCleared);

        let loaded = queue.pop().unwrap();
        assert_eq!(loaded.method, NotificationMethod::Module);
        assert_eq!(params(&loaded), json!({"newModule": "/usr/lib/libc.so.6"}));
        assert_eq!(params(&queue.pop().unwrap()), json!({"event": "cleared"}));
    }

    // ==================== JSON Lines Tests ====================

    #[tokio::test]
    async fn test_forward_json_lines_skips_bad_input() {
        let input = concat!(
            r#"{"event":"process_stopped","data":{"reason":"signal","thread_id":1}}"#,
            "\n\n",
            "not json\n",
            r#"{"event":"modules_cleared"}"#,
            "\n",
        );
        let (tx, mut rx) = event_channel();

        let forwarded = forward_json_lines(input.as_bytes(), &tx).await.unwrap();
        assert_eq!(forwarded, 2);
        assert_eq!(
            rx.recv().await.unwrap(),
            DebugEvent::ProcessStopped {
                reason: StopReason::Signal,
                thread_id: Some(1)
            }
        );
        assert_eq!(rx.recv().await.unwrap(), DebugEvent::ModulesCleared);
    }

    #[tokio::test]
    async fn test_forward_json_lines_closed_channel() {
        let (tx, rx) = event_channel();
        drop(rx);
        let result = forward_json_lines(&br#"{"event":"modules_cleared"}"#[..], &tx).await;
        assert!(matches!(result, Err(DvapError::EventChannelClosed)));
    }

    #[tokio::test]
    async fn test_run_applies_until_senders_dropped() {
        let (tx, rx) = event_channel();
        let store = StateStore::new();
        let queue = EventQueue::new(16);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = tokio::spawn(EventPump::new(rx, store.clone(), queue.clone()).run(shutdown_rx));

        tx.send(DebugEvent::ThreadsUpdated(vec![ThreadInfo::new(
            4,
            "x.c",
            None,
            9,
        )]))
        .unwrap();
        tx.send(DebugEvent::ModulesCleared).unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("pump did not stop")
            .unwrap();

        assert_eq!(store.snapshot().render(), "thread:4:x.c::9");
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (_tx, rx) = event_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(
            EventPump::new(rx, StateStore::new(), EventQueue::new(1)).run(shutdown_rx),
        );

        shutdown_tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), task).await;
        assert!(result.is_ok(), "event pump did not shut down");
    }
}
