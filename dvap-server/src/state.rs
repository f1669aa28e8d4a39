//! Shared debugger state
//!
//! Producers (debugger callbacks on their own thread) write, the broadcast
//! loop reads. Every mutation builds a new [`StateSnapshot`] and swaps it in
//! with a compare-and-swap, so readers never take a lock and never see half
//! of an update.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::trace;

use dvap_protocol::{BreakpointInfo, StateSnapshot, ThreadInfo};

/// Copy-on-write store of threads and breakpoints
///
/// Cloning is cheap and every clone refers to the same state.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    current: Arc<ArcSwap<StateSnapshot>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole thread mapping
    ///
    /// Later records win when `threads` repeats a number.
    pub fn update_threads(&self, threads: impl IntoIterator<Item = ThreadInfo>) {
        let threads: Arc<BTreeMap<u32, ThreadInfo>> =
            Arc::new(threads.into_iter().map(|t| (t.num, t)).collect());

        let previous = self.current.rcu(|current| {
            StateSnapshot::new(
                Arc::clone(&threads),
                Arc::clone(current.breakpoints()),
                current.generation() + 1,
            )
        });
        trace!(
            "threads updated: {} -> {}",
            previous.threads().len(),
            threads.len()
        );
    }

    /// Remove every thread, e.g. after the process exited
    pub fn clear_threads(&self) {
        self.update_threads(std::iter::empty());
    }

    /// Insert or replace one breakpoint
    pub fn upsert_breakpoint(&self, breakpoint: BreakpointInfo) {
        let num = breakpoint.num;
        self.current.rcu(|current| {
            let mut breakpoints = current.breakpoints().as_ref().clone();
            breakpoints.insert(num, breakpoint.clone());
            StateSnapshot::new(
                Arc::clone(current.threads()),
                Arc::new(breakpoints),
                current.generation() + 1,
            )
        });
        trace!("breakpoint {} upserted", num);
    }

    /// Remove one breakpoint; returns whether it existed
    pub fn remove_breakpoint(&self, num: u32) -> bool {
        let mut removed = false;
        self.current.rcu(|current| {
            if !current.breakpoints().contains_key(&num) {
                removed = false;
                return Arc::clone(current);
            }
            removed = true;
            let mut breakpoints = current.breakpoints().as_ref().clone();
            breakpoints.remove(&num);
            Arc::new(StateSnapshot::new(
                Arc::clone(current.threads()),
                Arc::new(breakpoints),
                current.generation() + 1,
            ))
        });
        trace!("breakpoint {} removed: {}", num, removed);
        removed
    }

    /// Replace the whole breakpoint set
    ///
    /// For integrations that re-read every breakpoint on each stop. Later
    /// records win when `breakpoints` repeats a number.
    pub fn replace_breakpoints(&self, breakpoints: impl IntoIterator<Item = BreakpointInfo>) {
        let breakpoints: Arc<BTreeMap<u32, BreakpointInfo>> =
            Arc::new(breakpoints.into_iter().map(|b| (b.num, b)).collect());

        let previous = self.current.rcu(|current| {
            StateSnapshot::new(
                Arc::clone(current.threads()),
                Arc::clone(&breakpoints),
                current.generation() + 1,
            )
        });
        trace!(
            "breakpoints replaced: {} -> {}",
            previous.breakpoints().len(),
            breakpoints.len()
        );
    }

    /// Consistent point-in-time copy of the state
    pub fn snapshot(&self) -> Arc<StateSnapshot> {
        self.current.load_full()
    }
}
