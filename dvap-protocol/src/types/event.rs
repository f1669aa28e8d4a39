use serde::{Deserialize, Serialize};

use super::{BreakpointInfo, ThreadInfo};

/// Why the debugged process stopped
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    Breakpoint,
    Signal,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breakpoint => "breakpoint",
            Self::Signal => "signal",
        }
    }
}

/// Change to a single breakpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum BreakpointChange {
    Created(BreakpointInfo),
    Modified(BreakpointInfo),
    Deleted { num: u32 },
}

/// Event delivered by a debugger integration
///
/// Integrations translate their own callbacks (GDB `gdb.events.*`, LLDB
/// listener events) into this closed set and push them through a channel,
/// so the server never runs inside the debugger's callback context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum DebugEvent {
    /// Full replacement of the thread list
    ThreadsUpdated(Vec<ThreadInfo>),
    BreakpointChanged(BreakpointChange),
    ProcessStopped {
        reason: StopReason,
        #[serde(default)]
        thread_id: Option<u32>,
    },
    ProcessContinued {
        /// `None` when every thread resumed
        #[serde(default)]
        thread_id: Option<u32>,
    },
    ProcessExited {
        #[serde(default)]
        exit_code: i64,
    },
    ModuleLoaded {
        path: String,
    },
    ModulesCleared,
}
