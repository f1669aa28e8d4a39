use serde::{Deserialize, Serialize};

// ==================== Thread Location ====================

/// Last-known stop location of a thread
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThreadLocation {
    /// Location resolved by the debugger backend
    Known {
        file: String,
        line: Option<u32>,
        tid: u64,
    },
    /// The backend failed to inspect this thread (e.g. a stale handle)
    Error(String),
}

/// One execution thread of the debugged process
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadInfo {
    /// Debugger-assigned thread number (unique key)
    pub num: u32,
    /// Thread name, when the backend reports one
    #[serde(default)]
    pub name: Option<String>,
    pub location: ThreadLocation,
}

impl ThreadInfo {
    /// Create a thread with a resolved location
    pub fn new(num: u32, file: impl Into<String>, line: Option<u32>, tid: u64) -> Self {
        Self {
            num,
            name: None,
            location: ThreadLocation::Known {
                file: file.into(),
                line,
                tid,
            },
        }
    }

    /// Create a thread whose inspection failed
    pub fn error(num: u32, message: impl Into<String>) -> Self {
        Self {
            num,
            name: None,
            location: ThreadLocation::Error(message.into()),
        }
    }

    /// Attach a thread name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Whether the backend failed to inspect this thread
    pub fn is_error(&self) -> bool {
        matches!(self.location, ThreadLocation::Error(_))
    }
}
