use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ==================== Breakpoint Kind ====================

/// Normalized breakpoint kind
///
/// GDB reports kinds as `gdb.BP_*` integer constants while LLDB has no
/// equivalent and is always a software breakpoint. Both are folded into this
/// enum; codes with no named variant are kept as `Other` and rendered as
/// `code-<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "KindRepr", into = "String")]
pub enum BreakpointKind {
    Software,
    Hardware,
    Watchpoint,
    HardwareWatchpoint,
    ReadWatchpoint,
    AccessWatchpoint,
    Catchpoint,
    Other(i32),
}

impl BreakpointKind {
    /// Map a `gdb.BP_*` constant
    pub fn from_gdb_code(code: i32) -> Self {
        match code {
            1 => Self::Software,
            2 => Self::Hardware,
            6 => Self::Watchpoint,
            7 => Self::HardwareWatchpoint,
            8 => Self::ReadWatchpoint,
            9 => Self::AccessWatchpoint,
            26 => Self::Catchpoint,
            other => Self::Other(other),
        }
    }

    /// Whether this kind watches memory rather than a code location
    pub fn is_watchpoint(&self) -> bool {
        matches!(
            self,
            Self::Watchpoint | Self::HardwareWatchpoint | Self::ReadWatchpoint | Self::AccessWatchpoint
        )
    }
}

impl fmt::Display for BreakpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Software => f.write_str("software"),
            Self::Hardware => f.write_str("hardware"),
            Self::Watchpoint => f.write_str("watchpoint"),
            Self::HardwareWatchpoint => f.write_str("hw-watchpoint"),
            Self::ReadWatchpoint => f.write_str("read-watchpoint"),
            Self::AccessWatchpoint => f.write_str("access-watchpoint"),
            Self::Catchpoint => f.write_str("catchpoint"),
            Self::Other(code) => write!(f, "code-{}", code),
        }
    }
}

/// Error for an unrecognized kind name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown breakpoint kind '{0}'")]
pub struct UnknownKind(pub String);

impl FromStr for BreakpointKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.to_ascii_lowercase().as_str() {
            "software" | "breakpoint" => Self::Software,
            "hardware" | "hw-breakpoint" => Self::Hardware,
            "watchpoint" => Self::Watchpoint,
            "hw-watchpoint" => Self::HardwareWatchpoint,
            "read-watchpoint" => Self::ReadWatchpoint,
            "access-watchpoint" => Self::AccessWatchpoint,
            "catchpoint" => Self::Catchpoint,
            other => match other.strip_prefix("code-").map(str::parse::<i32>) {
                Some(Ok(code)) => Self::Other(code),
                _ => return Err(UnknownKind(s.to_string())),
            },
        };
        Ok(kind)
    }
}

impl From<BreakpointKind> for String {
    fn from(kind: BreakpointKind) -> Self {
        kind.to_string()
    }
}

/// Wire form accepted from producers: a GDB code or a kind name
#[derive(Deserialize)]
#[serde(untagged)]
enum KindRepr {
    Code(i32),
    Name(String),
}

impl TryFrom<KindRepr> for BreakpointKind {
    type Error = UnknownKind;

    fn try_from(repr: KindRepr) -> Result<Self, Self::Error> {
        match repr {
            KindRepr::Code(code) => Ok(Self::from_gdb_code(code)),
            KindRepr::Name(name) => name.parse(),
        }
    }
}

// ==================== Breakpoint Info ====================

/// One breakpoint, watchpoint or catchpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BreakpointInfo {
    /// Debugger-assigned breakpoint number (unique key)
    pub num: u32,
    /// Source file; empty for watchpoints and unresolved locations
    #[serde(default)]
    pub file: String,
    /// Source line; 0 when unknown
    #[serde(default)]
    pub line: u32,
    pub kind: BreakpointKind,
    /// Human-readable location ("file:line", address, expression)
    #[serde(default)]
    pub location: String,
    /// True iff no condition, thread or task restriction applies
    pub nonconditional: bool,
    pub enabled: bool,
}

impl BreakpointInfo {
    /// Unconditional, enabled software breakpoint at `file:line`
    pub fn new(num: u32, file: impl Into<String>, line: u32) -> Self {
        let file = file.into();
        Self {
            num,
            location: format!("{}:{}", file, line),
            file,
            line,
            kind: BreakpointKind::Software,
            nonconditional: true,
            enabled: true,
        }
    }
}
