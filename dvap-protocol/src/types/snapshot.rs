use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::{BreakpointInfo, ThreadInfo, ThreadLocation};

/// Immutable point-in-time view of the debugger state
///
/// Both maps are ordered by their numeric key, which is what makes the
/// rendered text deterministic across ticks. The maps sit behind `Arc` so a
/// writer that replaces one map can share the other with the previous
/// snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSnapshot {
    threads: Arc<BTreeMap<u32, ThreadInfo>>,
    breakpoints: Arc<BTreeMap<u32, BreakpointInfo>>,
    generation: u64,
}

impl StateSnapshot {
    pub fn new(
        threads: Arc<BTreeMap<u32, ThreadInfo>>,
        breakpoints: Arc<BTreeMap<u32, BreakpointInfo>>,
        generation: u64,
    ) -> Self {
        Self {
            threads,
            breakpoints,
            generation,
        }
    }

    pub fn threads(&self) -> &Arc<BTreeMap<u32, ThreadInfo>> {
        &self.threads
    }

    pub fn breakpoints(&self) -> &Arc<BTreeMap<u32, BreakpointInfo>> {
        &self.breakpoints
    }

    /// Number of updates applied before this snapshot was taken
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty() && self.breakpoints.is_empty()
    }

    /// Render the line-oriented broadcast payload
    ///
    /// ```text
    /// thread:<num>:<file>:<line>:<tid>
    /// thread:<num>:!error:<message>
    /// bp:<num>:<file>:<line>:<kind>:<location>:<nonconditional>:<enabled>
    /// ```
    ///
    /// Lines are joined with `\n` and carry no trailing newline.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StateSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut separator = "";

        for (num, thread) in self.threads.iter() {
            f.write_str(separator)?;
            separator = "\n";
            match &thread.location {
                ThreadLocation::Known { file, line, tid } => {
                    write!(f, "thread:{}:{}:", num, Field(file))?;
                    if let Some(line) = line {
                        write!(f, "{}", line)?;
                    }
                    write!(f, ":{}", tid)?;
                }
                ThreadLocation::Error(message) => {
                    write!(f, "thread:{}:!error:{}", num, Field(message))?;
                }
            }
        }

        for (num, bp) in self.breakpoints.iter() {
            f.write_str(separator)?;
            separator = "\n";
            write!(
                f,
                "bp:{}:{}:{}:{}:{}:{}:{}",
                num,
                Field(&bp.file),
                bp.line,
                bp.kind,
                Field(&bp.location),
                bp.nonconditional,
                bp.enabled
            )?;
        }

        Ok(())
    }
}

/// Text field with line breaks flattened so one entity stays one line
struct Field<'a>(&'a str);

impl fmt::Display for Field<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rest = self.0;
        while let Some(pos) = rest.find(['\r', '\n']) {
            f.write_str(&rest[..pos])?;
            f.write_str(" ")?;
            rest = &rest[pos + 1..];
        }
        f.write_str(rest)
    }
}
