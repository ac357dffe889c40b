//! Bounded, insertion-ordered operation log shown in the dashboard.

use crate::model::Severity;
use std::collections::VecDeque;
use std::sync::OnceLock;
use time::{OffsetDateTime, UtcOffset};

/// Longest captured command output shown in a single log line.
pub const MAX_OUTPUT_DISPLAY: usize = 80;

static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

/// Record the local UTC offset. Must run before any other thread exists,
/// otherwise the offset cannot be determined soundly and UTC is used.
pub fn init_local_offset() {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let _ = LOCAL_OFFSET.set(offset);
}

fn now_local() -> OffsetDateTime {
    let offset = LOCAL_OFFSET.get().copied().unwrap_or(UtcOffset::UTC);
    OffsetDateTime::now_utc().to_offset(offset)
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: OffsetDateTime,
    pub severity: Severity,
    pub text: String,
}

#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest once the log is full. Every entry
    /// is mirrored to the lifecycle log file.
    pub fn push(&mut self, severity: Severity, text: impl Into<String>) {
        let text = text.into();
        match severity {
            Severity::Error => tracing::error!("{text}"),
            Severity::Warn => tracing::warn!("{text}"),
            Severity::Info | Severity::Command | Severity::Success => {
                tracing::info!(kind = severity.label(), "{text}")
            }
        }

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            timestamp: now_local(),
            severity,
            text,
        });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }
}

/// Collapse command output to one line of at most [`MAX_OUTPUT_DISPLAY`] chars.
pub fn truncate_output(output: &str) -> String {
    let flat = output.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= MAX_OUTPUT_DISPLAY {
        return flat;
    }
    let mut cut: String = flat.chars().take(MAX_OUTPUT_DISPLAY - 3).collect();
    cut.push_str("...");
    cut
}
