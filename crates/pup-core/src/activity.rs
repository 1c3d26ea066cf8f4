//! Append-only session activity feed, newest first, bounded.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

pub const ACTIVITY_LOG_CAP: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

impl ActivityEntry {
    /// Render as a single display line, `HH:MM:SS message`.
    pub fn display_line(&self) -> String {
        format!("{} {}", self.at.format("%H:%M:%S"), self.message)
    }
}

/// Observational sink for everything the session does: connects, sends,
/// rejections, inbound messages. Never drives control flow.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: VecDeque<ActivityEntry>,
    cap: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::with_capacity(ACTIVITY_LOG_CAP)
    }
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    pub fn append(&mut self, message: impl Into<String>) {
        self.append_at(Utc::now(), message);
    }

    pub fn append_at(&mut self, at: DateTime<Utc>, message: impl Into<String>) {
        self.entries.push_front(ActivityEntry {
            at,
            message: message.into(),
        });
        self.entries.truncate(self.cap);
    }

    /// Newest first.
    pub fn entries(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_entry_comes_first() {
        let mut log = ActivityLog::new();
        log.append("first");
        log.append("second");
        let messages: Vec<_> = log.entries().map(|entry| entry.message.as_str()).collect();
        assert_eq!(messages, vec!["second", "first"]);
    }

    #[test]
    fn log_is_bounded() {
        let mut log = ActivityLog::with_capacity(3);
        for i in 0..5 {
            log.append(format!("entry-{i}"));
        }
        assert_eq!(log.len(), 3);
        let messages: Vec<_> = log.entries().map(|entry| entry.message.as_str()).collect();
        assert_eq!(messages, vec!["entry-4", "entry-3", "entry-2"]);
    }

    #[test]
    fn display_line_carries_timestamp_and_message() {
        let mut log = ActivityLog::new();
        let at = DateTime::parse_from_rfc3339("2026-03-01T09:30:05Z")
            .unwrap()
            .with_timezone(&Utc);
        log.append_at(at, "connected");
        let line = log.entries().next().unwrap().display_line();
        assert_eq!(line, "09:30:05 connected");
    }
}
