//! Derived session counters, fed one decoded event at a time.
//!
//! The aggregator is the only writer of [`TrainingMetrics`]. Success
//! highlighting uses an epoch token instead of timer cancellation: every
//! crediting event bumps the epoch, and a scheduled clear only lands if its
//! epoch is still current, so a later success supersedes an earlier pending
//! clear.

use crate::wire::{EventEnvelope, EventKind};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Most-recent success records kept for display, newest first.
pub const RECENT_SUCCESS_CAP: usize = 10;
/// How long the success highlight stays lit after the latest credit.
pub const HIGHLIGHT_WINDOW_MS: u64 = 3000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessRecord {
    pub target_pose: Option<String>,
    pub filename: Option<String>,
    pub text: Option<String>,
    pub when: DateTime<Utc>,
}

/// Token identifying one highlight window. Stale tokens no-op on clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightEpoch(u64);

#[derive(Debug, Clone, Default)]
pub struct TrainingMetrics {
    success_count: u64,
    treat_count: u64,
    recent: VecDeque<SuccessRecord>,
    highlight_on: bool,
    highlight_epoch: u64,
}

impl TrainingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success_count(&self) -> u64 {
        self.success_count
    }

    pub fn treat_count(&self) -> u64 {
        self.treat_count
    }

    /// Newest first.
    pub fn recent_successes(&self) -> impl Iterator<Item = &SuccessRecord> {
        self.recent.iter()
    }

    pub fn highlight_active(&self) -> bool {
        self.highlight_on
    }

    /// Applies one decoded event. Returns the new highlight epoch when the
    /// event credited a success, so the caller can schedule the matching
    /// clear after [`HIGHLIGHT_WINDOW_MS`].
    pub fn apply_event(
        &mut self,
        envelope: &EventEnvelope,
        now: DateTime<Utc>,
    ) -> Option<HighlightEpoch> {
        match envelope.event_kind() {
            EventKind::CommandSuccess => {
                let record = SuccessRecord {
                    target_pose: envelope.payload_str("target_pose").map(str::to_string),
                    filename: envelope.payload_str("filename").map(str::to_string),
                    text: envelope.payload_str("command_text").map(str::to_string),
                    when: now,
                };
                Some(self.credit_success(record))
            }
            EventKind::TreatGiven => {
                self.treat_count += 1;
                let auto = envelope
                    .payload_str("reason")
                    .map(|reason| reason.eq_ignore_ascii_case("auto"))
                    .unwrap_or(false);
                if auto {
                    // An autonomously earned treat counts as a successful
                    // autonomous command. This fires even when a separate
                    // command_success arrives for the same action.
                    Some(self.credit_success(SuccessRecord {
                        target_pose: None,
                        filename: None,
                        text: Some("treat:auto".to_string()),
                        when: now,
                    }))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Turns the highlight off, unless a later credit restarted the window.
    /// Returns whether the clear took effect.
    pub fn clear_highlight(&mut self, epoch: HighlightEpoch) -> bool {
        if epoch.0 != self.highlight_epoch {
            return false;
        }
        self.highlight_on = false;
        true
    }

    fn credit_success(&mut self, record: SuccessRecord) -> HighlightEpoch {
        self.success_count += 1;
        self.recent.push_front(record);
        self.recent.truncate(RECENT_SUCCESS_CAP);
        self.highlight_on = true;
        self.highlight_epoch += 1;
        HighlightEpoch(self.highlight_epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{decode_message, DeviceMessage};
    use serde_json::json;

    fn envelope(name: &str, payload: serde_json::Value) -> EventEnvelope {
        let raw = json!({
            "type": "event",
            "event": name,
            "timestamp": 1700000000.0,
            "payload": payload,
        })
        .to_string();
        match decode_message(&raw) {
            DeviceMessage::Event(envelope) => envelope,
            DeviceMessage::Unstructured(text) => panic!("fixture did not decode: {text}"),
        }
    }

    #[test]
    fn success_count_matches_event_count() {
        let mut metrics = TrainingMetrics::new();
        let event = envelope("command_success", json!({"target_pose": "sit"}));
        for _ in 0..7 {
            metrics.apply_event(&event, Utc::now());
        }
        assert_eq!(metrics.success_count(), 7);
        assert_eq!(metrics.treat_count(), 0);
    }

    #[test]
    fn success_records_capped_at_ten_newest_first() {
        let mut metrics = TrainingMetrics::new();
        for i in 0..11 {
            let event = envelope("command_success", json!({"target_pose": format!("pose-{i}")}));
            metrics.apply_event(&event, Utc::now());
        }
        let poses: Vec<_> = metrics
            .recent_successes()
            .map(|record| record.target_pose.clone().unwrap())
            .collect();
        assert_eq!(poses.len(), RECENT_SUCCESS_CAP);
        assert_eq!(poses.first().map(String::as_str), Some("pose-10"));
        // pose-0 evicted
        assert_eq!(poses.last().map(String::as_str), Some("pose-1"));
    }

    #[test]
    fn auto_treat_credits_both_counters_once() {
        let mut metrics = TrainingMetrics::new();
        let event = envelope("treat_given", json!({"reason": "AUTO"}));
        let epoch = metrics.apply_event(&event, Utc::now());
        assert!(epoch.is_some());
        assert_eq!(metrics.treat_count(), 1);
        assert_eq!(metrics.success_count(), 1);
        let record = metrics.recent_successes().next().unwrap();
        assert_eq!(record.text.as_deref(), Some("treat:auto"));
        assert_eq!(record.target_pose, None);
        assert_eq!(record.filename, None);
    }

    #[test]
    fn manual_or_absent_reason_only_counts_the_treat() {
        let mut metrics = TrainingMetrics::new();
        assert!(metrics
            .apply_event(&envelope("treat_given", json!({"reason": "manual"})), Utc::now())
            .is_none());
        assert!(metrics
            .apply_event(&envelope("treat_given", json!({})), Utc::now())
            .is_none());
        assert_eq!(metrics.treat_count(), 2);
        assert_eq!(metrics.success_count(), 0);
        assert!(!metrics.highlight_active());
    }

    #[test]
    fn later_success_supersedes_pending_highlight_clear() {
        let mut metrics = TrainingMetrics::new();
        let event = envelope("command_success", json!({}));
        let first = metrics.apply_event(&event, Utc::now()).unwrap();
        let second = metrics.apply_event(&event, Utc::now()).unwrap();
        assert_ne!(first, second);

        // the first window's clear fires after the second credit: no-op
        assert!(!metrics.clear_highlight(first));
        assert!(metrics.highlight_active());

        assert!(metrics.clear_highlight(second));
        assert!(!metrics.highlight_active());
    }

    #[test]
    fn highlight_lights_immediately_on_credit() {
        let mut metrics = TrainingMetrics::new();
        assert!(!metrics.highlight_active());
        metrics.apply_event(&envelope("command_success", json!({})), Utc::now());
        assert!(metrics.highlight_active());
    }

    #[test]
    fn unrecognized_events_leave_counters_untouched() {
        let mut metrics = TrainingMetrics::new();
        for name in ["mode_changed", "pose_transition", "battery_low", "status"] {
            assert!(metrics
                .apply_event(&envelope(name, json!({"mode": "auto"})), Utc::now())
                .is_none());
        }
        assert_eq!(metrics.success_count(), 0);
        assert_eq!(metrics.treat_count(), 0);
        assert!(!metrics.highlight_active());
    }

    #[test]
    fn malformed_payload_fields_read_as_absent() {
        let mut metrics = TrainingMetrics::new();
        let event = envelope(
            "command_success",
            json!({"target_pose": 42, "filename": ["a"], "command_text": null}),
        );
        metrics.apply_event(&event, Utc::now());
        let record = metrics.recent_successes().next().unwrap();
        assert_eq!(record.target_pose, None);
        assert_eq!(record.filename, None);
        assert_eq!(record.text, None);
        assert_eq!(metrics.success_count(), 1);
    }
}
