//! Ring-buffered log of tool invocations.
//!
//! Params are redacted before they enter the buffer: keys matching the
//! sensitive pattern are blanked, and every policy-registered regex is
//! applied to string values. Nothing sensitive survives into `entries()`.

use std::collections::VecDeque;
use std::sync::Mutex;

use regex::Regex;

use gantry_types::{ToolInvocationEvent, now_unix_ms, redact_value_in_place};

pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 500;

#[derive(Debug)]
struct EventLogInner {
    entries: VecDeque<ToolInvocationEvent>,
    patterns: Vec<Regex>,
}

#[derive(Debug)]
pub struct EventLog {
    capacity: usize,
    inner: Mutex<EventLogInner>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_LOG_CAPACITY)
    }
}

impl EventLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_patterns(capacity, Vec::new())
    }

    /// Patterns must already be compiled; the policy layer validates them
    /// at load time so redaction never fails.
    #[must_use]
    pub fn with_patterns(capacity: usize, patterns: Vec<Regex>) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(EventLogInner {
                entries: VecDeque::with_capacity(capacity.max(1)),
                patterns,
            }),
        }
    }

    /// Register an additional redaction pattern at runtime.
    pub fn register_pattern(&self, pattern: Regex) {
        let mut inner = self.inner.lock().expect("event log poisoned");
        inner.patterns.push(pattern);
    }

    /// Append one event, stamping a missing timestamp and redacting params
    /// in place. Once full, the oldest entry is dropped.
    pub fn record(&self, mut event: ToolInvocationEvent) {
        if event.timestamp_ms.is_none() {
            event.timestamp_ms = Some(now_unix_ms());
        }
        let mut inner = self.inner.lock().expect("event log poisoned");
        redact_value_in_place(&mut event.params, &inner.patterns);
        if inner.entries.len() == self.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(event);
    }

    /// All retained events, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<ToolInvocationEvent> {
        self.inner
            .lock()
            .expect("event log poisoned")
            .entries
            .iter()
            .cloned()
            .collect()
    }

    /// Alias for [`Self::entries`], matching the listing verb used by the
    /// session manager.
    #[must_use]
    pub fn list(&self) -> Vec<ToolInvocationEvent> {
        self.entries()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.lock().expect("event log poisoned").entries.len()
    }

    pub fn clear(&self) {
        self.inner
            .lock()
            .expect("event log poisoned")
            .entries
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use gantry_types::{REDACTED, ResultSummary, ToolInvocationEvent};
    use regex::Regex;
    use serde_json::json;

    use super::EventLog;

    fn event(tool: &str, params: serde_json::Value) -> ToolInvocationEvent {
        ToolInvocationEvent {
            timestamp_ms: None,
            tool_name: tool.into(),
            session_id: None,
            window_id: None,
            params,
            result: ResultSummary::ok(),
            duration_ms: 5,
        }
    }

    #[test]
    fn record_stamps_missing_timestamps() {
        let log = EventLog::new(10);
        log.record(event("snapshot_capture", json!({})));
        assert!(log.entries()[0].timestamp_ms.is_some());
    }

    #[test]
    fn capacity_drops_oldest_entries() {
        let log = EventLog::new(2);
        for i in 0..3 {
            log.record(event(&format!("tool_{i}"), json!({})));
        }
        let names: Vec<String> = log.entries().into_iter().map(|e| e.tool_name).collect();
        assert_eq!(names, vec!["tool_1", "tool_2"]);
        assert_eq!(log.size(), 2);
    }

    #[test]
    fn sensitive_keys_and_registered_patterns_are_scrubbed() {
        let log = EventLog::with_patterns(10, vec![Regex::new(r"ghp_[A-Za-z0-9]+").unwrap()]);
        log.record(event(
            "element_type",
            json!({
                "text": "token ghp_abc123 in flight",
                "api_key": "super-secret",
            }),
        ));
        let params = &log.entries()[0].params;
        assert_eq!(params["api_key"], REDACTED);
        assert_eq!(params["text"], format!("token {REDACTED} in flight"));
    }

    #[test]
    fn patterns_registered_later_apply_to_new_events() {
        let log = EventLog::new(10);
        log.record(event("a", json!({"v": "hide-me"})));
        log.register_pattern(Regex::new("hide-me").unwrap());
        log.record(event("b", json!({"v": "hide-me"})));

        let entries = log.entries();
        assert_eq!(entries[0].params["v"], "hide-me");
        assert_eq!(entries[1].params["v"], gantry_types::REDACTED);
    }

    #[test]
    fn clear_empties_the_buffer() {
        let log = EventLog::new(10);
        log.record(event("a", json!({})));
        log.clear();
        assert_eq!(log.size(), 0);
    }
}
