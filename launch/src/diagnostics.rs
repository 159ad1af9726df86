//! Launch diagnostics: output collectors, event log, readiness timeline,
//! and the environment reporter.
//!
//! Everything here is bounded. Collectors and the event log are ring
//! buffers; the readiness timeline is append-only but sees a handful of
//! records per launch.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use serde::Serialize;
use serde_json::{Value, json};

use gantry_types::{REDACTED, is_sensitive_key, now_unix_ms};

pub const DEFAULT_COLLECTOR_CAPACITY: usize = 160;
pub const MIN_COLLECTOR_CAPACITY: usize = 10;
pub const DEFAULT_EVENT_CAPACITY: usize = 300;

/// Fixed-capacity line accumulator with partial-line carry-over.
///
/// Chunks are split on `\r?\n`; an unterminated tail is carried until the
/// next chunk (or `flush`). Lines are trimmed and empty lines dropped.
/// Once full, the oldest lines fall off.
#[derive(Debug)]
pub struct LineCollector {
    capacity: usize,
    lines: VecDeque<String>,
    carry: String,
}

impl LineCollector {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_COLLECTOR_CAPACITY);
        Self {
            capacity,
            lines: VecDeque::with_capacity(capacity),
            carry: String::new(),
        }
    }

    /// Feed a raw chunk; returns the lines completed by it.
    pub fn push_chunk(&mut self, chunk: &str) -> Vec<String> {
        self.carry.push_str(chunk);
        let mut completed = Vec::new();
        while let Some(pos) = self.carry.find('\n') {
            let rest = self.carry.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.carry, rest);
            line.truncate(pos);
            if line.ends_with('\r') {
                line.pop();
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                let owned = trimmed.to_string();
                self.push_line(owned.clone());
                completed.push(owned);
            }
        }
        completed
    }

    /// Flush a trailing unterminated line, if any.
    pub fn flush(&mut self) -> Option<String> {
        let carry = std::mem::take(&mut self.carry);
        let trimmed = carry.trim();
        if trimmed.is_empty() {
            return None;
        }
        let owned = trimmed.to_string();
        self.push_line(owned.clone());
        Some(owned)
    }

    fn push_line(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    /// The most recent `n` lines, oldest first.
    #[must_use]
    pub fn tail(&self, n: usize) -> Vec<String> {
        self.lines
            .iter()
            .skip(self.lines.len().saturating_sub(n))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Category of a launch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchEventKind {
    Launch,
    Process,
    Signal,
    Window,
    Target,
    Attach,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaunchEvent {
    pub at_ms: i64,
    pub kind: LaunchEventKind,
    pub message: String,
}

/// Ring buffer of launch events.
#[derive(Debug)]
pub struct LaunchEventLog {
    capacity: usize,
    events: VecDeque<LaunchEvent>,
}

impl Default for LaunchEventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl LaunchEventLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: VecDeque::new(),
        }
    }

    pub fn push(&mut self, kind: LaunchEventKind, message: impl Into<String>) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(LaunchEvent {
            at_ms: now_unix_ms(),
            kind,
            message: message.into(),
        });
    }

    #[must_use]
    pub fn events(&self) -> Vec<LaunchEvent> {
        self.events.iter().cloned().collect()
    }
}

/// One readiness attempt, appended when it finishes.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessRecord {
    pub signal_name: String,
    pub attempt: u32,
    pub started_at_ms: i64,
    pub finished_at_ms: i64,
    pub duration_ms: u64,
    pub ready: bool,
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Append-only readiness history.
#[derive(Debug, Default)]
pub struct ReadinessTimeline {
    records: Vec<ReadinessRecord>,
}

impl ReadinessTimeline {
    pub fn push(&mut self, record: ReadinessRecord) {
        self.records.push(record);
    }

    #[must_use]
    pub fn records(&self) -> &[ReadinessRecord] {
        &self.records
    }
}

/// Sanitized environment report.
#[derive(Debug, Clone, Serialize)]
pub struct EnvReport {
    /// Included keys in lexicographic order; sensitive values blanked.
    pub included: BTreeMap<String, String>,
    pub redacted_keys: Vec<String>,
}

/// Reports environment variables for diagnostics without leaking secrets.
#[derive(Debug, Clone)]
pub struct EnvReporter {
    include_prefixes: Vec<String>,
    allowlist: globset::GlobSet,
}

impl EnvReporter {
    pub fn new(
        include_prefixes: Vec<String>,
        allowlist_patterns: &[String],
    ) -> Result<Self, gantry_types::ServerError> {
        let mut builder = globset::GlobSetBuilder::new();
        for pat in allowlist_patterns {
            let glob = globset::GlobBuilder::new(pat)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    gantry_types::ServerError::invalid_input(format!(
                        "Invalid env allowlist pattern '{pat}': {e}"
                    ))
                })?;
            builder.add(glob);
        }
        let allowlist = builder.build().map_err(|e| {
            gantry_types::ServerError::invalid_input(format!("Invalid env allowlist: {e}"))
        })?;
        Ok(Self {
            include_prefixes,
            allowlist,
        })
    }

    fn includes(&self, key: &str) -> bool {
        self.include_prefixes.iter().any(|p| key.starts_with(p.as_str()))
            || self.allowlist.is_match(key)
    }

    /// Build the report: included keys sorted, sensitive names replaced
    /// with [`REDACTED`] and listed separately.
    #[must_use]
    pub fn report(&self, env: &[(String, String)]) -> EnvReport {
        let mut included = BTreeMap::new();
        let mut redacted_keys = Vec::new();
        for (key, value) in env {
            if !self.includes(key) {
                continue;
            }
            if is_sensitive_key(key) {
                redacted_keys.push(key.clone());
                included.insert(key.clone(), REDACTED.to_string());
            } else {
                included.insert(key.clone(), value.clone());
            }
        }
        redacted_keys.sort();
        EnvReport {
            included,
            redacted_keys,
        }
    }
}

/// Shared container for everything a launch records.
#[derive(Debug)]
pub struct LaunchDiagnostics {
    pub stdout: Mutex<LineCollector>,
    pub stderr: Mutex<LineCollector>,
    pub events: Mutex<LaunchEventLog>,
    pub readiness: Mutex<ReadinessTimeline>,
    env: Mutex<Option<EnvReport>>,
}

impl Default for LaunchDiagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl LaunchDiagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stdout: Mutex::new(LineCollector::new(DEFAULT_COLLECTOR_CAPACITY)),
            stderr: Mutex::new(LineCollector::new(DEFAULT_COLLECTOR_CAPACITY)),
            events: Mutex::new(LaunchEventLog::default()),
            readiness: Mutex::new(ReadinessTimeline::default()),
            env: Mutex::new(None),
        }
    }

    pub fn set_env_report(&self, report: EnvReport) {
        *self.env.lock().expect("env report poisoned") = Some(report);
    }

    pub fn record_event(&self, kind: LaunchEventKind, message: impl Into<String>) {
        self.events
            .lock()
            .expect("launch events poisoned")
            .push(kind, message);
    }

    #[must_use]
    pub fn stdout_tail(&self, n: usize) -> Vec<String> {
        self.stdout.lock().expect("stdout collector poisoned").tail(n)
    }

    #[must_use]
    pub fn stderr_tail(&self, n: usize) -> Vec<String> {
        self.stderr.lock().expect("stderr collector poisoned").tail(n)
    }

    /// JSON bundle attached to `LAUNCH_FAILED` details.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        let readiness: Vec<ReadinessRecord> = self
            .readiness
            .lock()
            .expect("readiness timeline poisoned")
            .records()
            .to_vec();
        json!({
            "stdout_tail": self.stdout_tail(40),
            "stderr_tail": self.stderr_tail(40),
            "events": self.events.lock().expect("launch events poisoned").events(),
            "readiness": readiness,
            "env": self.env.lock().expect("env report poisoned").clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{EnvReporter, LineCollector};

    #[test]
    fn chunks_split_with_carry_over() {
        let mut c = LineCollector::new(16);
        assert!(c.push_chunk("hello wo").is_empty());
        let done = c.push_chunk("rld\npartial");
        assert_eq!(done, vec!["hello world"]);
        let done = c.push_chunk(" line\r\n");
        assert_eq!(done, vec!["partial line"]);
        assert_eq!(c.lines(), vec!["hello world", "partial line"]);
    }

    #[test]
    fn empty_lines_are_dropped_and_lines_trimmed() {
        let mut c = LineCollector::new(16);
        c.push_chunk("  spaced  \n\n\r\nnext\n");
        assert_eq!(c.lines(), vec!["spaced", "next"]);
    }

    #[test]
    fn capacity_floors_at_minimum_and_drops_oldest() {
        let mut c = LineCollector::new(1);
        for i in 0..15 {
            c.push_chunk(&format!("line{i}\n"));
        }
        // Requested 1, floored to 10.
        assert_eq!(c.len(), 10);
        assert_eq!(c.lines()[0], "line5");
        assert_eq!(c.tail(2), vec!["line13", "line14"]);
    }

    #[test]
    fn flush_emits_the_trailing_partial_line() {
        let mut c = LineCollector::new(16);
        c.push_chunk("no newline yet");
        assert_eq!(c.flush(), Some("no newline yet".to_string()));
        assert_eq!(c.flush(), None);
    }

    #[test]
    fn env_report_includes_by_prefix_and_allowlist_sorted() {
        let reporter =
            EnvReporter::new(vec!["VITE_".into()], &["NODE_ENV".to_string()]).unwrap();
        let env = vec![
            ("VITE_PORT".to_string(), "5173".to_string()),
            ("NODE_ENV".to_string(), "development".to_string()),
            ("HOME".to_string(), "/home/dev".to_string()),
            ("VITE_API_KEY".to_string(), "abc".to_string()),
        ];
        let report = reporter.report(&env);
        let keys: Vec<&String> = report.included.keys().collect();
        assert_eq!(keys, vec!["NODE_ENV", "VITE_API_KEY", "VITE_PORT"]);
        assert_eq!(report.included["VITE_API_KEY"], gantry_types::REDACTED);
        assert_eq!(report.redacted_keys, vec!["VITE_API_KEY"]);
        assert!(!report.included.contains_key("HOME"));
    }
}
