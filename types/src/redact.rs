//! Redaction primitives shared by the event log and launch diagnostics.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Replacement written over sensitive values.
pub const REDACTED: &str = "[REDACTED]";

static SENSITIVE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("(?i)(token|secret|password|passwd|key|auth|cookie|session|credential)")
        .expect("sensitive-key pattern is a valid regex")
});

/// Whether a key name looks like it carries a secret.
#[must_use]
pub fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEY_RE.is_match(key)
}

/// Redact a JSON value in place.
///
/// Object values under a sensitive key are replaced wholesale with
/// [`REDACTED`]; every string value anywhere in the tree additionally has
/// each of `patterns` applied globally.
pub fn redact_value_in_place(value: &mut Value, patterns: &[Regex]) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                if is_sensitive_key(key) {
                    *entry = Value::String(REDACTED.to_string());
                } else {
                    redact_value_in_place(entry, patterns);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                redact_value_in_place(item, patterns);
            }
        }
        Value::String(s) => {
            for pattern in patterns {
                if pattern.is_match(s) {
                    *s = pattern.replace_all(s, REDACTED).into_owned();
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use regex::Regex;
    use serde_json::json;

    use super::{REDACTED, is_sensitive_key, redact_value_in_place};

    #[test]
    fn sensitive_keys_match_case_insensitively() {
        assert!(is_sensitive_key("apiKey"));
        assert!(is_sensitive_key("AUTH_HEADER"));
        assert!(is_sensitive_key("session_cookie"));
        assert!(!is_sensitive_key("url"));
        assert!(!is_sensitive_key("title"));
    }

    #[test]
    fn sensitive_keys_are_blanked_recursively() {
        let mut value = json!({
            "url": "http://localhost:3000",
            "apiToken": "abc123",
            "nested": { "password": "hunter2", "plain": "keepme" },
        });
        redact_value_in_place(&mut value, &[]);
        assert_eq!(value["apiToken"], REDACTED);
        assert_eq!(value["nested"]["password"], REDACTED);
        assert_eq!(value["nested"]["plain"], "keepme");
        assert_eq!(value["url"], "http://localhost:3000");
    }

    #[test]
    fn registered_patterns_scrub_string_values() {
        let patterns = vec![Regex::new(r"sk-[A-Za-z0-9]+").unwrap()];
        let mut value = json!({
            "note": "use sk-abc123 for access",
            "items": ["plain", "another sk-zzz9"],
        });
        redact_value_in_place(&mut value, &patterns);
        assert_eq!(value["note"], format!("use {REDACTED} for access"));
        assert_eq!(value["items"][1], format!("another {REDACTED}"));
    }
}
