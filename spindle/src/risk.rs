//! Risk classification for tool actions and the approval decision table.
//!
//! Pure and synchronous. Classification is by normalized tool name against
//! three fixed allow-lists; any name outside every list is `Irreversible`
//! (fail-closed). Parameter inspection may escalate risk, never lower it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// How hard an action is to undo.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Read-only; auto-executed (still logged).
    Reversible,
    /// Bounded undo window; approval depends on confidence.
    ReversibleWithDelay,
    /// Permanent consequence; always gated.
    Irreversible,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Reversible => "reversible",
            RiskLevel::ReversibleWithDelay => "reversible_with_delay",
            RiskLevel::Irreversible => "irreversible",
        };
        f.write_str(s)
    }
}

/// Read-only tools (includes the bound memory tools).
const REVERSIBLE_TOOLS: &[&str] = &[
    "web_search",
    "search",
    "file_read",
    "read_file",
    "time_lookup",
    "get_current_time",
    "memory_search",
    "search_memory",
    "memory_store",
    "store_memory",
];

/// Actions with a bounded undo window.
const REVERSIBLE_WITH_DELAY_TOOLS: &[&str] = &[
    "send_email",
    "create_calendar_event",
    "schedule_task",
];

/// Actions with permanent consequence.
const IRREVERSIBLE_TOOLS: &[&str] = &[
    "delete",
    "purchase",
    "transfer_funds",
    "modify_production",
];

/// Confidence below which a delayed-undo action still needs a human.
const DELAY_CONFIDENCE_THRESHOLD: f64 = 0.85;

/// Parameter values that escalate an otherwise read-only action.
static SENSITIVE_PARAM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(/etc/|\.ssh|\.env\b|id_rsa|credential|secret|password|private[_-]?key)")
        .expect("sensitive parameter pattern")
});

fn normalize(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn any_string_param_matches(value: &Value, pattern: &Regex) -> bool {
    match value {
        Value::String(s) => pattern.is_match(s),
        Value::Array(items) => items.iter().any(|v| any_string_param_matches(v, pattern)),
        Value::Object(map) => map.values().any(|v| any_string_param_matches(v, pattern)),
        _ => false,
    }
}

/// Maps `(tool name, parameters)` to a [`RiskLevel`].
///
/// Unknown names classify `Irreversible`. A read-only tool whose parameters
/// touch a sensitive pattern escalates to `ReversibleWithDelay`.
pub fn categorize(tool_name: &str, parameters: &Value) -> RiskLevel {
    let name = normalize(tool_name);
    let base = if REVERSIBLE_TOOLS.contains(&name.as_str()) {
        RiskLevel::Reversible
    } else if REVERSIBLE_WITH_DELAY_TOOLS.contains(&name.as_str()) {
        RiskLevel::ReversibleWithDelay
    } else if IRREVERSIBLE_TOOLS.contains(&name.as_str()) {
        RiskLevel::Irreversible
    } else {
        RiskLevel::Irreversible
    };

    if base == RiskLevel::Reversible && any_string_param_matches(parameters, &SENSITIVE_PARAM) {
        return RiskLevel::ReversibleWithDelay;
    }
    base
}

/// The approval decision table.
///
/// | risk | rule |
/// |------|------|
/// | `Irreversible` | always true |
/// | `ReversibleWithDelay` | true iff `confidence < 0.85` |
/// | `Reversible` | always false |
pub fn requires_approval(risk: RiskLevel, confidence: f64) -> bool {
    match risk {
        RiskLevel::Irreversible => true,
        RiskLevel::ReversibleWithDelay => confidence < DELAY_CONFIDENCE_THRESHOLD,
        RiskLevel::Reversible => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_allow_listed_name_classifies_to_its_level() {
        for name in REVERSIBLE_TOOLS {
            assert_eq!(categorize(name, &json!({})), RiskLevel::Reversible, "{name}");
        }
        for name in REVERSIBLE_WITH_DELAY_TOOLS {
            assert_eq!(
                categorize(name, &json!({})),
                RiskLevel::ReversibleWithDelay,
                "{name}"
            );
        }
        for name in IRREVERSIBLE_TOOLS {
            assert_eq!(categorize(name, &json!({})), RiskLevel::Irreversible, "{name}");
        }
    }

    #[test]
    fn unknown_names_default_to_irreversible() {
        assert_eq!(categorize("launch_rocket", &json!({})), RiskLevel::Irreversible);
        assert_eq!(categorize("", &json!({})), RiskLevel::Irreversible);
    }

    #[test]
    fn classification_is_case_and_separator_insensitive() {
        assert_eq!(categorize("Web Search", &json!({})), RiskLevel::Reversible);
        assert_eq!(categorize("SEND-EMAIL", &json!({})), RiskLevel::ReversibleWithDelay);
    }

    #[test]
    fn sensitive_path_escalates_read_only() {
        let risk = categorize("read_file", &json!({"path": "/etc/shadow"}));
        assert_eq!(risk, RiskLevel::ReversibleWithDelay);
        let risk = categorize("read_file", &json!({"path": "/home/user/notes.txt"}));
        assert_eq!(risk, RiskLevel::Reversible);
    }

    #[test]
    fn escalation_never_lowers_risk() {
        // A sensitive-looking parameter on an irreversible tool stays irreversible.
        let risk = categorize("delete", &json!({"path": "/tmp/safe.txt"}));
        assert_eq!(risk, RiskLevel::Irreversible);
    }

    #[test]
    fn approval_decision_table() {
        assert!(requires_approval(RiskLevel::Irreversible, 1.0));
        assert!(requires_approval(RiskLevel::Irreversible, 0.0));
        assert!(!requires_approval(RiskLevel::ReversibleWithDelay, 0.85));
        assert!(requires_approval(RiskLevel::ReversibleWithDelay, 0.8499));
        assert!(!requires_approval(RiskLevel::Reversible, 0.0));
    }
}
