//! Default verifier bodies for Chava obligations (`sql_safe`, `pii_clean`,
//! `schema_ok`, `gdpr_min`), ported from `verifiers.py`. Their
//! regular-expression details are deliberately kept out of `chava-core`
//! (spec §1) — this crate registers with it exactly the way any
//! third-party verifier package would.

use std::sync::{Arc, OnceLock};

use chava_core::value::Value;
use chava_core::{Verdict, VerifierRegistry};

fn dangerous_sql_patterns() -> &'static [regex::Regex] {
    static PATTERNS: OnceLock<Vec<regex::Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)\bdrop\s+table\b",
            r"(?i)\btruncate\s+\w+\b",
            r"(?i)\balter\s+table\b",
            r"(?i)\bdelete\s+from\s+\w+\b",
            r"(?i)\bupdate\s+\w+\s+set\b.*\bwhere\b\s*$",
            r"(?i)\bexec\b",
            r"(?i)\bsp_\w*\b",
            r"(?i)\binsert\s+into\s+\w+\s+values\b.*\bselect\b",
            r"';\s*",
            r"(?i);\s*drop",
            r"(?i);\s*truncate",
            r"(?i);\s*alter",
            r"(?i)\bunion\s+select\b",
        ]
        .iter()
        .map(|p| regex::Regex::new(p).expect("pattern is valid"))
        .collect()
    })
}

/// Rejects SQL text containing destructive DDL/DML or injection patterns
/// (`DROP TABLE`, stacked-query injection, `UNION SELECT`, ...).
pub fn sql_safe_verifier(value: Option<&Value>, _scope: &str) -> Verdict {
    let Some(value) = value else {
        return Verdict::Reject;
    };
    let text = value_as_text(value);
    if dangerous_sql_patterns().iter().any(|p| p.is_match(&text)) {
        Verdict::Reject
    } else {
        Verdict::Accept
    }
}

fn pii_patterns() -> &'static [regex::Regex] {
    static PATTERNS: OnceLock<Vec<regex::Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"\b\d{3}-\d{3}-\d{4}\b",
            r"\b\(\d{3}\)\s*\d{3}-\d{4}\b",
            r"\b\d{10}\b",
            r"\b[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}\b",
            r"\b\d{3}-\d{2}-\d{4}\b",
            r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b",
            r"\b\d{3}-\d{4}\b",
        ]
        .iter()
        .map(|p| regex::Regex::new(p).expect("pattern is valid"))
        .collect()
    })
}

/// Rejects text containing phone numbers, emails, SSNs, or card-number
/// shaped digit sequences.
pub fn pii_clean_verifier(value: Option<&Value>, _scope: &str) -> Verdict {
    let Some(value) = value else {
        return Verdict::Accept;
    };
    if matches!(value, Value::Null) {
        return Verdict::Accept;
    }
    let text = value_as_text(value);
    if pii_patterns().iter().any(|p| p.is_match(&text)) {
        Verdict::Reject
    } else {
        Verdict::Accept
    }
}

/// Validates that an object value has the required `id`/`name` fields with
/// the required shape (number, string) — a minimal structural schema check.
pub fn schema_ok_verifier(value: Option<&Value>, _scope: &str) -> Verdict {
    let Some(Value::Object(fields)) = value else {
        return Verdict::Reject;
    };
    let id_ok = matches!(fields.get("id"), Some(Value::Number(_)));
    let name_ok = matches!(fields.get("name"), Some(Value::String(_)));
    if id_ok && name_ok {
        Verdict::Accept
    } else {
        Verdict::Reject
    }
}

const GDPR_NON_MINIMAL_FIELDS: &[&str] = &[
    "ssn", "passport", "dob", "date_of_birth", "address", "phone", "email", "full_name",
];

/// A data-minimization check: rejects an object value that carries fields
/// beyond what a minimal-retention policy allows, or that contains PII-
/// shaped text in any field. Named in the original's ETL conflict-detection
/// scenario (`examples.py`) but never given a body there — SPEC_FULL.md
/// item #5 treats it as a supplemental verifier this crate must supply.
pub fn gdpr_min_verifier(value: Option<&Value>, _scope: &str) -> Verdict {
    let Some(value) = value else {
        return Verdict::Accept;
    };
    match value {
        Value::Object(fields) => {
            for key in fields.keys() {
                if GDPR_NON_MINIMAL_FIELDS.contains(&key.to_lowercase().as_str()) {
                    return Verdict::Reject;
                }
            }
            for nested in fields.values() {
                let text = value_as_text(nested);
                if pii_patterns().iter().any(|p| p.is_match(&text)) {
                    return Verdict::Reject;
                }
            }
            Verdict::Accept
        }
        other => {
            let text = value_as_text(other);
            if pii_patterns().iter().any(|p| p.is_match(&text)) {
                Verdict::Reject
            } else {
                Verdict::Accept
            }
        }
    }
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_json().to_string(),
    }
}

/// Builds a [`VerifierRegistry`] pre-populated with `sql_safe`, `pii_clean`,
/// `schema_ok`, and `gdpr_min`.
pub fn default_registry() -> VerifierRegistry {
    let mut registry = VerifierRegistry::new();
    registry.register("sql_safe", Arc::new(sql_safe_verifier));
    registry.register("pii_clean", Arc::new(pii_clean_verifier));
    registry.register("schema_ok", Arc::new(schema_ok_verifier));
    registry.register("gdpr_min", Arc::new(gdpr_min_verifier));
    registry
}
