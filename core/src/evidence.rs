//! The hash-chained evidence log attached to every [`crate::object::ChavaObject`]
//! (spec §4.2) and the canonical-hashing design note of spec §9.

use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::obligation::Verdict;

/// One entry in an object's evidence chain: the result of running a single
/// verifier against a single `(kind, scope)` obligation.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EvidenceRecord {
    /// Opaque identifier of the verifier/verifier version that produced
    /// this record.
    pub verifier_id: String,
    /// The verdict reached.
    pub result: Verdict,
    /// Unix timestamp (seconds, fractional) the record was appended.
    pub timestamp: f64,
    /// Hash of the previous record in the chain, or `""` for the first.
    pub prev_hash: String,
    /// `H(canonical(self))`, excluding this field itself.
    pub hash: String,
    /// The obligation kind this record discharges. Older/foreign records
    /// may omit it; `has_conflict` buckets those separately (see below).
    pub kind: Option<String>,
    /// The obligation scope this record discharges.
    pub scope: Option<String>,
}

/// The subset of fields hashed into a record's chain hash. spec §9 excludes
/// `kind`/`scope` deliberately — the chain binds verifier identity, outcome,
/// time and linkage, not what was being checked — so a future, stricter
/// hash can be swapped in here without touching the chain-walking logic.
#[derive(serde::Serialize)]
struct Canonical<'a> {
    #[serde(rename = "ver")]
    verifier_id: &'a str,
    #[serde(rename = "res")]
    result: Verdict,
    #[serde(rename = "ts")]
    timestamp: f64,
    #[serde(rename = "prev")]
    prev_hash: &'a str,
}

/// Computes the canonical JSON bytes that get hashed for a record.
pub fn canonical(record: &EvidenceRecord) -> Vec<u8> {
    let c = Canonical {
        verifier_id: &record.verifier_id,
        result: record.result,
        timestamp: record.timestamp,
        prev_hash: &record.prev_hash,
    };
    serde_jcs::to_string(&c)
        .expect("Canonical serializes infallibly")
        .into_bytes()
}

/// `H` — SHA-256 over the canonical bytes, hex-encoded.
pub fn hash(record: &EvidenceRecord) -> String {
    let digest = Sha256::digest(canonical(record));
    hex_encode(&digest)
}

/// Walks the chain checking each record's stored hash against its
/// recomputed hash, and that `prev_hash` correctly links to the previous
/// record (the first record must have `prev_hash == ""`).
pub fn verify_chain(evidence: &[EvidenceRecord]) -> bool {
    let mut expected_prev = String::new();
    for record in evidence {
        if record.prev_hash != expected_prev {
            return false;
        }
        if hash(record) != record.hash {
            return false;
        }
        expected_prev = record.hash.clone();
    }
    true
}

/// Detects a reject-then-accept conflict within any single obligation kind
/// (including the legacy bucket of records with no `kind` at all). Only a
/// `reject` establishes the conflict precondition — `conditional` results are
/// recorded in evidence but do not themselves taint a later `accept` (spec
/// §4.2 names `reject` specifically).
pub fn has_conflict(evidence: &[EvidenceRecord]) -> bool {
    let mut reject_seen: HashMap<Option<String>, bool> = HashMap::new();
    for record in evidence {
        let bucket = record.kind.clone();
        match record.result {
            Verdict::Reject => {
                reject_seen.insert(bucket, true);
            }
            Verdict::Conditional => {}
            Verdict::Accept => {
                if *reject_seen.get(&bucket).unwrap_or(&false) {
                    return true;
                }
            }
        }
    }
    false
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(verifier_id: &str, result: Verdict, ts: f64, prev: &str, kind: Option<&str>) -> EvidenceRecord {
        let mut r = EvidenceRecord {
            verifier_id: verifier_id.to_string(),
            result,
            timestamp: ts,
            prev_hash: prev.to_string(),
            hash: String::new(),
            kind: kind.map(str::to_string),
            scope: Some(String::new()),
        };
        r.hash = hash(&r);
        r
    }

    #[test]
    fn chain_verifies_when_properly_linked() {
        let r1 = record("v1", Verdict::Reject, 1.0, "", Some("sql_safe"));
        let r2 = record("v1", Verdict::Accept, 2.0, &r1.hash, Some("sql_safe"));
        assert!(verify_chain(&[r1, r2]));
    }

    #[test]
    fn chain_fails_on_broken_link() {
        let r1 = record("v1", Verdict::Reject, 1.0, "", Some("sql_safe"));
        let mut r2 = record("v1", Verdict::Accept, 2.0, &r1.hash, Some("sql_safe"));
        r2.prev_hash = "bogus".to_string();
        assert!(!verify_chain(&[r1, r2]));
    }

    #[test]
    fn detects_reject_then_accept_conflict() {
        let r1 = record("strict", Verdict::Reject, 1.0, "", Some("schema_ok"));
        let r2 = record("lenient", Verdict::Accept, 2.0, &r1.hash, Some("schema_ok"));
        assert!(has_conflict(&[r1, r2]));
    }

    #[test]
    fn accept_then_reject_is_not_a_conflict() {
        let r1 = record("v1", Verdict::Accept, 1.0, "", Some("schema_ok"));
        let r2 = record("v1", Verdict::Reject, 2.0, &r1.hash, Some("schema_ok"));
        assert!(!has_conflict(&[r1, r2]));
    }

    #[test]
    fn different_kinds_do_not_conflict() {
        let r1 = record("v1", Verdict::Reject, 1.0, "", Some("sql_safe"));
        let r2 = record("v2", Verdict::Accept, 2.0, &r1.hash, Some("pii_clean"));
        assert!(!has_conflict(&[r1, r2]));
    }
}
