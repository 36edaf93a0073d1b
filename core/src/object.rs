//! The core object algebra and discharge protocol (spec §4.4).

use std::sync::{Arc, Mutex};

use crate::error::{ChavaError, Result};
use crate::evidence::{self, EvidenceRecord};
use crate::obligation::{Obligation, Verdict};
use crate::pointer::Pointer;
use crate::registry::VerifierRegistry;
use crate::value::Value;

/// The maximum number of compare-and-swap attempts [`discharge_shared`]
/// makes before giving up. Chosen generously: contention on a single
/// object's evidence tail is expected to be rare and short-lived (spec §5).
const MAX_CAS_ATTEMPTS: usize = 16;

/// A value paired with its outstanding verification obligations and the
/// evidence accumulated discharging them so far (spec §3, invariants I1–I6).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChavaObject {
    /// The payload. Tree-shaped JSON value (spec §3) — `Value::Null` for
    /// probe objects constructed purely to check clearance (see
    /// [`crate::kms::Kms::verify_and_release_key`]).
    pub value: Value,
    /// The obligation multiset. Order is insertion order; duplicates are
    /// permitted per invariant I1 (a multiset, not a set).
    pub obligations: Vec<Obligation>,
    /// The append-only evidence chain.
    pub evidence: Vec<EvidenceRecord>,
}

impl ChavaObject {
    /// Builds a new object, enforcing invariant I2 via [`Obligation::new`]
    /// at the call site (obligations are already validated by then).
    pub fn new(value: Value, obligations: Vec<Obligation>, evidence: Vec<EvidenceRecord>) -> Self {
        Self { value, obligations, evidence }
    }

    /// True once there are no outstanding obligations, the evidence chain's
    /// no kind has a reject-then-accept conflict. Chain-hash verification is
    /// a KMS-release concern (spec §4.5's `verify_and_release_key`), not part
    /// of clearance itself (spec I3 / original `core.py::is_cleared`) — a
    /// `merge`d object's broken `prev_hash` seam (spec §9) must not block an
    /// otherwise-cleared `unwrap`.
    pub fn is_cleared(&self) -> bool {
        self.obligations.is_empty() && !evidence::has_conflict(&self.evidence)
    }

    /// Returns the plaintext value if the object is cleared, otherwise a
    /// [`ChavaError::ObligationViolation`] listing the outstanding kinds.
    pub fn unwrap(&self) -> Result<&Value> {
        if self.obligations.is_empty() {
            if evidence::has_conflict(&self.evidence) {
                return Err(ChavaError::ObligationViolation(vec![
                    "conflicting evidence".to_string(),
                ]));
            }
            return Ok(&self.value);
        }
        Err(ChavaError::ObligationViolation(
            self.obligations.iter().map(|o| o.kind.clone()).collect(),
        ))
    }

    /// The hash of the last evidence record, or `""` if the chain is empty.
    /// Used as the optimistic-concurrency tail stamp during [`discharge_shared`].
    pub fn tail_hash(&self) -> &str {
        self.evidence.last().map(|r| r.hash.as_str()).unwrap_or("")
    }

    fn find_obligation(&self, kind: &str, scope: &Pointer<'_>) -> Option<usize> {
        self.obligations
            .iter()
            .position(|o| o.kind == kind && o.scope.as_str() == scope.as_str())
    }
}

/// Runs one verifier against one `(kind, scope)` obligation on an owned
/// object snapshot, returning the resulting object. A no-op (clone of
/// `obj`) if the obligation isn't present — matches the original source's
/// `discharge`, which silently no-ops rather than erroring in that case.
///
/// `now` is the timestamp to stamp the new evidence record with; callers
/// own wall-clock access so this function stays deterministic and testable.
pub fn discharge(
    obj: &ChavaObject,
    kind: &str,
    scope: &str,
    registry: &VerifierRegistry,
    verifier_id: &str,
    now: f64,
) -> Result<ChavaObject> {
    let mut next = obj.clone();
    let scope_ptr = Pointer::new(scope).ok_or_else(|| {
        ChavaError::MalformedObligation(format!("scope is not a valid pointer: {scope}"))
    })?;

    let Some(idx) = next.find_obligation(kind, &scope_ptr) else {
        return Ok(next);
    };

    let verifier = registry.get(kind)?;
    let scoped_value = next.value.resolve(&scope_ptr);
    let result = verifier(scoped_value, scope);

    let prev_hash = next.tail_hash().to_string();
    let mut record = EvidenceRecord {
        verifier_id: verifier_id.to_string(),
        result,
        timestamp: now,
        prev_hash,
        hash: String::new(),
        kind: Some(kind.to_string()),
        scope: Some(scope.to_string()),
    };
    record.hash = evidence::hash(&record);
    next.evidence.push(record);

    if result.is_accept() {
        next.obligations.remove(idx);
    }

    Ok(next)
}

/// Discharges against a shared, possibly-contended object using
/// optimistic concurrency control: snapshot, compute, then compare-and-swap
/// on the evidence tail hash. Restarts the whole computation (including
/// re-running the verifier) if another writer raced ahead, up to
/// [`MAX_CAS_ATTEMPTS`] times, per spec §4.4 step 7.
pub fn discharge_shared(
    shared: &Arc<Mutex<ChavaObject>>,
    kind: &str,
    scope: &str,
    registry: &VerifierRegistry,
    verifier_id: &str,
    now: f64,
) -> Result<()> {
    for attempt in 0..MAX_CAS_ATTEMPTS {
        let snapshot = shared.lock().expect("object lock poisoned").clone();
        let expected_tail = snapshot.tail_hash().to_string();
        let candidate = discharge(&snapshot, kind, scope, registry, verifier_id, now)?;

        let mut guard = shared.lock().expect("object lock poisoned");
        if guard.tail_hash() == expected_tail {
            *guard = candidate;
            return Ok(());
        }
        tracing::debug!(attempt, "discharge CAS retry: tail hash moved under us");
    }
    Err(ChavaError::Cryptographic(
        "discharge: exceeded CAS retry budget under contention".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointer::PointerBuf;

    fn always(verdict: Verdict) -> crate::registry::VerifierFn {
        match verdict {
            Verdict::Accept => std::sync::Arc::new(|_, _| Verdict::Accept),
            Verdict::Reject => std::sync::Arc::new(|_, _| Verdict::Reject),
            Verdict::Conditional => std::sync::Arc::new(|_, _| Verdict::Conditional),
        }
    }

    #[test]
    fn discharge_removes_obligation_on_accept() {
        let mut registry = VerifierRegistry::new();
        registry.register("sql_safe", always(Verdict::Accept));

        let obj = ChavaObject::new(
            Value::String("SELECT 1".into()),
            vec![Obligation::new("sql_safe", PointerBuf::root()).unwrap()],
            vec![],
        );

        let out = discharge(&obj, "sql_safe", "", &registry, "v1", 1.0).unwrap();
        assert!(out.obligations.is_empty());
        assert!(out.is_cleared());
        assert!(out.unwrap().is_ok());
    }

    #[test]
    fn discharge_keeps_obligation_on_reject() {
        let mut registry = VerifierRegistry::new();
        registry.register("sql_safe", always(Verdict::Reject));

        let obj = ChavaObject::new(
            Value::String("DROP TABLE users".into()),
            vec![Obligation::new("sql_safe", PointerBuf::root()).unwrap()],
            vec![],
        );

        let out = discharge(&obj, "sql_safe", "", &registry, "v1", 1.0).unwrap();
        assert_eq!(out.obligations.len(), 1);
        assert!(out.unwrap().is_err());
    }

    #[test]
    fn discharge_is_noop_when_obligation_absent() {
        let registry = VerifierRegistry::new();
        let obj = ChavaObject::new(Value::Null, vec![], vec![]);
        let out = discharge(&obj, "sql_safe", "", &registry, "v1", 1.0).unwrap();
        assert_eq!(out, obj);
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let registry = VerifierRegistry::new();
        let obj = ChavaObject::new(
            Value::Null,
            vec![Obligation::new("nope", PointerBuf::root()).unwrap()],
            vec![],
        );
        let err = discharge(&obj, "nope", "", &registry, "v1", 1.0).unwrap_err();
        assert!(matches!(err, ChavaError::UnknownVerifierKind(_)));
    }
}
