//! Relational-style operators over collections of [`ChavaObject`]s
//! (SPEC_FULL.md §2.1), grounded on `operators.py`'s `filter_cleared` and
//! `inject_verification`. Neither is part of the core algebra's invariants;
//! both are thin convenience wrappers a caller could write itself, kept here
//! because the original treats them as first-class exports.

use crate::error::Result;
use crate::object::{discharge, ChavaObject};
use crate::registry::VerifierRegistry;

/// The σ_cleared selection operator: passes through only cleared objects.
pub fn filter_cleared(objects: &[ChavaObject]) -> Vec<&ChavaObject> {
    objects.iter().filter(|o| o.is_cleared()).collect()
}

/// The V̂_k operator: runs `discharge(kind, "")` against every object that
/// currently carries an obligation of `kind`, leaving the rest untouched.
pub fn inject_verification(
    objects: &[ChavaObject],
    kind: &str,
    registry: &VerifierRegistry,
    verifier_id: &str,
    now: f64,
) -> Result<Vec<ChavaObject>> {
    objects
        .iter()
        .map(|obj| {
            let has_kind = obj.obligations.iter().any(|o| o.kind == kind);
            if has_kind {
                discharge(obj, kind, "", registry, verifier_id, now)
            } else {
                Ok(obj.clone())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obligation::{Obligation, Verdict};
    use crate::value::Value;
    use std::sync::Arc;

    fn registry_with(kind: &str, verdict: Verdict) -> VerifierRegistry {
        let mut registry = VerifierRegistry::new();
        registry.register(kind, Arc::new(move |_, _| verdict));
        registry
    }

    #[test]
    fn filter_cleared_keeps_only_cleared_objects() {
        let cleared = ChavaObject::new(Value::Null, vec![], vec![]);
        let uncleared = ChavaObject::new(
            Value::Null,
            vec![Obligation::new("sql_safe", "").unwrap()],
            vec![],
        );
        let objects = vec![cleared.clone(), uncleared];
        let result = filter_cleared(&objects);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0], &cleared);
    }

    #[test]
    fn inject_verification_only_touches_matching_kind() {
        let registry = registry_with("sql_safe", Verdict::Accept);
        let with_kind = ChavaObject::new(
            Value::Null,
            vec![Obligation::new("sql_safe", "").unwrap()],
            vec![],
        );
        let without_kind = ChavaObject::new(
            Value::Null,
            vec![Obligation::new("pii_clean", "").unwrap()],
            vec![],
        );
        let objects = vec![with_kind, without_kind.clone()];
        let result = inject_verification(&objects, "sql_safe", &registry, "v1", 1.0).unwrap();
        assert!(result[0].obligations.is_empty());
        assert_eq!(result[1], without_kind);
    }
}
