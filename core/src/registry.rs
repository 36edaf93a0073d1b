//! Table-dispatch verifier registry (spec §4.3).
//!
//! Deliberately simple: a `HashMap<String, VerifierFn>`. spec §4.3 itself
//! suggests implementers may prefer a typed enum when the set of kinds is
//! closed, but leaves table-dispatch as the baseline contract; nothing here
//! needs the transitive-rule machinery a datalog engine would bring.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ChavaError, Result};
use crate::obligation::Verdict;
use crate::value::Value;

/// A verifier: given the (possibly unresolved) scoped value and the raw
/// scope string, returns a verdict. Verifiers never see the whole object,
/// only the region their obligation scopes to.
pub type VerifierFn = Arc<dyn Fn(Option<&Value>, &str) -> Verdict + Send + Sync>;

/// Maps obligation kind strings to the verifier that discharges them.
#[derive(Clone, Default)]
pub struct VerifierRegistry {
    verifiers: HashMap<String, VerifierFn>,
}

impl VerifierRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `verifier` under `kind`. Re-registering a kind overwrites
    /// the previous verifier (last-writer-wins); the original source's
    /// `VerifierRegistry.register` has the same behaviour.
    pub fn register(&mut self, kind: impl Into<String>, verifier: VerifierFn) {
        self.verifiers.insert(kind.into(), verifier);
    }

    /// Looks up the verifier for `kind`, or
    /// [`ChavaError::UnknownVerifierKind`] if nothing is registered.
    pub fn get(&self, kind: &str) -> Result<&VerifierFn> {
        self.verifiers
            .get(kind)
            .ok_or_else(|| ChavaError::UnknownVerifierKind(kind.to_string()))
    }

    /// All registered kinds, in unspecified order.
    pub fn list_kinds(&self) -> Vec<&str> {
        self.verifiers.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_kind_errors() {
        let registry = VerifierRegistry::new();
        assert!(matches!(
            registry.get("missing"),
            Err(ChavaError::UnknownVerifierKind(_))
        ));
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = VerifierRegistry::new();
        registry.register("k", Arc::new(|_, _| Verdict::Accept));
        registry.register("k", Arc::new(|_, _| Verdict::Reject));
        let verifier = registry.get("k").unwrap();
        assert_eq!(verifier(None, ""), Verdict::Reject);
    }
}
