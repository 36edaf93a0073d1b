//! Obligations and verification verdicts — the data model of spec §3.

use crate::error::{ChavaError, Result};
use crate::pointer::{Pointer, PointerBuf};

/// A single outstanding verification requirement: a `kind` of check that
/// must run, scoped to some sub-region of the object's value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Obligation {
    /// The verifier kind this obligation requires, e.g. `"sql_safe"`.
    pub kind: String,
    /// The region of the value this obligation covers. The root pointer
    /// (`""`) means "the whole value".
    pub scope: PointerBuf,
}

impl Obligation {
    /// Builds an obligation, enforcing invariant I2 (non-empty kind).
    pub fn new(kind: impl Into<String>, scope: impl Into<PointerBuf>) -> Result<Self> {
        let kind = kind.into();
        if kind.is_empty() {
            return Err(ChavaError::MalformedObligation(
                "obligation kind must not be empty".to_string(),
            ));
        }
        Ok(Self { kind, scope: scope.into() })
    }

    /// Borrowed view of the scope pointer.
    pub fn scope(&self) -> Pointer<'_> {
        self.scope.as_pointer()
    }
}

/// The outcome a verifier returns for a given `(value, scope)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// The obligation is satisfied; it is removed from the object.
    Accept,
    /// The obligation is not satisfied; it remains on the object.
    Reject,
    /// Provisional result; treated like `Reject` for obligation removal
    /// (spec §9 leaves any further policy to the caller).
    Conditional,
}

impl Verdict {
    /// True for [`Verdict::Accept`].
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Verdict::Accept => "accept",
            Verdict::Reject => "reject",
            Verdict::Conditional => "conditional",
        };
        write!(f, "{s}")
    }
}
