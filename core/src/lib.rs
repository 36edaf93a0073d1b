//! `chava-core`: the verification-obligation-carrying data model.
//!
//! This crate owns the triple the rest of the Chava workspace builds on —
//! the scope algebra, the hash-chained evidence log, and obligation-keyed
//! cryptography — plus the verifier registry and in-memory secondary
//! indexes that sit at its edges. It performs no I/O: persistence lives in
//! `chava-store`, verifier bodies in `chava-verifiers`, the CLI in
//! `chava-cli`.

pub mod algebra;
pub mod error;
pub mod evidence;
pub mod index;
pub mod kms;
pub mod object;
pub mod obligation;
pub mod operators;
pub mod pointer;
pub mod registry;
pub mod store;
pub mod value;
pub mod wire;

pub use algebra::{merge, project, relscope};
pub use error::{ChavaError, Result};
pub use evidence::EvidenceRecord;
pub use index::{EvidenceLogIndex, HierarchicalPointerIndex, InvertedObligationIndex};
pub use kms::Kms;
pub use object::{discharge, discharge_shared, ChavaObject};
pub use obligation::{Obligation, Verdict};
pub use operators::{filter_cleared, inject_verification};
pub use pointer::{Pointer, PointerBuf};
pub use registry::{VerifierFn, VerifierRegistry};
pub use store::ObligationKeyedStore;
pub use value::Value;
