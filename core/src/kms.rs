//! Obligation-keyed key derivation (spec §4.5).

use hmac::Hmac;
use sha2::{Digest, Sha256};

use crate::error::{ChavaError, Result};
use crate::object::ChavaObject;
use crate::obligation::Obligation;

const PBKDF2_ITERATIONS: u32 = 100_000;
const KEY_LEN: usize = 32;

/// Holds the server secret σ and derives per-object AEAD keys from it.
/// σ never leaves this type: [`Kms`]'s `Debug` impl redacts it.
pub struct Kms {
    server_secret: Vec<u8>,
}

impl Kms {
    /// Seeds the KMS with the server secret. Hosts are expected to source
    /// this from a secret store or environment variable, never a literal
    /// (see `chava-cli`'s `CHAVA_KMS_SECRET` handling).
    pub fn new(server_secret: impl Into<Vec<u8>>) -> Self {
        Self { server_secret: server_secret.into() }
    }

    /// Derives the obligation-keyed symmetric key `K_O` for the given
    /// obligation multiset: `PBKDF2-HMAC-SHA256(sigma, salt=SHA256(canonical(sorted(O))), iters=100_000, len=32)`.
    pub fn derive_key(&self, obligations: &[Obligation]) -> Result<[u8; KEY_LEN]> {
        let salt = obligation_salt(obligations);
        let mut out = [0u8; KEY_LEN];
        pbkdf2::pbkdf2::<Hmac<Sha256>>(&self.server_secret, &salt, PBKDF2_ITERATIONS, &mut out)
            .map_err(|_| ChavaError::Cryptographic("PBKDF2 output buffer size mismatch".to_string()))?;
        Ok(out)
    }

    /// Releases `K_O` only if `obj` is fully cleared (spec §4.5): no
    /// outstanding obligations, a hash-valid evidence chain, and no
    /// reject-then-accept conflict. Returns
    /// [`ChavaError::Cryptographic`] otherwise — this is the gate that
    /// makes bypassing verification cryptographically, not just logically,
    /// impossible for holders of ciphertext alone. Chain-hash verification is
    /// checked directly here rather than through `ChavaObject::is_cleared`
    /// (which spec I3 defines without it) — release is the one place spec
    /// §4.5 names all three conditions together.
    pub fn verify_and_release_key(&self, obj: &ChavaObject) -> Result<[u8; KEY_LEN]> {
        if !obj.obligations.is_empty() {
            return Err(ChavaError::Cryptographic(
                "object is not cleared: outstanding obligations".to_string(),
            ));
        }
        if !crate::evidence::verify_chain(&obj.evidence) {
            return Err(ChavaError::Cryptographic(
                "object evidence chain failed hash verification".to_string(),
            ));
        }
        if crate::evidence::has_conflict(&obj.evidence) {
            return Err(ChavaError::Cryptographic(
                "object evidence contains a reject-then-accept conflict".to_string(),
            ));
        }
        self.derive_key(&[])
    }
}

impl std::fmt::Debug for Kms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kms").field("server_secret", &"<redacted>").finish()
    }
}

/// `SHA256(canonical(sorted(obligations)))` — the salt fed into PBKDF2.
/// Obligations are serialized as `[kind, scope]` pairs through the same
/// canonical-JSON path used for evidence hashing, so two equal multisets
/// (regardless of insertion order) always salt to the same bytes.
fn obligation_salt(obligations: &[Obligation]) -> [u8; 32] {
    let mut pairs: Vec<(String, String)> = obligations
        .iter()
        .map(|o| (o.kind.clone(), o.scope.as_str().to_string()))
        .collect();
    pairs.sort();
    let canonical = serde_jcs::to_string(&pairs).expect("pairs serialize infallibly");
    Sha256::digest(canonical.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_obligations_derive_same_key() {
        let kms = Kms::new(b"secret".to_vec());
        let obligations = vec![Obligation::new("sql_safe", "").unwrap()];
        let k1 = kms.derive_key(&obligations).unwrap();
        let k2 = kms.derive_key(&obligations).unwrap();
        assert_eq!(k1, k2);
    }

    #[test]
    fn different_obligations_derive_different_keys() {
        let kms = Kms::new(b"secret".to_vec());
        let a = vec![Obligation::new("sql_safe", "").unwrap()];
        let b = vec![Obligation::new("pii_clean", "/comment").unwrap()];
        assert_ne!(kms.derive_key(&a).unwrap(), kms.derive_key(&b).unwrap());
    }

    #[test]
    fn obligation_order_does_not_affect_key() {
        let kms = Kms::new(b"secret".to_vec());
        let a = vec![
            Obligation::new("sql_safe", "").unwrap(),
            Obligation::new("pii_clean", "/comment").unwrap(),
        ];
        let b = vec![
            Obligation::new("pii_clean", "/comment").unwrap(),
            Obligation::new("sql_safe", "").unwrap(),
        ];
        assert_eq!(kms.derive_key(&a).unwrap(), kms.derive_key(&b).unwrap());
    }

    #[test]
    fn release_requires_cleared_object() {
        use crate::value::Value;
        let kms = Kms::new(b"secret".to_vec());
        let uncleared = ChavaObject::new(
            Value::Null,
            vec![Obligation::new("sql_safe", "").unwrap()],
            vec![],
        );
        assert!(kms.verify_and_release_key(&uncleared).is_err());

        let cleared = ChavaObject::new(Value::Null, vec![], vec![]);
        assert!(kms.verify_and_release_key(&cleared).is_ok());
    }
}
