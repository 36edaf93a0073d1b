//! The untrusted-consumer obligation-keyed store (spec §4.6): AEAD-encrypts
//! a value under a key derived from its current obligation multiset, and
//! only ever hands back the cleared-key `K_∅` — so a ciphertext stored under
//! a non-empty obligation set stays opaque until it has been re-stored with
//! obligations discharged to empty (spec §4.6's closing note). Grounded on
//! `kms.py::ObligationKeyedStorage`, the gated-release path the original
//! source keeps live (not the commented-out trusted shortcut — see
//! `chava-store` for that variant).

use std::collections::HashMap;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;

use crate::error::{ChavaError, Result};
use crate::evidence::EvidenceRecord;
use crate::kms::Kms;
use crate::obligation::Obligation;
use crate::object::ChavaObject;
use crate::value::Value;

struct Record {
    payload: Vec<u8>,
    obligations: Vec<Obligation>,
    evidence: Vec<EvidenceRecord>,
}

/// An in-memory, obligation-keyed encrypted store. `retrieve` only succeeds
/// once the stored object is cleared; see [`crate::kms::Kms::verify_and_release_key`].
#[derive(Default)]
pub struct ObligationKeyedStore {
    records: HashMap<String, Record>,
}

impl ObligationKeyedStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encrypts `obj.value` under `K_O = kms.derive_key(obj.obligations)`
    /// and stores `(id, N ‖ ciphertext, obligations, evidence)`, overwriting
    /// any prior record for `id`.
    pub fn store(&mut self, kms: &Kms, id: &str, obj: &ChavaObject) -> Result<()> {
        let key = kms.derive_key(&obj.obligations)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| ChavaError::Cryptographic(format!("bad key length: {e}")))?;
        let mut nonce_bytes = [0u8; 12];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let plaintext = serde_json::to_vec(&obj.value.to_json())
            .map_err(|e| ChavaError::Cryptographic(format!("value serialization failed: {e}")))?;
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|e| ChavaError::Cryptographic(format!("AEAD encryption failed: {e}")))?;

        let mut payload = nonce_bytes.to_vec();
        payload.extend(ciphertext);

        self.records.insert(
            id.to_string(),
            Record {
                payload,
                obligations: obj.obligations.clone(),
                evidence: obj.evidence.clone(),
            },
        );
        Ok(())
    }

    /// Loads the record for `id`, gates release of the decryption key
    /// through [`Kms::verify_and_release_key`] against a probe object built
    /// from the stored obligations/evidence (value unknown, per spec §4.6
    /// step 2), and decrypts only on success.
    pub fn retrieve(&self, kms: &Kms, id: &str) -> Result<ChavaObject> {
        let record = self
            .records
            .get(id)
            .ok_or_else(|| ChavaError::NotFound(id.to_string()))?;

        let probe = ChavaObject::new(Value::Null, record.obligations.clone(), record.evidence.clone());
        let key = kms.verify_and_release_key(&probe)?;

        if record.payload.len() < 12 {
            return Err(ChavaError::Cryptographic("stored payload too short for a nonce".to_string()));
        }
        let (nonce_bytes, ciphertext) = record.payload.split_at(12);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| ChavaError::Cryptographic(format!("bad key length: {e}")))?;
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| ChavaError::Cryptographic("AEAD decryption failed: tag mismatch".to_string()))?;
        let json: serde_json::Value = serde_json::from_slice(&plaintext)
            .map_err(|e| ChavaError::Cryptographic(format!("decrypted payload is not valid JSON: {e}")))?;

        Ok(ChavaObject::new(Value::from_json(&json), record.obligations.clone(), record.evidence.clone()))
    }
}
