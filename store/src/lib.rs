//! `chava-store`: the trusted persistent store (spec §6), backed by
//! `rusqlite`. Three tables exactly as specified — `chava_objects`,
//! `obligation_index`, `evidence_index` — rebuilt (delete-then-insert) for
//! an object's row inside one transaction on every `store()`.
//!
//! This is the *trusted* persistent-store variant (spec §4.6's closing
//! note): it re-derives `K_O` directly from the stored obligations rather
//! than gating through `Kms::verify_and_release_key`, matching
//! `sqlite_storage.py`'s actual — not its commented-out — `retrieve`
//! behaviour. The untrusted-consumer gated-release path lives in
//! `chava_core::store::ObligationKeyedStore`.

use std::sync::Mutex;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension};

use chava_core::evidence::EvidenceRecord;
use chava_core::obligation::Obligation;
use chava_core::object::{discharge, ChavaObject};
use chava_core::registry::VerifierRegistry;
use chava_core::value::Value;
use chava_core::{ChavaError, Kms, Result};

mod metrics;
pub use metrics::{StoreMetrics, StoreStats};

/// A persistent, SQLite-backed store of [`ChavaObject`]s.
pub struct ChavaStore {
    conn: Mutex<Connection>,
    kms: Kms,
    metrics: Mutex<StoreMetrics>,
}

impl ChavaStore {
    /// Opens (or creates) the database at `path` — pass `:memory:` for an
    /// ephemeral store — and runs the schema migration (spec §6).
    pub fn open(path: &str, kms: Kms) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn), kms, metrics: Mutex::new(StoreMetrics::default()) })
    }

    /// A snapshot of recorded store/retrieve timings (spec §6's `stats` CLI
    /// verb; supplemental feature #2 of SPEC_FULL.md).
    pub fn metrics(&self) -> StoreStats {
        self.metrics.lock().expect("metrics lock poisoned").stats()
    }

    /// Encrypts and persists `obj` under `id`, rebuilding both secondary
    /// index tables for that id in the same transaction (spec §6).
    /// `elapsed_ms` is supplied by the caller so this stays deterministic
    /// and testable, mirroring `chava-core`'s `discharge`'s explicit `now`.
    pub fn store(&self, id: &str, obj: &ChavaObject, elapsed_ms: f64) -> Result<()> {
        let key = self.kms.derive_key(&obj.obligations)?;
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

        let obligations_json = obligations_to_json(&obj.obligations);
        let evidence_json = serde_json::to_string(&obj.evidence)
            .map_err(|e| ChavaError::Cryptographic(format!("evidence serialization failed: {e}")))?;

        let mut conn = self.conn.lock().expect("connection lock poisoned");
        let tx = conn
            .transaction()
            .map_err(|e| ChavaError::Cryptographic(format!("sqlite transaction failed: {e}")))?;

        tx.execute(
            "INSERT INTO chava_objects (obj_id, value_encrypted, obligations_json, evidence_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, CURRENT_TIMESTAMP)
             ON CONFLICT(obj_id) DO UPDATE SET
                value_encrypted = excluded.value_encrypted,
                obligations_json = excluded.obligations_json,
                evidence_json = excluded.evidence_json,
                updated_at = CURRENT_TIMESTAMP",
            params![id, payload, obligations_json, evidence_json],
        )
        .map_err(|e| ChavaError::Cryptographic(format!("sqlite insert failed: {e}")))?;

        tx.execute("DELETE FROM obligation_index WHERE obj_id = ?1", params![id])
            .map_err(|e| ChavaError::Cryptographic(format!("sqlite delete failed: {e}")))?;
        for obligation in &obj.obligations {
            tx.execute(
                "INSERT INTO obligation_index (obj_id, kind, scope) VALUES (?1, ?2, ?3)",
                params![id, obligation.kind, obligation.scope.as_str()],
            )
            .map_err(|e| ChavaError::Cryptographic(format!("sqlite insert failed: {e}")))?;
        }

        tx.execute("DELETE FROM evidence_index WHERE obj_id = ?1", params![id])
            .map_err(|e| ChavaError::Cryptographic(format!("sqlite delete failed: {e}")))?;
        for record in &obj.evidence {
            tx.execute(
                "INSERT INTO evidence_index (obj_id, verifier_id, timestamp, result) VALUES (?1, ?2, ?3, ?4)",
                params![id, record.verifier_id, record.timestamp, record.result.to_string()],
            )
            .map_err(|e| ChavaError::Cryptographic(format!("sqlite insert failed: {e}")))?;
        }

        tx.commit()
            .map_err(|e| ChavaError::Cryptographic(format!("sqlite commit failed: {e}")))?;

        self.metrics.lock().expect("metrics lock poisoned").record_store_time(elapsed_ms);
        Ok(())
    }

    /// Loads and decrypts the object stored under `id`, re-deriving `K_O`
    /// directly from its stored obligations (the trusted variant — no
    /// cleared-only gate, per spec §4.6's closing note).
    pub fn retrieve(&self, id: &str, elapsed_ms: f64) -> Result<ChavaObject> {
        let row: Option<(Vec<u8>, String, String)> = {
            let conn = self.conn.lock().expect("connection lock poisoned");
            conn.query_row(
                "SELECT value_encrypted, obligations_json, evidence_json FROM chava_objects WHERE obj_id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|e| ChavaError::Cryptographic(format!("sqlite query failed: {e}")))?
        };
        let (payload, obligations_json, evidence_json) =
            row.ok_or_else(|| ChavaError::NotFound(id.to_string()))?;

        let obligations = obligations_from_json(&obligations_json)?;
        let evidence: Vec<EvidenceRecord> = serde_json::from_str(&evidence_json)
            .map_err(|e| ChavaError::Cryptographic(format!("evidence deserialization failed: {e}")))?;

        let key = self.kms.derive_key(&obligations)?;
        if payload.len() < 12 {
            return Err(ChavaError::Cryptographic("stored payload too short for a nonce".to_string()));
        }
        let (nonce_bytes, ciphertext) = payload.split_at(12);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| ChavaError::Cryptographic(format!("bad key length: {e}")))?;
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| ChavaError::Cryptographic("AEAD decryption failed: tag mismatch".to_string()))?;
        let json: serde_json::Value = serde_json::from_slice(&plaintext)
            .map_err(|e| ChavaError::Cryptographic(format!("decrypted payload is not valid JSON: {e}")))?;

        self.metrics.lock().expect("metrics lock poisoned").record_retrieve_time(elapsed_ms);
        Ok(ChavaObject::new(Value::from_json(&json), obligations, evidence))
    }

    /// All object ids currently carrying an obligation of `kind`, optionally
    /// narrowed to an exact `scope` (supplemental feature #4).
    pub fn query_by_obligation(&self, kind: &str, scope: Option<&str>) -> Result<Vec<String>> {
        let conn = self.conn.lock().expect("connection lock poisoned");
        let mut ids = Vec::new();
        let mut collect = |stmt: &mut rusqlite::Statement, params: &[&dyn rusqlite::ToSql]| -> rusqlite::Result<()> {
            let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;
            for row in rows {
                ids.push(row?);
            }
            Ok(())
        };

        let result = if let Some(scope) = scope {
            let mut stmt = conn
                .prepare("SELECT obj_id FROM obligation_index WHERE kind = ?1 AND scope = ?2")
                .map_err(|e| ChavaError::Cryptographic(format!("sqlite prepare failed: {e}")))?;
            collect(&mut stmt, params![kind, scope])
        } else {
            let mut stmt = conn
                .prepare("SELECT DISTINCT obj_id FROM obligation_index WHERE kind = ?1")
                .map_err(|e| ChavaError::Cryptographic(format!("sqlite prepare failed: {e}")))?;
            collect(&mut stmt, params![kind])
        };
        result.map_err(|e| ChavaError::Cryptographic(format!("sqlite query failed: {e}")))?;
        Ok(ids)
    }

    /// `(obj_id, timestamp, result)` rows produced by `verifier_id`,
    /// optionally bounded to `[start_time, end_time]` (supplemental feature
    /// #4), ordered by timestamp — backs the `audit` CLI verb.
    pub fn query_by_verifier(
        &self,
        verifier_id: &str,
        start_time: Option<f64>,
        end_time: Option<f64>,
    ) -> Result<Vec<(String, f64, String)>> {
        let conn = self.conn.lock().expect("connection lock poisoned");
        let (query, bind_start, bind_end) = match (start_time, end_time) {
            (Some(_), Some(_)) => (
                "SELECT obj_id, timestamp, result FROM evidence_index WHERE verifier_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3 ORDER BY timestamp",
                start_time,
                end_time,
            ),
            (Some(_), None) => (
                "SELECT obj_id, timestamp, result FROM evidence_index WHERE verifier_id = ?1 AND timestamp >= ?2 ORDER BY timestamp",
                start_time,
                None,
            ),
            (None, Some(_)) => (
                "SELECT obj_id, timestamp, result FROM evidence_index WHERE verifier_id = ?1 AND timestamp <= ?2 ORDER BY timestamp",
                end_time,
                None,
            ),
            (None, None) => (
                "SELECT obj_id, timestamp, result FROM evidence_index WHERE verifier_id = ?1 ORDER BY timestamp",
                None,
                None,
            ),
        };

        let mut stmt = conn
            .prepare(query)
            .map_err(|e| ChavaError::Cryptographic(format!("sqlite prepare failed: {e}")))?;
        let map_row = |row: &rusqlite::Row| -> rusqlite::Result<(String, f64, String)> {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        };

        let rows = match (bind_start, bind_end) {
            (Some(a), Some(b)) => stmt
                .query_map(params![verifier_id, a, b], map_row)
                .map_err(|e| ChavaError::Cryptographic(format!("sqlite query failed: {e}")))?
                .collect::<rusqlite::Result<Vec<_>>>(),
            (Some(a), None) => stmt
                .query_map(params![verifier_id, a], map_row)
                .map_err(|e| ChavaError::Cryptographic(format!("sqlite query failed: {e}")))?
                .collect::<rusqlite::Result<Vec<_>>>(),
            (None, None) => stmt
                .query_map(params![verifier_id], map_row)
                .map_err(|e| ChavaError::Cryptographic(format!("sqlite query failed: {e}")))?
                .collect::<rusqlite::Result<Vec<_>>>(),
        };
        rows.map_err(|e| ChavaError::Cryptographic(format!("sqlite row decode failed: {e}")))
    }

    /// Retrieves every id in `obj_ids`, discharges `(kind, scope="")`
    /// against it, and writes the result back — returning which ids
    /// succeeded (supplemental feature #3, `sqlite_storage.py::batch_discharge`).
    pub fn batch_discharge(
        &self,
        obj_ids: &[String],
        kind: &str,
        registry: &VerifierRegistry,
        verifier_id: &str,
        now: f64,
    ) -> std::collections::HashMap<String, bool> {
        let mut results = std::collections::HashMap::new();
        for id in obj_ids {
            let outcome = self
                .retrieve(id, 0.0)
                .and_then(|obj| discharge(&obj, kind, "", registry, verifier_id, now))
                .and_then(|discharged| self.store(id, &discharged, 0.0));
            if let Err(ref e) = outcome {
                tracing::warn!(obj_id = %id, error = %e, "batch_discharge: failed to discharge object");
            }
            results.insert(id.clone(), outcome.is_ok());
        }
        results
    }

    /// Total object count and distinct obligation-kind count, backing the
    /// `stats` CLI verb alongside [`ChavaStore::metrics`].
    pub fn counts(&self) -> Result<(u64, u64)> {
        let conn = self.conn.lock().expect("connection lock poisoned");
        let objects: u64 = conn
            .query_row("SELECT COUNT(*) FROM chava_objects", [], |row| row.get(0))
            .map_err(|e| ChavaError::Cryptographic(format!("sqlite query failed: {e}")))?;
        let kinds: u64 = conn
            .query_row("SELECT COUNT(DISTINCT kind) FROM obligation_index", [], |row| row.get(0))
            .map_err(|e| ChavaError::Cryptographic(format!("sqlite query failed: {e}")))?;
        Ok((objects, kinds))
    }

    /// Lists every stored id along with its obligation count and evidence
    /// length, for the `list` CLI verb's `--kind`/`--cleared` filtering
    /// (done by the caller, which needs the full obligation list to filter
    /// on kind).
    pub fn list_ids(&self) -> Result<Vec<(String, Vec<Obligation>, usize)>> {
        let conn = self.conn.lock().expect("connection lock poisoned");
        let mut stmt = conn
            .prepare("SELECT obj_id, obligations_json, evidence_json FROM chava_objects")
            .map_err(|e| ChavaError::Cryptographic(format!("sqlite prepare failed: {e}")))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })
            .map_err(|e| ChavaError::Cryptographic(format!("sqlite query failed: {e}")))?;

        let mut out = Vec::new();
        for row in rows {
            let (id, obligations_json, evidence_json) =
                row.map_err(|e| ChavaError::Cryptographic(format!("sqlite row decode failed: {e}")))?;
            let obligations = obligations_from_json(&obligations_json)?;
            let evidence_count = serde_json::from_str::<Vec<EvidenceRecord>>(&evidence_json)
                .map(|v| v.len())
                .unwrap_or(0);
            out.push((id, obligations, evidence_count));
        }
        Ok(out)
    }
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chava_objects (
            obj_id TEXT PRIMARY KEY,
            value_encrypted BLOB,
            obligations_json TEXT NOT NULL,
            evidence_json TEXT NOT NULL,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );
        CREATE TABLE IF NOT EXISTS obligation_index (
            obj_id TEXT,
            kind TEXT,
            scope TEXT,
            PRIMARY KEY (obj_id, kind, scope)
        );
        CREATE TABLE IF NOT EXISTS evidence_index (
            obj_id TEXT,
            verifier_id TEXT,
            timestamp REAL,
            result TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_obligation_kind ON obligation_index(kind);
        CREATE INDEX IF NOT EXISTS idx_evidence_verifier ON evidence_index(verifier_id);
        CREATE INDEX IF NOT EXISTS idx_evidence_timestamp ON evidence_index(timestamp);
        CREATE INDEX IF NOT EXISTS idx_evidence_result ON evidence_index(result);",
    )?;
    Ok(())
}

fn obligations_to_json(obligations: &[Obligation]) -> String {
    let pairs: Vec<(String, String)> = obligations
        .iter()
        .map(|o| (o.kind.clone(), o.scope.as_str().to_string()))
        .collect();
    serde_json::to_string(&pairs).expect("pairs serialize infallibly")
}

fn obligations_from_json(json: &str) -> Result<Vec<Obligation>> {
    let pairs: Vec<(String, String)> = serde_json::from_str(json)
        .map_err(|e| ChavaError::Cryptographic(format!("obligations deserialization failed: {e}")))?;
    pairs.into_iter().map(|(kind, scope)| Obligation::new(kind, scope)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chava_core::Verdict;
    use std::sync::Arc;

    fn test_store() -> ChavaStore {
        ChavaStore::open(":memory:", Kms::new(b"test_secret".to_vec())).unwrap()
    }

    #[test]
    fn store_and_retrieve_round_trips() {
        let store = test_store();
        let obj = ChavaObject::new(Value::String("hello".into()), vec![], vec![]);
        store.store("a", &obj, 1.0).unwrap();
        let back = store.retrieve("a", 1.0).unwrap();
        assert_eq!(back.value, obj.value);
    }

    #[test]
    fn missing_id_is_not_found() {
        let store = test_store();
        assert!(matches!(store.retrieve("nope", 0.0), Err(ChavaError::NotFound(_))));
    }

    #[test]
    fn query_by_obligation_returns_matching_ids() {
        let store = test_store();
        let obj = ChavaObject::new(
            Value::Null,
            vec![Obligation::new("sql_safe", "").unwrap()],
            vec![],
        );
        store.store("a", &obj, 0.0).unwrap();
        let ids = store.query_by_obligation("sql_safe", None).unwrap();
        assert_eq!(ids, vec!["a".to_string()]);
    }

    #[test]
    fn batch_discharge_updates_stored_objects() {
        let store = test_store();
        let mut registry = VerifierRegistry::new();
        registry.register("sql_safe", Arc::new(|_, _| Verdict::Accept));

        let obj = ChavaObject::new(
            Value::String("SELECT 1".into()),
            vec![Obligation::new("sql_safe", "").unwrap()],
            vec![],
        );
        store.store("a", &obj, 0.0).unwrap();

        let results = store.batch_discharge(&["a".to_string()], "sql_safe", &registry, "v1", 1.0);
        assert_eq!(results.get("a"), Some(&true));

        let back = store.retrieve("a", 0.0).unwrap();
        assert!(back.obligations.is_empty());
    }

    #[test]
    fn file_backed_store_round_trips_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chava.db");
        let path_str = path.to_str().unwrap();

        {
            let store = ChavaStore::open(path_str, Kms::new(b"file_secret".to_vec())).unwrap();
            let obj = ChavaObject::new(
                Value::String("persisted".into()),
                vec![Obligation::new("sql_safe", "").unwrap()],
                vec![],
            );
            store.store("a", &obj, 0.0).unwrap();
        }

        // Reopen against the same file with a fresh connection: the row,
        // its ciphertext, and both secondary-index tables must survive.
        let reopened = ChavaStore::open(path_str, Kms::new(b"file_secret".to_vec())).unwrap();
        let back = reopened.retrieve("a", 0.0).unwrap();
        assert_eq!(back.value, Value::String("persisted".into()));
        assert_eq!(back.obligations, vec![Obligation::new("sql_safe", "").unwrap()]);
        assert_eq!(reopened.query_by_obligation("sql_safe", None).unwrap(), vec!["a".to_string()]);
    }

    #[test]
    fn metrics_accumulate_across_operations() {
        let store = test_store();
        let obj = ChavaObject::new(Value::Null, vec![], vec![]);
        store.store("a", &obj, 3.0).unwrap();
        store.retrieve("a", 2.0).unwrap();
        let stats = store.metrics();
        assert_eq!(stats.store_ops, 1);
        assert_eq!(stats.retrieve_ops, 1);
    }
}
