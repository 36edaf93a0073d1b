//! JSON wire/persistence format for [`ChavaObject`] (spec §6): `{"@v": ...,
//! "@o": [[kind, scope], ...], "@e": [...]}`. Evidence records serialize
//! with their natural field names (`verifier_id`, `result`, `timestamp`,
//! `prev_hash`, `kind`, `scope`, `hash`) via `EvidenceRecord`'s own `serde`
//! derive; only the outer envelope and the `(kind, scope)` pair encoding
//! need custom handling, since obligations are tuples on the wire but a
//! struct in memory.

use serde::{Deserialize, Serialize};

use crate::error::{ChavaError, Result};
use crate::evidence::EvidenceRecord;
use crate::obligation::Obligation;
use crate::object::ChavaObject;
use crate::value::Value;

#[derive(Serialize, Deserialize)]
struct WireObject {
    #[serde(rename = "@v")]
    value: serde_json::Value,
    #[serde(rename = "@o")]
    obligations: Vec<(String, String)>,
    #[serde(rename = "@e")]
    evidence: Vec<EvidenceRecord>,
}

impl ChavaObject {
    /// Serializes to the spec §6 wire format as a JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        let wire = WireObject {
            value: self.value.to_json(),
            obligations: self
                .obligations
                .iter()
                .map(|o| (o.kind.clone(), o.scope.as_str().to_string()))
                .collect(),
            evidence: self.evidence.clone(),
        };
        serde_json::to_string(&wire)
            .map_err(|e| ChavaError::MalformedObligation(format!("serialization failed: {e}")))
    }

    /// Deserializes from the spec §6 wire format, normalising inner
    /// `[kind, scope]` pairs into `Obligation`s regardless of whether the
    /// source JSON encoded them as arrays or (already) as objects.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let wire: WireObject = serde_json::from_str(s)
            .map_err(|e| ChavaError::MalformedObligation(format!("deserialization failed: {e}")))?;
        let obligations = wire
            .obligations
            .into_iter()
            .map(|(kind, scope)| Obligation::new(kind, scope))
            .collect::<Result<Vec<_>>>()?;
        Ok(ChavaObject::new(
            Value::from_json(&wire.value),
            obligations,
            wire.evidence,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obligation::Verdict;

    #[test]
    fn round_trips_value_obligations_and_evidence() {
        let record = EvidenceRecord {
            verifier_id: "v1".to_string(),
            result: Verdict::Accept,
            timestamp: 42.0,
            prev_hash: String::new(),
            hash: "deadbeef".to_string(),
            kind: Some("sql_safe".to_string()),
            scope: Some(String::new()),
        };
        let obj = ChavaObject::new(
            Value::String("SELECT 1".into()),
            vec![Obligation::new("pii_clean", "/comment").unwrap()],
            vec![record],
        );

        let json = obj.to_json_string().unwrap();
        assert!(json.contains("\"@v\""));
        assert!(json.contains("\"@o\""));
        assert!(json.contains("\"@e\""));

        let back = ChavaObject::from_json_str(&json).unwrap();
        assert_eq!(back.value, obj.value);
        assert_eq!(back.obligations, obj.obligations);
        assert_eq!(back.evidence, obj.evidence);
    }

    #[test]
    fn empty_object_round_trips() {
        let obj = ChavaObject::new(Value::Null, vec![], vec![]);
        let json = obj.to_json_string().unwrap();
        let back = ChavaObject::from_json_str(&json).unwrap();
        assert_eq!(back, obj);
    }
}
