//! The scope algebra (spec §4.1): `relscope`, `project`, `merge`.

use crate::obligation::Obligation;
use crate::object::ChavaObject;
use crate::pointer::PointerBuf;
use crate::value::Value;

/// Reanchors `scope` relative to a new root `path`.
///
/// ```text
/// relscope("/comment/text", "/comment") -> "/text"
/// relscope("/comment", "/comment")       -> ""
/// relscope("", any_path)                 -> ""
/// ```
///
/// Returns `""` whenever `scope` does not sit at or under `path` — callers
/// only invoke this once they've already established `scope` is in range
/// (see [`project`]); outside that context `""` just means "whole value".
pub fn relscope(scope: &str, path: &str) -> String {
    if scope.is_empty() {
        return String::new();
    }

    let scope = scope.trim_start_matches('/');
    let path = path.trim_start_matches('/');

    if let Some(rest) = scope.strip_prefix(path) {
        let remaining = rest.trim_start_matches('/');
        if remaining.is_empty() {
            String::new()
        } else {
            format!("/{remaining}")
        }
    } else {
        String::new()
    }
}

/// Extracts the value at `path`, carrying forward any obligations whose
/// scope overlaps the projected region (reanchored via [`relscope`]), and
/// widening obligations whose scope is an ancestor of `path` to cover the
/// whole projected value (their new scope becomes `""`).
///
/// If `path` does not resolve against `obj.value`, the result carries a
/// `null` value and an extra `("invalid_path", "")` obligation appended to
/// whatever obligations `obj` already had — spec §7's designated recovery
/// path for an unresolvable pointer, never a hard error.
pub fn project(obj: &ChavaObject, path: &str) -> ChavaObject {
    let Some(ptr) = crate::pointer::Pointer::new(path) else {
        let mut obligations = obj.obligations.clone();
        obligations.push(Obligation { kind: "invalid_path".to_string(), scope: PointerBuf::root() });
        return ChavaObject::new(Value::Null, obligations, obj.evidence.clone());
    };

    let Some(extracted) = obj.value.resolve(&ptr) else {
        let mut obligations = obj.obligations.clone();
        obligations.push(Obligation { kind: "invalid_path".to_string(), scope: PointerBuf::root() });
        return ChavaObject::new(Value::Null, obligations, obj.evidence.clone());
    };

    let mut new_obligations = Vec::new();
    for obligation in &obj.obligations {
        let scope = obligation.scope.as_str();
        let path_with_slash = format!("{path}/");
        if scope.is_empty() || scope == path || scope.starts_with(&path_with_slash) {
            let new_scope = relscope(scope, path);
            new_obligations.push(Obligation { kind: obligation.kind.clone(), scope: new_scope.into() });
        } else {
            let scope_with_slash = format!("{scope}/");
            if path.starts_with(&scope_with_slash) {
                new_obligations.push(Obligation { kind: obligation.kind.clone(), scope: PointerBuf::root() });
            }
        }
    }

    ChavaObject::new(extracted.clone(), new_obligations, obj.evidence.clone())
}

/// Merges two objects with AND-conjunction semantics: the result's value is
/// `[obj1.value, obj2.value]`, obligations are carried forward with their
/// scopes rewritten under `/0` and `/1` respectively, and evidence chains
/// are concatenated (`obj1` then `obj2`).
///
/// The concatenated evidence chain is not re-linked: `verify_chain` on the
/// result legitimately returns `false` at the `obj1`→`obj2` seam unless
/// `obj2`'s first record happens to chain from `obj1`'s last. This is a
/// known, accepted property of `merge`, not a defect (spec §9).
pub fn merge(obj1: &ChavaObject, obj2: &ChavaObject) -> ChavaObject {
    let merged_value = Value::Array(vec![obj1.value.clone(), obj2.value.clone()]);

    let mut merged_obligations = Vec::with_capacity(obj1.obligations.len() + obj2.obligations.len());
    for obligation in &obj1.obligations {
        let scope = obligation.scope.as_str();
        let new_scope = if scope.is_empty() { "/0".to_string() } else { format!("/0{scope}") };
        merged_obligations.push(Obligation { kind: obligation.kind.clone(), scope: new_scope.into() });
    }
    for obligation in &obj2.obligations {
        let scope = obligation.scope.as_str();
        let new_scope = if scope.is_empty() { "/1".to_string() } else { format!("/1{scope}") };
        merged_obligations.push(Obligation { kind: obligation.kind.clone(), scope: new_scope.into() });
    }

    let mut merged_evidence = obj1.evidence.clone();
    merged_evidence.extend(obj2.evidence.clone());

    ChavaObject::new(merged_value, merged_obligations, merged_evidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obligation::Obligation;
    use std::collections::BTreeMap;

    fn obj_with_comment() -> ChavaObject {
        let mut fields = BTreeMap::new();
        fields.insert("comment".to_string(), Value::String("hi".into()));
        fields.insert("other".to_string(), Value::String("x".into()));
        ChavaObject::new(
            Value::Object(fields),
            vec![Obligation::new("pii_clean", "/comment").unwrap()],
            vec![],
        )
    }

    #[test]
    fn relscope_examples_from_source() {
        assert_eq!(relscope("/comment/text", "/comment"), "/text");
        assert_eq!(relscope("/comment", "/comment"), "");
        assert_eq!(relscope("", "/anything"), "");
    }

    #[test]
    fn project_reanchors_scoped_obligation() {
        let obj = obj_with_comment();
        let projected = project(&obj, "/comment");
        assert_eq!(projected.value, Value::String("hi".into()));
        assert_eq!(projected.obligations.len(), 1);
        assert_eq!(projected.obligations[0].scope.as_str(), "");
    }

    #[test]
    fn project_unrelated_field_drops_obligation() {
        let obj = obj_with_comment();
        let projected = project(&obj, "/other");
        assert!(projected.obligations.is_empty());
    }

    #[test]
    fn project_missing_path_injects_invalid_path() {
        let obj = obj_with_comment();
        let projected = project(&obj, "/missing");
        assert_eq!(projected.value, Value::Null);
        assert!(projected.obligations.iter().any(|o| o.kind == "invalid_path"));
    }

    #[test]
    fn merge_rewrites_scopes_under_0_and_1() {
        let a = ChavaObject::new(
            Value::String("a".into()),
            vec![Obligation::new("sql_safe", "").unwrap()],
            vec![],
        );
        let b = ChavaObject::new(
            Value::String("b".into()),
            vec![Obligation::new("pii_clean", "/comment").unwrap()],
            vec![],
        );
        let merged = merge(&a, &b);
        assert_eq!(merged.obligations[0].scope.as_str(), "/0");
        assert_eq!(merged.obligations[1].scope.as_str(), "/1/comment");
    }
}
