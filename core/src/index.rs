//! In-memory secondary indexes over obligations and evidence (spec §4.7),
//! ported line-for-line from `indexes.py`. Single-writer/many-reader per
//! spec §5 — no internal locking; callers synchronize.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::evidence::EvidenceRecord;
use crate::obligation::Obligation;

/// `kind -> set<obj_id>`. Empty buckets are pruned on removal.
#[derive(Default)]
pub struct InvertedObligationIndex {
    index: HashMap<String, HashSet<String>>,
}

impl InvertedObligationIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes every obligation kind `obj_id` carries.
    pub fn add(&mut self, obj_id: &str, obligations: &[Obligation]) {
        for obligation in obligations {
            self.index
                .entry(obligation.kind.clone())
                .or_default()
                .insert(obj_id.to_string());
        }
    }

    /// All object ids currently carrying an obligation of `kind`.
    pub fn objects_with_kind(&self, kind: &str) -> Vec<&str> {
        self.index
            .get(kind)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Removes `obj_id` from `kind`'s bucket (scope is accepted for call-site
    /// symmetry with the obligation tuple but does not affect this index,
    /// which is keyed purely by kind). Prunes the bucket if now empty.
    pub fn remove(&mut self, obj_id: &str, kind: &str, _scope: &str) {
        if let Some(set) = self.index.get_mut(kind) {
            set.remove(obj_id);
            if set.is_empty() {
                self.index.remove(kind);
            }
        }
    }
}

#[derive(Default)]
struct TrieNode {
    children: HashMap<String, TrieNode>,
    object_ids: HashSet<String>,
}

/// A trie over JSON Pointer segments. Each node carries the set of object
/// ids whose obligations are scoped exactly at that path (the root node for
/// `""`).
#[derive(Default)]
pub struct HierarchicalPointerIndex {
    root: TrieNode,
}

fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

impl HierarchicalPointerIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes every obligation's scope for `obj_id`.
    pub fn add(&mut self, obj_id: &str, obligations: &[Obligation]) {
        for obligation in obligations {
            let scope = obligation.scope.as_str();
            if scope.is_empty() {
                self.root.object_ids.insert(obj_id.to_string());
                continue;
            }
            let mut node = &mut self.root;
            for segment in split_path(scope) {
                node = node.children.entry(segment.to_string()).or_default();
            }
            node.object_ids.insert(obj_id.to_string());
        }
    }

    /// The union of object ids stored at `path` and all of its descendants.
    /// Obligations scoped strictly *above* `path` are not included — this
    /// index answers "what lives inside this subtree", the mirror image of
    /// `project`'s ancestor-widening policy (spec §4.7).
    pub fn get_objects_at_path(&self, path: &str) -> HashSet<String> {
        let mut node = &self.root;
        for segment in split_path(path) {
            match node.children.get(segment) {
                Some(child) => node = child,
                None => return HashSet::new(),
            }
        }

        let mut result = HashSet::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            result.extend(current.object_ids.iter().cloned());
            stack.extend(current.children.values());
        }
        result
    }

    /// Removes `obj_id` from the node at `scope`, pruning any now-empty leaf
    /// nodes back up the path.
    pub fn remove(&mut self, obj_id: &str, scope: &str) {
        if scope.is_empty() {
            self.root.object_ids.remove(obj_id);
            return;
        }
        let segments = split_path(scope);
        remove_from_path(obj_id, &segments, &mut self.root);
    }
}

fn remove_from_path(obj_id: &str, segments: &[&str], node: &mut TrieNode) {
    let Some((head, rest)) = segments.split_first() else {
        node.object_ids.remove(obj_id);
        return;
    };
    if let Some(child) = node.children.get_mut(*head) {
        remove_from_path(obj_id, rest, child);
        if child.object_ids.is_empty() && child.children.is_empty() {
            node.children.remove(*head);
        }
    }
}

/// Two query views over an object's evidence: by verifier id, and
/// time-sorted for range queries (spec §4.7).
#[derive(Default)]
pub struct EvidenceLogIndex {
    by_verifier: HashMap<String, Vec<(String, EvidenceRecord)>>,
    by_time: BTreeMap<(u64, u64), (String, EvidenceRecord)>,
}

impl EvidenceLogIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes every evidence record belonging to `obj_id`.
    pub fn add(&mut self, obj_id: &str, evidence: &[EvidenceRecord]) {
        for record in evidence {
            self.by_verifier
                .entry(record.verifier_id.clone())
                .or_default()
                .push((obj_id.to_string(), record.clone()));
            let key = (record.timestamp.to_bits(), self.by_time.len() as u64);
            self.by_time.insert(key, (obj_id.to_string(), record.clone()));
        }
    }

    /// All `(obj_id, record)` pairs produced by `verifier_id`.
    pub fn query_by_verifier(&self, verifier_id: &str) -> &[(String, EvidenceRecord)] {
        self.by_verifier
            .get(verifier_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All `(obj_id, record)` pairs with `timestamp` in `[start, end]`
    /// inclusive, ordered by time. Uses the time-sorted map's natural
    /// ordering — the BTreeMap equivalent of the original's
    /// `bisect`-based range query.
    pub fn query_by_time_range(&self, start: f64, end: f64) -> Vec<(String, EvidenceRecord)> {
        self.by_time
            .range((start.to_bits(), 0)..=(end.to_bits(), u64::MAX))
            .map(|(_, v)| v.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obligation::Verdict;

    #[test]
    fn inverted_index_tracks_and_prunes() {
        let mut idx = InvertedObligationIndex::new();
        idx.add("obj1", &[Obligation::new("sql_safe", "").unwrap()]);
        assert_eq!(idx.objects_with_kind("sql_safe"), vec!["obj1"]);
        idx.remove("obj1", "sql_safe", "");
        assert!(idx.objects_with_kind("sql_safe").is_empty());
    }

    #[test]
    fn trie_returns_union_of_subtree() {
        let mut idx = HierarchicalPointerIndex::new();
        idx.add("obj1", &[Obligation::new("pii_clean", "/user/comment").unwrap()]);
        idx.add("obj2", &[Obligation::new("pii_clean", "/user").unwrap()]);

        let at_user = idx.get_objects_at_path("/user");
        assert!(at_user.contains("obj1"));
        assert!(at_user.contains("obj2"));

        let at_comment = idx.get_objects_at_path("/user/comment");
        assert!(at_comment.contains("obj1"));
        assert!(!at_comment.contains("obj2"));
    }

    #[test]
    fn trie_prunes_empty_nodes_on_remove() {
        let mut idx = HierarchicalPointerIndex::new();
        idx.add("obj1", &[Obligation::new("pii_clean", "/user/comment").unwrap()]);
        idx.remove("obj1", "/user/comment");
        assert!(idx.get_objects_at_path("/user").is_empty());
        assert!(idx.root.children.is_empty());
    }

    #[test]
    fn evidence_index_queries_by_verifier_and_time() {
        let mut idx = EvidenceLogIndex::new();
        let r1 = EvidenceRecord {
            verifier_id: "v1".to_string(),
            result: Verdict::Accept,
            timestamp: 1.0,
            prev_hash: String::new(),
            hash: "h1".to_string(),
            kind: Some("sql_safe".to_string()),
            scope: Some(String::new()),
        };
        let r2 = EvidenceRecord {
            verifier_id: "v2".to_string(),
            result: Verdict::Accept,
            timestamp: 5.0,
            prev_hash: "h1".to_string(),
            hash: "h2".to_string(),
            kind: Some("pii_clean".to_string()),
            scope: Some(String::new()),
        };
        idx.add("obj1", std::slice::from_ref(&r1));
        idx.add("obj1", std::slice::from_ref(&r2));

        assert_eq!(idx.query_by_verifier("v1").len(), 1);
        assert_eq!(idx.query_by_time_range(0.0, 2.0).len(), 1);
        assert_eq!(idx.query_by_time_range(0.0, 10.0).len(), 2);
    }
}
