//! RFC 6901 JSON Pointers, used as obligation scopes throughout the crate.
//!
//! Mirrors the shape of a CRDT path type: an owned [`PointerBuf`] and a
//! borrowed [`Pointer`] view over it, with `parent`/`child`/`is_ancestor`/
//! `strip_prefix` navigation methods.

use std::borrow::Cow;
use std::fmt;

/// A borrowed RFC 6901 JSON Pointer (e.g. `/user/comment`, or `""` for the
/// document root).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pointer<'a>(&'a str);

impl<'a> Pointer<'a> {
    /// Wraps a raw pointer string. Does not validate well-formedness beyond
    /// requiring it be empty or start with `/`.
    pub fn new(s: &'a str) -> Option<Self> {
        if s.is_empty() || s.starts_with('/') {
            Some(Self(s))
        } else {
            None
        }
    }

    /// The document root pointer (`""`).
    pub fn root() -> Pointer<'static> {
        Pointer("")
    }

    /// The raw pointer string.
    pub fn as_str(&self) -> &'a str {
        self.0
    }

    /// True for the root pointer.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Unescaped path segments, in order, root-to-leaf.
    pub fn segments(&self) -> impl Iterator<Item = Cow<'a, str>> {
        let trimmed = self.0.strip_prefix('/').unwrap_or(self.0);
        trimmed
            .split('/')
            .filter(|s| !s.is_empty() || !trimmed.is_empty())
            .map(unescape)
    }

    /// Does `self` sit at or above `other` in the pointer hierarchy? The
    /// root pointer is an ancestor of everything, including itself.
    pub fn is_ancestor(&self, other: &Pointer<'_>) -> bool {
        if self.0.is_empty() {
            return true;
        }
        other.0 == self.0 || other.0.starts_with(&format!("{}/", self.0))
    }

    /// The pointer one level up, or `None` at the root.
    pub fn parent(&self) -> Option<PointerBuf> {
        if self.0.is_empty() {
            return None;
        }
        match self.0.rfind('/') {
            Some(idx) => Some(PointerBuf(self.0[..idx].to_owned())),
            None => None,
        }
    }

    /// Appends a raw (already-escaped) segment.
    pub fn child(&self, segment: &str) -> PointerBuf {
        let mut buf = self.0.to_owned();
        buf.push('/');
        buf.push_str(&escape(segment));
        PointerBuf(buf)
    }

    /// The pointer relative to `base`, i.e. `self` with the `base` prefix
    /// removed. Returns `None` if `base` is not an ancestor of `self`.
    ///
    /// This is the core of `relscope`: `relscope(scope, path) = scope.strip_prefix(path)`
    /// when `path` is an ancestor of `scope`, and an empty pointer otherwise
    /// is handled by the caller (see [`crate::algebra::relscope`]).
    pub fn strip_prefix(&self, base: &Pointer<'_>) -> Option<PointerBuf> {
        if !base.is_ancestor(self) {
            return None;
        }
        if base.0.is_empty() {
            return Some(PointerBuf(self.0.to_owned()));
        }
        Some(PointerBuf(self.0[base.0.len()..].to_owned()))
    }

    /// Owned copy of this pointer.
    pub fn to_owned(&self) -> PointerBuf {
        PointerBuf(self.0.to_owned())
    }
}

impl fmt::Debug for Pointer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pointer({:?})", self.0)
    }
}

impl fmt::Display for Pointer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An owned RFC 6901 JSON Pointer.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct PointerBuf(String);

impl PointerBuf {
    /// The document root pointer.
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Wraps a raw pointer string without validation.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Borrows this pointer.
    pub fn as_pointer(&self) -> Pointer<'_> {
        Pointer(&self.0)
    }

    /// The raw pointer string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PointerBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.as_pointer(), f)
    }
}

impl fmt::Display for PointerBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.as_pointer(), f)
    }
}

impl From<String> for PointerBuf {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PointerBuf {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn unescape(segment: &str) -> Cow<'_, str> {
    if segment.contains('~') {
        Cow::Owned(segment.replace("~1", "/").replace("~0", "~"))
    } else {
        Cow::Borrowed(segment)
    }
}
