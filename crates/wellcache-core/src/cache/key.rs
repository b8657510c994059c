//! User-scoped cache keys.
//!
//! Keys have the shape `<namespace>_<user_id>_<resource>`, lowercase ASCII.
//! `CacheKey` can only be built through [`CacheKey::for_user`], which refuses
//! to produce a key without a signed-in user, so one user's entries are never
//! read under another user's session.

use std::fmt;

/// Separator between the three key segments.
const SEPARATOR: char = '_';

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build the key for `resource` owned by `user_id`.
    ///
    /// Returns `None` when there is no user, or when any segment is empty
    /// after normalization. Callers must skip caching in that case.
    pub fn for_user(namespace: &str, user_id: Option<&str>, resource: &str) -> Option<Self> {
        let namespace = normalize_segment(namespace)?;
        let user = normalize_segment(user_id?)?;
        let resource = normalize_segment(resource)?;
        Some(Self(format!(
            "{namespace}{SEPARATOR}{user}{SEPARATOR}{resource}"
        )))
    }

    /// Prefix shared by every key of one user, used for purging.
    pub fn user_prefix(namespace: &str, user_id: &str) -> Option<String> {
        let namespace = normalize_segment(namespace)?;
        let user = normalize_segment(user_id)?;
        Some(format!("{namespace}{SEPARATOR}{user}{SEPARATOR}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Encode a segment so distinct inputs always give distinct outputs.
///
/// `[a-z0-9]` pass through; every other byte of the UTF-8 text, including
/// `-`, `_` and uppercase letters, becomes `-` plus two lowercase hex digits.
/// The output never contains the separator. Blank segments are refused.
fn normalize_segment(raw: &str) -> Option<String> {
    if raw.trim().is_empty() {
        return None;
    }
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        if b.is_ascii_lowercase() || b.is_ascii_digit() {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("-{:02x}", b));
        }
    }
    Some(out)
}
