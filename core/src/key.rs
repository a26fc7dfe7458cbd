//! Nested attribute key normalization.
//!
//! Callers often write nested attributes hash-style, `parent[child[leaf]]`.
//! The wire protocol wants every bracket level opened and closed on its own,
//! `parent[child][leaf]`.

/// Rewrite a nested key into canonical bracket form.
///
/// Only keys ending in `]]` are nested; anything else, including keys that are
/// already canonical, is returned unchanged.
pub fn normalize_key(key: &str) -> String {
    if !key.ends_with("]]") {
        return key.to_string();
    }

    let mut segments = key.split(['[', ']']).filter(|s| !s.is_empty());
    let mut out = String::with_capacity(key.len());
    if let Some(head) = segments.next() {
        out.push_str(head);
    }
    for segment in segments {
        out.push('[');
        out.push_str(segment);
        out.push(']');
    }
    out
}
