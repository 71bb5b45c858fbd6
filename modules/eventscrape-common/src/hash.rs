//! Deterministic content fingerprints used for change detection.
//!
//! All hashes are SHA-256 over a newline-joined tuple of normalized fields.
//! Raw events keep the full 64-char hex digest; series use a 32-char
//! truncation; occurrence hashes use 16 chars, unique under
//! `(series_id, start, end)`.

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

/// Series hashes are truncated to this many hex chars.
pub const SERIES_HASH_LEN: usize = 32;

/// Occurrence hashes are truncated to this many hex chars.
pub const OCCURRENCE_HASH_LEN: usize = 16;

/// Trim and NFC-normalize a field before hashing. Case is preserved.
pub fn normalize_field(value: &str) -> String {
    value.trim().nfc().collect()
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Full-length content hash over an ordered field tuple. Fields are
/// normalized individually, then newline-joined; a missing optional field
/// contributes an empty segment so positions stay stable.
pub fn content_hash(fields: &[&str]) -> String {
    let joined = fields
        .iter()
        .map(|f| normalize_field(f))
        .collect::<Vec<_>>()
        .join("\n");
    sha256_hex(&joined)
}

/// Series variant: same tuple hashing, truncated to 32 hex chars.
pub fn series_content_hash(fields: &[&str]) -> String {
    let mut h = content_hash(fields);
    h.truncate(SERIES_HASH_LEN);
    h
}

/// Globally unique occurrence key: `short_hash(series_id || start || end)`.
/// `end_iso` is the empty string when the occurrence has no end.
pub fn occurrence_hash(series_id: Uuid, start_iso: &str, end_iso: &str) -> String {
    let mut h = sha256_hex(&format!("{series_id}\n{start_iso}\n{end_iso}"));
    h.truncate(OCCURRENCE_HASH_LEN);
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = content_hash(&["Concert", "Big show", "2025-02-10T19:00:00Z"]);
        let b = content_hash(&["Concert", "Big show", "2025-02-10T19:00:00Z"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn whitespace_is_normalized_case_is_not() {
        let a = content_hash(&["  Concert  ", "x"]);
        let b = content_hash(&["Concert", "x"]);
        let c = content_hash(&["concert", "x"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn field_boundaries_matter() {
        // "ab" + "c" must not collide with "a" + "bc".
        assert_ne!(content_hash(&["ab", "c"]), content_hash(&["a", "bc"]));
    }

    #[test]
    fn nfc_normalization_unifies_composed_forms() {
        // "é" precomposed vs "e" + combining acute
        let composed = "caf\u{00e9}";
        let decomposed = "cafe\u{0301}";
        assert_eq!(content_hash(&[composed]), content_hash(&[decomposed]));
    }

    #[test]
    fn series_hash_is_truncated() {
        let h = series_content_hash(&["Concert", "desc", "Venue"]);
        assert_eq!(h.len(), SERIES_HASH_LEN);
        // Truncation of the full hash, not an independent digest.
        let full = content_hash(&["Concert", "desc", "Venue"]);
        assert!(full.starts_with(&h));
    }

    #[test]
    fn occurrence_hash_distinguishes_dates() {
        let series = Uuid::new_v4();
        let a = occurrence_hash(series, "2025-03-01T11:00:00-07:00", "2025-03-01T15:00:00-07:00");
        let b = occurrence_hash(series, "2025-03-08T11:00:00-07:00", "2025-03-08T15:00:00-07:00");
        assert_ne!(a, b);
        assert_eq!(a.len(), OCCURRENCE_HASH_LEN);

        // Same inputs reproduce the same key regardless of when it's computed.
        let a2 = occurrence_hash(series, "2025-03-01T11:00:00-07:00", "2025-03-01T15:00:00-07:00");
        assert_eq!(a, a2);
    }

    #[test]
    fn occurrence_hash_distinguishes_series() {
        let start = "2025-03-01T11:00:00-07:00";
        let a = occurrence_hash(Uuid::new_v4(), start, "");
        let b = occurrence_hash(Uuid::new_v4(), start, "");
        assert_ne!(a, b);
    }
}
