//! Geocode fingerprint keys.
//!
//! The key is a stable content hash over the normalized location inputs of
//! a ticket. Two tickets describing the same place in different casing or
//! spacing fingerprint identically, which is what deduplication and the
//! `geocode_key` query path rely on.

use sha2::{Digest, Sha256};

/// Computes the fingerprint for a ticket's location inputs.
///
/// Insensitive to case and surrounding/internal whitespace runs. Missing
/// and blank fields hash identically. Pure: the same inputs produce the
/// same key in every process.
#[must_use]
pub fn geocode_key(
    street: Option<&str>,
    intersection: Option<&str>,
    city: Option<&str>,
    county: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    for (i, field) in [street, intersection, city, county].iter().enumerate() {
        if i > 0 {
            hasher.update([b'|']);
        }
        hasher.update(normalize_component(field.unwrap_or("")).as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Uppercases, trims, and collapses whitespace runs in one key component.
fn normalize_component(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}
