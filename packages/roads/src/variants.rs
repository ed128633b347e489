//! Prefix-family variant generation.
//!
//! Ticket writers routinely tag a numbered route with the wrong family —
//! "SH 1788" for what the layer indexes as "FM 1788". When a canonical
//! lookup misses, the network retries the same number under the other
//! families. Variant order is deterministic: alphabetical by family.

use crate::normalize::route_parts;

/// Numbered-route families that participate in variant swapping,
/// alphabetically ordered.
pub const ROUTE_FAMILIES: &[&str] = &["CR", "FM", "SH", "US"];

/// Returns the same route number under every other family, in family
/// order. Empty for non-route names and for interstates (an "I 20" ticket
/// is never a mistagged county road).
#[must_use]
pub fn name_variants(canonical: &str) -> Vec<String> {
    let Some((family, number)) = route_parts(canonical) else {
        return Vec::new();
    };
    if !ROUTE_FAMILIES.contains(&family) {
        return Vec::new();
    }
    ROUTE_FAMILIES
        .iter()
        .filter(|f| **f != family)
        .map(|f| format!("{f} {number}"))
        .collect()
}
