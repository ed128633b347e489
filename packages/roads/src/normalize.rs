//! Road name normalization.
//!
//! Provides a deterministic canonicalization pipeline applied symmetrically
//! at index time and query time, so a ticket's "Hwy 115" finds the layer's
//! "SH 115". The pipeline:
//!
//! 1. Uppercase, trim, collapse whitespace runs
//! 2. Strip a trailing road-type word (RD, STREET, BLVD, ...)
//! 3. Canonicalize numbered-route prefixes into their family form
//!    (`SH n`, `US n`, `FM n`, `CR n`, `I n`), including glued numbers
//!    ("FM1788" → "FM 1788")

use regex::Regex;
use std::sync::LazyLock;

/// Trailing road-type words dropped from names ("FRYING PAN RANCH RD" →
/// "FRYING PAN RANCH").
static ROAD_TYPE_WORDS: &[&str] = &[
    "RD", "ROAD", "AVE", "AVENUE", "ST", "STREET", "DR", "DRIVE", "HWY", "HIGHWAY", "LN", "LANE",
    "BLVD",
];

/// State highway family: HWY/HIGHWAY/SH/TX, optionally hyphenated.
static SH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:HWY|HIGHWAY|SH|TX)[- ]?(\d+[A-Z]*)$").expect("valid regex"));

/// US highway family: US/US-/US HWY.
static US_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^US[- ]?(?:HWY[- ]?)?(\d+[A-Z]*)$").expect("valid regex"));

/// Farm-to-market family: FM/FM-/FMnn/FARM TO MARKET.
static FM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:FM[- ]?|FARM TO MARKET )(\d+[A-Z]*)$").expect("valid regex")
});

/// County road family: CR/CR-/COUNTY ROAD.
static CR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:CR[- ]?|COUNTY ROAD )(\d+[A-Z]*)$").expect("valid regex"));

/// Interstate family: I/IH/INTERSTATE.
static I_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:I|IH|INTERSTATE)[- ]?(\d+[A-Z]*)$").expect("valid regex"));

/// Canonicalizes a road name.
///
/// The result is the form the network indexes under and the form reasoning
/// strings report.
#[must_use]
pub fn normalize_name(raw: &str) -> String {
    let collapsed = raw
        .to_uppercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let stripped = strip_trailing_type_word(&collapsed);
    canonicalize_prefix(&stripped)
}

/// Drops one trailing road-type word, keeping at least one token.
fn strip_trailing_type_word(name: &str) -> String {
    let tokens: Vec<&str> = name.split(' ').collect();
    if tokens.len() >= 2
        && let Some(last) = tokens.last()
        && ROAD_TYPE_WORDS.contains(last)
    {
        return tokens[..tokens.len() - 1].join(" ");
    }
    name.to_string()
}

/// Rewrites numbered-route prefix variants into their canonical family
/// form. Names outside every family pass through unchanged.
fn canonicalize_prefix(name: &str) -> String {
    // US before SH: "US HWY 385" must not fall into the HWY pattern.
    if let Some(caps) = US_RE.captures(name) {
        return format!("US {}", &caps[1]);
    }
    if let Some(caps) = FM_RE.captures(name) {
        return format!("FM {}", &caps[1]);
    }
    if let Some(caps) = CR_RE.captures(name) {
        return format!("CR {}", &caps[1]);
    }
    if let Some(caps) = I_RE.captures(name) {
        return format!("I {}", &caps[1]);
    }
    if let Some(caps) = SH_RE.captures(name) {
        return format!("SH {}", &caps[1]);
    }
    name.to_string()
}

/// Splits a canonical numbered-route name into its family and number
/// ("FM 1788" → `("FM", "1788")`). `None` for non-route names.
#[must_use]
pub fn route_parts(canonical: &str) -> Option<(&str, &str)> {
    let (family, number) = canonical.split_once(' ')?;
    if !matches!(family, "SH" | "US" | "FM" | "CR" | "I") {
        return None;
    }
    if number.is_empty() || !number.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    if number.contains(' ') {
        return None;
    }
    Some((family, number))
}
