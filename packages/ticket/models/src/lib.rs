#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Locate-ticket input types.
//!
//! A ticket is one 811 locate request as delivered by the (external) batch
//! loader: field names already normalized, every field optional except the
//! ticket number. The pipeline core never parses spreadsheets; it consumes
//! these records as-is.

use serde::{Deserialize, Serialize};

/// One locate request from a ticket batch.
///
/// All fields except `ticket_number` are free-text as received from the
/// one-call center; blank strings and missing values are equivalent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// External ticket identifier (e.g., "2261481570").
    pub ticket_number: String,
    /// Primary street or road named on the ticket.
    #[serde(default)]
    pub street: Option<String>,
    /// Cross street / intersecting road.
    #[serde(default)]
    pub intersection: Option<String>,
    /// City or locality.
    #[serde(default)]
    pub city: Option<String>,
    /// County.
    #[serde(default)]
    pub county: Option<String>,
    /// Ticket type (e.g., "Normal", "Emergency").
    #[serde(default)]
    pub ticket_type: Option<String>,
    /// Declared work duration (e.g., "1 DAY", "2 MONTHS").
    #[serde(default)]
    pub duration: Option<String>,
    /// Description of the planned work.
    #[serde(default)]
    pub work_type: Option<String>,
    /// Excavating company.
    #[serde(default)]
    pub excavator: Option<String>,
}

impl Ticket {
    /// Checks that the ticket can be processed at all.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTicketError`] if the ticket number is blank. Such
    /// tickets are rejected by the orchestrator without producing a cache
    /// record.
    pub fn validate(&self) -> Result<(), InvalidTicketError> {
        if self.ticket_number.trim().is_empty() {
            return Err(InvalidTicketError);
        }
        Ok(())
    }

    /// Whether this is an emergency ticket (case-insensitive match on the
    /// ticket type).
    #[must_use]
    pub fn is_emergency(&self) -> bool {
        self.ticket_type
            .as_deref()
            .is_some_and(|t| t.trim().eq_ignore_ascii_case("EMERGENCY"))
    }

    /// The street field, trimmed, or `None` when blank.
    #[must_use]
    pub fn street_text(&self) -> Option<&str> {
        non_blank(self.street.as_deref())
    }

    /// The intersection field, trimmed, or `None` when blank.
    #[must_use]
    pub fn intersection_text(&self) -> Option<&str> {
        non_blank(self.intersection.as_deref())
    }

    /// The city field, trimmed, or `None` when blank.
    #[must_use]
    pub fn city_text(&self) -> Option<&str> {
        non_blank(self.city.as_deref())
    }

    /// The county field, trimmed, or `None` when blank.
    #[must_use]
    pub fn county_text(&self) -> Option<&str> {
        non_blank(self.county.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Error returned when a ticket has no usable ticket number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTicketError;

impl std::fmt::Display for InvalidTicketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ticket has no ticket number")
    }
}

impl std::error::Error for InvalidTicketError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(number: &str) -> Ticket {
        Ticket {
            ticket_number: number.to_string(),
            ..Ticket::default()
        }
    }

    #[test]
    fn rejects_blank_ticket_number() {
        assert!(ticket("").validate().is_err());
        assert!(ticket("   ").validate().is_err());
        assert!(ticket("2261481570").validate().is_ok());
    }

    #[test]
    fn detects_emergency_case_insensitively() {
        let mut t = ticket("T1");
        t.ticket_type = Some("Emergency".to_string());
        assert!(t.is_emergency());
        t.ticket_type = Some("EMERGENCY ".to_string());
        assert!(t.is_emergency());
        t.ticket_type = Some("Normal".to_string());
        assert!(!t.is_emergency());
        t.ticket_type = None;
        assert!(!t.is_emergency());
    }

    #[test]
    fn blank_fields_read_as_missing() {
        let mut t = ticket("T1");
        t.street = Some("  ".to_string());
        t.city = Some(" Andrews ".to_string());
        assert_eq!(t.street_text(), None);
        assert_eq!(t.city_text(), Some("Andrews"));
    }
}
