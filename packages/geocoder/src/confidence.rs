//! Metadata-driven confidence adjustments.
//!
//! Tickets carry operational context that correlates with how precisely
//! the site was described: emergency tickets name real cross streets,
//! hydro-excavation jobs are spot digs, long-duration pipeline jobs sprawl.
//! Each signal contributes an additive delta; the caller clamps the summed
//! confidence to [0, 1] once, after every adjustment.

use locate_map_ticket_models::Ticket;

/// Adjustment for emergency tickets.
const EMERGENCY_BONUS: f64 = 0.05;
/// Adjustment for one-day work.
const SHORT_DURATION_BONUS: f64 = 0.10;
/// Adjustment for multi-month work.
const LONG_DURATION_PENALTY: f64 = -0.05;
/// Adjustment for hydro-excavation work.
const HYDRO_BONUS: f64 = 0.10;
/// Adjustment for pipeline work.
const PIPELINE_WORK_PENALTY: f64 = -0.05;

/// One applied adjustment, for the record's metadata bag.
#[derive(Debug, Clone, PartialEq)]
pub struct Adjustment {
    /// What triggered it.
    pub reason: &'static str,
    /// Signed delta.
    pub delta: f64,
}

/// Computes the ticket-context adjustments.
#[must_use]
pub fn ticket_adjustments(ticket: &Ticket) -> Vec<Adjustment> {
    let mut adjustments = Vec::new();

    if ticket.is_emergency() {
        adjustments.push(Adjustment {
            reason: "emergency ticket",
            delta: EMERGENCY_BONUS,
        });
    }

    if let Some(duration) = ticket.duration.as_deref() {
        let duration = duration.trim().to_uppercase();
        if duration == "1 DAY" {
            adjustments.push(Adjustment {
                reason: "1-day duration",
                delta: SHORT_DURATION_BONUS,
            });
        } else if duration == "2 MONTHS" || duration == "6 MONTHS" {
            adjustments.push(Adjustment {
                reason: "multi-month duration",
                delta: LONG_DURATION_PENALTY,
            });
        }
    }

    if let Some(work) = ticket.work_type.as_deref() {
        let work = work.to_uppercase();
        if work.contains("HYDRO-EXCAVATION") {
            adjustments.push(Adjustment {
                reason: "hydro-excavation work",
                delta: HYDRO_BONUS,
            });
        }
        if work.contains("PIPELINE") {
            adjustments.push(Adjustment {
                reason: "pipeline work",
                delta: PIPELINE_WORK_PENALTY,
            });
        }
    }

    adjustments
}

/// Applies adjustments to a base confidence, clamping once at the end.
#[must_use]
pub fn apply(base: f64, adjustments: &[Adjustment]) -> f64 {
    let total: f64 = adjustments.iter().map(|a| a.delta).sum();
    (base + total).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket() -> Ticket {
        Ticket {
            ticket_number: "T1".to_string(),
            ..Ticket::default()
        }
    }

    #[test]
    fn emergency_earns_a_bonus() {
        let mut t = ticket();
        t.ticket_type = Some("Emergency".to_string());
        let adj = ticket_adjustments(&t);
        assert_eq!(adj.len(), 1);
        assert!((apply(0.35, &adj) - 0.40).abs() < 1e-9);
    }

    #[test]
    fn duration_cuts_both_ways() {
        let mut t = ticket();
        t.duration = Some("1 DAY".to_string());
        assert!((apply(0.70, &ticket_adjustments(&t)) - 0.80).abs() < 1e-9);

        t.duration = Some("6 MONTHS".to_string());
        assert!((apply(0.70, &ticket_adjustments(&t)) - 0.65).abs() < 1e-9);

        t.duration = Some("3 DAYS".to_string());
        assert!(ticket_adjustments(&t).is_empty());
    }

    #[test]
    fn work_type_matches_are_substring_and_case_insensitive() {
        let mut t = ticket();
        t.work_type = Some("Pothole / Hydro-Excavation".to_string());
        assert!((apply(0.70, &ticket_adjustments(&t)) - 0.80).abs() < 1e-9);

        t.work_type = Some("PIPELINE MAINTENANCE".to_string());
        assert!((apply(0.70, &ticket_adjustments(&t)) - 0.65).abs() < 1e-9);
    }

    #[test]
    fn adjustments_sum_and_clamp_once() {
        let mut t = ticket();
        t.ticket_type = Some("Emergency".to_string());
        t.duration = Some("1 DAY".to_string());
        t.work_type = Some("Hydro-excavation".to_string());
        // 0.85 + 0.05 + 0.10 + 0.10 = 1.10 → clamped to 1.0.
        assert!((apply(0.85, &ticket_adjustments(&t)) - 1.0).abs() < 1e-9);

        // Negative sums clamp at zero.
        t = ticket();
        t.duration = Some("6 MONTHS".to_string());
        t.work_type = Some("Pipeline replacement".to_string());
        assert!(apply(0.05, &ticket_adjustments(&t)).abs() < 1e-9);
    }
}
