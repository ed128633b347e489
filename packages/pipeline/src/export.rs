//! Results and review-queue tables.
//!
//! One row per ticket's current record. The leading column order is
//! stable (consumers and tests depend on it); the remaining record fields
//! and the flattened metadata keys follow.

use std::collections::BTreeSet;
use std::path::Path;

use locate_map_cache_models::GeocodeRecord;
use serde::Serialize;

use crate::error::PipelineError;

/// Stable leading columns of every exported table.
pub const RESULT_COLUMNS: &[&str] = &[
    "ticket_number",
    "version",
    "latitude",
    "longitude",
    "confidence",
    "quality_tier",
    "review_priority",
    "method",
    "approach",
    "validation_flags",
    "reasoning",
    "created_by_stage",
    "created_at",
    "locked",
    "processing_time_ms",
];

/// Remaining record fields, after the stable leaders.
const TRAILING_COLUMNS: &[&str] = &[
    "geocode_key",
    "street",
    "intersection",
    "city",
    "county",
    "ticket_type",
    "duration",
    "work_type",
    "excavator",
    "error_message",
    "supersedes",
    "is_current",
    "lock_reason",
    "locked_at",
    "locked_by",
];

/// Writes records as a CSV table at `path`.
///
/// # Errors
///
/// Returns [`PipelineError`] if the file cannot be written.
pub fn write_records_csv(path: &Path, records: &[GeocodeRecord]) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let metadata_keys = metadata_key_union(records);
    let mut writer = csv::Writer::from_path(path)?;

    let mut header: Vec<String> = RESULT_COLUMNS
        .iter()
        .chain(TRAILING_COLUMNS.iter())
        .map(ToString::to_string)
        .collect();
    header.extend(metadata_keys.iter().map(|k| format!("meta_{k}")));
    writer.write_record(&header)?;

    for record in records {
        writer.write_record(&record_row(record, &metadata_keys))?;
    }

    writer.flush()?;
    log::info!("Wrote {} rows to {}", records.len(), path.display());
    Ok(())
}

/// Writes any serializable value as pretty JSON at `path`.
///
/// # Errors
///
/// Returns [`PipelineError`] if serialization or the write fails.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text)?;
    Ok(())
}

/// Sorted union of metadata keys across records.
fn metadata_key_union(records: &[GeocodeRecord]) -> Vec<String> {
    let keys: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.metadata.keys().map(String::as_str))
        .collect();
    keys.into_iter().map(ToString::to_string).collect()
}

fn record_row(record: &GeocodeRecord, metadata_keys: &[String]) -> Vec<String> {
    let mut row = vec![
        record.ticket_number.clone(),
        record.version.to_string(),
        optional_f64(record.latitude),
        optional_f64(record.longitude),
        optional_f64(record.confidence),
        record.quality_tier.to_string(),
        record.review_priority.to_string(),
        record.method.clone(),
        record.approach.clone().unwrap_or_default(),
        record
            .validation_flags
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join("|"),
        record.reasoning.clone(),
        record.created_by_stage.clone(),
        record.created_at.to_rfc3339(),
        record.locked.to_string(),
        record.processing_time_ms.to_string(),
        record.geocode_key.clone(),
        record.street.clone().unwrap_or_default(),
        record.intersection.clone().unwrap_or_default(),
        record.city.clone().unwrap_or_default(),
        record.county.clone().unwrap_or_default(),
        record.ticket_type.clone().unwrap_or_default(),
        record.duration.clone().unwrap_or_default(),
        record.work_type.clone().unwrap_or_default(),
        record.excavator.clone().unwrap_or_default(),
        record.error_message.clone().unwrap_or_default(),
        record.supersedes.map(|v| v.to_string()).unwrap_or_default(),
        record.is_current.to_string(),
        record.lock_reason.clone().unwrap_or_default(),
        record
            .locked_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default(),
        record.locked_by.clone().unwrap_or_default(),
    ];

    for key in metadata_keys {
        row.push(record.metadata.get(key).map_or_else(String::new, |value| {
            value
                .as_str()
                .map_or_else(|| value.to_string(), ToString::to_string)
        }));
    }

    row
}

fn optional_f64(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use chrono::Utc;
    use locate_map_cache_models::{QualityTier, ReviewPriority};

    use super::*;

    fn record(ticket: &str) -> GeocodeRecord {
        GeocodeRecord {
            ticket_number: ticket.to_string(),
            version: 1,
            geocode_key: "key".to_string(),
            street: Some("US 385".to_string()),
            intersection: None,
            city: Some("Andrews".to_string()),
            county: None,
            ticket_type: None,
            duration: None,
            work_type: None,
            excavator: None,
            latitude: Some(32.31),
            longitude: Some(-102.54),
            method: "proximity".to_string(),
            approach: Some("corridor_midpoint".to_string()),
            confidence: Some(0.85),
            reasoning: "roads cross once".to_string(),
            error_message: None,
            quality_tier: QualityTier::Good,
            review_priority: ReviewPriority::None,
            validation_flags: BTreeSet::new(),
            supersedes: None,
            is_current: true,
            created_at: Utc::now(),
            created_by_stage: "proximity".to_string(),
            locked: false,
            lock_reason: None,
            locked_at: None,
            locked_by: None,
            metadata: BTreeMap::new(),
            processing_time_ms: 3.5,
        }
    }

    #[test]
    fn header_leads_with_the_stable_columns() {
        let dir = std::env::temp_dir().join("locate_map_export_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("results.csv");

        let mut with_meta = record("T2");
        with_meta
            .metadata
            .insert("crossing_count".to_string(), serde_json::json!(1));
        write_records_csv(&path, &[record("T1"), with_meta]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.starts_with(
            "ticket_number,version,latitude,longitude,confidence,quality_tier,review_priority,\
             method,approach,validation_flags,reasoning,created_by_stage,created_at,locked,\
             processing_time_ms"
        ));
        assert!(header.ends_with("meta_crossing_count"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn flags_join_with_pipes() {
        let mut r = record("T1");
        r.validation_flags.insert("low_confidence".to_string());
        r.validation_flags.insert("city_distance".to_string());
        let row = record_row(&r, &[]);
        assert_eq!(row[9], "city_distance|low_confidence");
    }
}
