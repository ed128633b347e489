//! `DuckDB`-backed store for versioned geocode records.
//!
//! One row per record version. The current-pointer invariant (exactly one
//! `is_current` row per ticket) is maintained transactionally inside
//! [`GeocodeCache::put`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use duckdb::Connection;
use locate_map_cache_models::{
    CacheStatistics, GeocodeRecord, HUMAN_REVIEW_STAGE, QualityTier, RecordQuery, ReviewPriority,
};

use crate::CacheError;

/// Column list shared by every record SELECT so row indices stay stable.
const COLUMNS: &str = "ticket_number, version, geocode_key, street, intersection, city, county, \
                       ticket_type, duration, work_type, excavator, latitude, longitude, method, \
                       approach, confidence, reasoning, error_message, quality_tier, \
                       review_priority, validation_flags, supersedes, is_current, created_at, \
                       created_by_stage, locked, lock_reason, locked_at, locked_by, metadata, \
                       processing_time_ms";

/// Versioned geocode cache.
///
/// The cache owns its connection and serializes writes through `&mut self`;
/// it is the single mutable shared resource of the pipeline core.
pub struct GeocodeCache {
    conn: Connection,
}

impl GeocodeCache {
    /// Opens (or creates) the cache database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the directory cannot be created or the
    /// connection or schema creation fails.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        create_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Opens an in-memory cache (used by tests and dry runs).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the connection or schema creation fails.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        create_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Returns the current record for a ticket, or `None` if the ticket has
    /// never been cached.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the query fails.
    pub fn current(&self, ticket_number: &str) -> Result<Option<GeocodeRecord>, CacheError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM geocode_records WHERE ticket_number = ? AND is_current"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        stmt.raw_bind_parameter(1, ticket_number)?;
        stmt.raw_execute()?;
        let mut rows = stmt.raw_query();
        match rows.next()? {
            Some(row) => Ok(Some(read_record(row)?)),
            None => Ok(None),
        }
    }

    /// Returns every version for a ticket, newest first. Empty if the
    /// ticket has never been cached.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the query fails.
    pub fn history(&self, ticket_number: &str) -> Result<Vec<GeocodeRecord>, CacheError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM geocode_records WHERE ticket_number = ? ORDER BY version DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        stmt.raw_bind_parameter(1, ticket_number)?;
        stmt.raw_execute()?;
        let mut rows = stmt.raw_query();
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(read_record(row)?);
        }
        Ok(records)
    }

    /// Writes a new record version for its ticket.
    ///
    /// Assigns `version` (prior current + 1, or 1), sets `supersedes`, and
    /// flips the prior current row's `is_current` flag in the same
    /// transaction. Stamps `created_at` and `created_by_stage`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Locked`] if the prior current record is locked
    /// and `stage_id` is not `human_review`; [`CacheError::Storage`] if the
    /// record breaks coordinate/confidence bounds; [`CacheError`] for
    /// database failures.
    pub fn put(
        &mut self,
        mut record: GeocodeRecord,
        stage_id: &str,
    ) -> Result<GeocodeRecord, CacheError> {
        check_invariants(&record)?;

        let tx = self.conn.transaction()?;

        let prior: Option<(u32, bool)> = {
            let mut stmt = tx.prepare(
                "SELECT version, locked FROM geocode_records
                 WHERE ticket_number = ? AND is_current",
            )?;
            stmt.raw_bind_parameter(1, &record.ticket_number)?;
            stmt.raw_execute()?;
            let mut rows = stmt.raw_query();
            match rows.next()? {
                Some(row) => {
                    let version: i64 = row.get(0)?;
                    let locked: bool = row.get(1)?;
                    Some((version_from_i64(version)?, locked))
                }
                None => None,
            }
        };

        if let Some((_, true)) = prior
            && stage_id != HUMAN_REVIEW_STAGE
        {
            return Err(CacheError::Locked {
                ticket_number: record.ticket_number.clone(),
            });
        }

        record.version = prior.map_or(1, |(v, _)| v + 1);
        record.supersedes = prior.map(|(v, _)| v);
        record.is_current = true;
        record.created_at = Utc::now();
        record.created_by_stage = stage_id.to_string();

        tx.execute(
            "UPDATE geocode_records SET is_current = FALSE
             WHERE ticket_number = ? AND is_current",
            duckdb::params![record.ticket_number],
        )?;

        let flags_json = serde_json::to_string(&record.validation_flags).map_err(|e| {
            CacheError::Conversion {
                message: format!("serializing validation flags: {e}"),
            }
        })?;
        let metadata_json =
            serde_json::to_string(&record.metadata).map_err(|e| CacheError::Conversion {
                message: format!("serializing metadata: {e}"),
            })?;

        tx.execute(
            "INSERT INTO geocode_records (
                ticket_number, version, geocode_key, street, intersection, city, county,
                ticket_type, duration, work_type, excavator, latitude, longitude, method,
                approach, confidence, reasoning, error_message, quality_tier, review_priority,
                validation_flags, supersedes, is_current, created_at, created_by_stage,
                locked, lock_reason, locked_at, locked_by, metadata, processing_time_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            duckdb::params![
                record.ticket_number,
                record.version,
                record.geocode_key,
                record.street,
                record.intersection,
                record.city,
                record.county,
                record.ticket_type,
                record.duration,
                record.work_type,
                record.excavator,
                record.latitude,
                record.longitude,
                record.method,
                record.approach,
                record.confidence,
                record.reasoning,
                record.error_message,
                record.quality_tier.to_string(),
                record.review_priority.to_string(),
                flags_json,
                record.supersedes,
                record.is_current,
                record.created_at.to_rfc3339(),
                record.created_by_stage,
                record.locked,
                record.lock_reason,
                record.locked_at.map(|t| t.to_rfc3339()),
                record.locked_by,
                metadata_json,
                record.processing_time_ms,
            ],
        )?;

        tx.commit()?;
        log::debug!(
            "Cached {} v{} ({}, {})",
            record.ticket_number,
            record.version,
            record.quality_tier,
            record.created_by_stage
        );
        Ok(record)
    }

    /// Locks the current record for a ticket against automated supersession.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::MissingRecord`] if the ticket has no current
    /// record, or [`CacheError`] for database failures.
    pub fn lock(&mut self, ticket_number: &str, reason: &str, actor: &str) -> Result<(), CacheError> {
        let updated = self.conn.execute(
            "UPDATE geocode_records
             SET locked = TRUE, lock_reason = ?, locked_at = ?, locked_by = ?
             WHERE ticket_number = ? AND is_current",
            duckdb::params![reason, Utc::now().to_rfc3339(), actor, ticket_number],
        )?;
        if updated == 0 {
            return Err(CacheError::MissingRecord {
                ticket_number: ticket_number.to_string(),
            });
        }
        log::info!("Locked {ticket_number}: {reason} (by {actor})");
        Ok(())
    }

    /// Clears the lock on the current record for a ticket.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::MissingRecord`] if the ticket has no current
    /// record, or [`CacheError`] for database failures.
    pub fn unlock(&mut self, ticket_number: &str) -> Result<(), CacheError> {
        let updated = self.conn.execute(
            "UPDATE geocode_records
             SET locked = FALSE, lock_reason = NULL, locked_at = NULL, locked_by = NULL
             WHERE ticket_number = ? AND is_current",
            duckdb::params![ticket_number],
        )?;
        if updated == 0 {
            return Err(CacheError::MissingRecord {
                ticket_number: ticket_number.to_string(),
            });
        }
        log::info!("Unlocked {ticket_number}");
        Ok(())
    }

    /// Returns the current records matching a filter.
    ///
    /// Criteria combine with AND; empty collections and `None` fields are
    /// not applied. Matching is restricted to current records — use
    /// [`GeocodeCache::history`] to inspect superseded versions.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the query fails.
    pub fn query(&self, filter: &RecordQuery) -> Result<Vec<GeocodeRecord>, CacheError> {
        let mut sql = format!("SELECT {COLUMNS} FROM geocode_records WHERE is_current");
        let mut params: Vec<String> = Vec::new();

        if !filter.tiers.is_empty() {
            sql.push_str(&in_clause("quality_tier", filter.tiers.len()));
            params.extend(filter.tiers.iter().map(ToString::to_string));
        }
        if !filter.priorities.is_empty() {
            sql.push_str(&in_clause("review_priority", filter.priorities.len()));
            params.extend(filter.priorities.iter().map(ToString::to_string));
        }
        if !filter.methods.is_empty() {
            sql.push_str(&in_clause("method", filter.methods.len()));
            params.extend(filter.methods.iter().cloned());
        }
        if let Some(key) = &filter.geocode_key {
            sql.push_str(" AND geocode_key = ?");
            params.push(key.clone());
        }
        if let Some(locked) = filter.locked {
            sql.push_str(if locked { " AND locked" } else { " AND NOT locked" });
        }
        if let Some(min) = filter.min_confidence {
            sql.push_str(&format!(" AND confidence >= {min}"));
        }
        sql.push_str(" ORDER BY ticket_number");

        let mut stmt = self.conn.prepare(&sql)?;
        for (i, value) in params.iter().enumerate() {
            stmt.raw_bind_parameter(i + 1, value)?;
        }
        stmt.raw_execute()?;
        let mut rows = stmt.raw_query();
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(read_record(row)?);
        }
        Ok(records)
    }

    /// Aggregate counts over the cache.
    ///
    /// Tier, priority, lock, and method counts cover current records;
    /// `total_records` counts every stored version.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if a query fails.
    pub fn statistics(&self) -> Result<CacheStatistics, CacheError> {
        let total_records: u64 = {
            let mut stmt = self.conn.prepare("SELECT COUNT(*) FROM geocode_records")?;
            stmt.raw_execute()?;
            let mut rows = stmt.raw_query();
            let row = rows.next()?.ok_or_else(|| CacheError::Conversion {
                message: "count query returned no rows".to_string(),
            })?;
            let count: i64 = row.get(0)?;
            count.unsigned_abs()
        };

        let mut stats = CacheStatistics {
            total_records,
            ..CacheStatistics::default()
        };

        for (tier_text, count) in self.grouped_counts("quality_tier")? {
            let tier: QualityTier = tier_text.parse().map_err(|_| CacheError::Conversion {
                message: format!("unknown quality tier {tier_text:?}"),
            })?;
            stats.tier_counts.insert(tier, count);
        }
        for (priority_text, count) in self.grouped_counts("review_priority")? {
            let priority: ReviewPriority =
                priority_text.parse().map_err(|_| CacheError::Conversion {
                    message: format!("unknown review priority {priority_text:?}"),
                })?;
            stats.priority_counts.insert(priority, count);
        }
        for (method, count) in self.grouped_counts("method")? {
            stats.method_counts.insert(method, count);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT COUNT(*) FROM geocode_records WHERE is_current AND locked")?;
        stmt.raw_execute()?;
        let mut rows = stmt.raw_query();
        if let Some(row) = rows.next()? {
            let count: i64 = row.get(0)?;
            stats.locked_count = count.unsigned_abs();
        }

        Ok(stats)
    }

    fn grouped_counts(&self, column: &str) -> Result<Vec<(String, u64)>, CacheError> {
        let sql = format!(
            "SELECT {column}, COUNT(*) FROM geocode_records WHERE is_current GROUP BY {column}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        stmt.raw_execute()?;
        let mut rows = stmt.raw_query();
        let mut counts = Vec::new();
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            counts.push((key, count.unsigned_abs()));
        }
        Ok(counts)
    }
}

fn create_schema(conn: &Connection) -> Result<(), CacheError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS geocode_records (
            ticket_number TEXT NOT NULL,
            version INTEGER NOT NULL,
            geocode_key TEXT NOT NULL,
            street TEXT,
            intersection TEXT,
            city TEXT,
            county TEXT,
            ticket_type TEXT,
            duration TEXT,
            work_type TEXT,
            excavator TEXT,
            latitude DOUBLE,
            longitude DOUBLE,
            method TEXT NOT NULL,
            approach TEXT,
            confidence DOUBLE,
            reasoning TEXT NOT NULL,
            error_message TEXT,
            quality_tier TEXT NOT NULL,
            review_priority TEXT NOT NULL,
            validation_flags TEXT NOT NULL,
            supersedes INTEGER,
            is_current BOOLEAN NOT NULL,
            created_at TEXT NOT NULL,
            created_by_stage TEXT NOT NULL,
            locked BOOLEAN NOT NULL DEFAULT FALSE,
            lock_reason TEXT,
            locked_at TEXT,
            locked_by TEXT,
            metadata TEXT NOT NULL,
            processing_time_ms DOUBLE NOT NULL,
            PRIMARY KEY (ticket_number, version)
        );
        CREATE INDEX IF NOT EXISTS idx_records_key ON geocode_records (geocode_key);
        CREATE INDEX IF NOT EXISTS idx_records_tier ON geocode_records (quality_tier);
        CREATE INDEX IF NOT EXISTS idx_records_priority ON geocode_records (review_priority);
        CREATE INDEX IF NOT EXISTS idx_records_locked ON geocode_records (locked);",
    )?;
    Ok(())
}

fn check_invariants(record: &GeocodeRecord) -> Result<(), CacheError> {
    if record.ticket_number.trim().is_empty() {
        return Err(CacheError::Storage {
            message: "record has no ticket number".to_string(),
        });
    }
    if record.latitude.is_some() != record.longitude.is_some() {
        return Err(CacheError::Storage {
            message: format!(
                "ticket {}: latitude and longitude must be present together",
                record.ticket_number
            ),
        });
    }
    if !record.coordinates_in_bounds() {
        return Err(CacheError::Storage {
            message: format!(
                "ticket {}: coordinates out of WGS84 bounds",
                record.ticket_number
            ),
        });
    }
    if !record.confidence_in_bounds() {
        return Err(CacheError::Storage {
            message: format!(
                "ticket {}: confidence outside [0, 1]",
                record.ticket_number
            ),
        });
    }
    Ok(())
}

fn in_clause(column: &str, len: usize) -> String {
    let placeholders = vec!["?"; len].join(", ");
    format!(" AND {column} IN ({placeholders})")
}

fn version_from_i64(value: i64) -> Result<u32, CacheError> {
    u32::try_from(value).map_err(|_| CacheError::Conversion {
        message: format!("stored version {value} out of range"),
    })
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CacheError::Conversion {
            message: format!("bad timestamp {text:?}: {e}"),
        })
}

fn read_record(row: &duckdb::Row<'_>) -> Result<GeocodeRecord, CacheError> {
    let version: i64 = row.get(1)?;
    let supersedes: Option<i64> = row.get(21)?;
    let quality_tier_text: String = row.get(18)?;
    let review_priority_text: String = row.get(19)?;
    let flags_json: String = row.get(20)?;
    let created_at_text: String = row.get(23)?;
    let locked_at_text: Option<String> = row.get(27)?;
    let metadata_json: String = row.get(29)?;

    let quality_tier: QualityTier =
        quality_tier_text
            .parse()
            .map_err(|_| CacheError::Conversion {
                message: format!("unknown quality tier {quality_tier_text:?}"),
            })?;
    let review_priority: ReviewPriority =
        review_priority_text
            .parse()
            .map_err(|_| CacheError::Conversion {
                message: format!("unknown review priority {review_priority_text:?}"),
            })?;
    let validation_flags: BTreeSet<String> =
        serde_json::from_str(&flags_json).map_err(|e| CacheError::Conversion {
            message: format!("bad validation flags: {e}"),
        })?;
    let metadata: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(&metadata_json).map_err(|e| CacheError::Conversion {
            message: format!("bad metadata: {e}"),
        })?;

    Ok(GeocodeRecord {
        ticket_number: row.get(0)?,
        version: version_from_i64(version)?,
        geocode_key: row.get(2)?,
        street: row.get(3)?,
        intersection: row.get(4)?,
        city: row.get(5)?,
        county: row.get(6)?,
        ticket_type: row.get(7)?,
        duration: row.get(8)?,
        work_type: row.get(9)?,
        excavator: row.get(10)?,
        latitude: row.get(11)?,
        longitude: row.get(12)?,
        method: row.get(13)?,
        approach: row.get(14)?,
        confidence: row.get(15)?,
        reasoning: row.get(16)?,
        error_message: row.get(17)?,
        quality_tier,
        review_priority,
        validation_flags,
        supersedes: supersedes.map(version_from_i64).transpose()?,
        is_current: row.get(22)?,
        created_at: parse_timestamp(&created_at_text)?,
        created_by_stage: row.get(24)?,
        locked: row.get(25)?,
        lock_reason: row.get(26)?,
        locked_at: locked_at_text.as_deref().map(parse_timestamp).transpose()?,
        locked_by: row.get(28)?,
        metadata,
        processing_time_ms: row.get(30)?,
    })
}
