#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Versioned geocode cache stored in `DuckDB`.
//!
//! The cache is append-only: every write inserts a new version row and
//! flips the prior version's `is_current` flag in the same transaction, so
//! exactly one version per ticket is current at all times. Locked records
//! can only be superseded by the `human_review` stage; automated stages
//! receive [`CacheError::Locked`] and treat the ticket as skipped.

pub mod key;
pub mod store;

pub use store::GeocodeCache;

use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Database query error.
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    /// Filesystem error while creating the cache location.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A write would break a storage invariant.
    #[error("Storage invariant violated: {message}")]
    Storage {
        /// Description of the violated invariant.
        message: String,
    },

    /// Attempt to supersede a locked record from an automated stage.
    #[error("Record for ticket {ticket_number} is locked")]
    Locked {
        /// Ticket whose current record is locked.
        ticket_number: String,
    },

    /// A lock/unlock was requested for a ticket with no current record.
    #[error("No current record for ticket {ticket_number}")]
    MissingRecord {
        /// Ticket with no cached record.
        ticket_number: String,
    },

    /// Stored data could not be converted back into a record.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}
