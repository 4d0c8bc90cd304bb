//! Structured error types for the storage layer.
//!
//! Every failure a sink, source, or the snapshot store can raise lives here.
//! These are designed to be displayable as-is at the CLI boundary.

use crate::domain::Sid;
use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid asset record for sid {sid}: {reason}")]
    InvalidAssetRecord { sid: Sid, reason: String },

    #[error("non-monotonic timestamp for sid {sid}: {next} does not advance past {last}")]
    NonMonotonicTimestamp {
        sid: Sid,
        last: NaiveDateTime,
        next: NaiveDateTime,
    },

    #[error("sid {sid} appeared more than once in a single daily bar write")]
    DuplicateSid { sid: Sid },

    #[error("invalid bar for sid {sid} at {ts}: {reason}")]
    InvalidBar {
        sid: Sid,
        ts: NaiveDateTime,
        reason: String,
    },

    #[error("no data ingested for bundle '{bundle}' on or before {as_of}")]
    NoBundleData { bundle: String, as_of: NaiveDateTime },

    #[error("an ingestion is already in progress for bundle '{bundle}'")]
    IngestionInProgress { bundle: String },

    #[error(
        "snapshot timestamp {candidate} does not advance past the latest \
         committed {latest} for bundle '{bundle}' (clock went backwards?)"
    )]
    TimestampCollision {
        bundle: String,
        candidate: NaiveDateTime,
        latest: NaiveDateTime,
    },

    #[error("invalid retention policy: {0}")]
    InvalidRetentionPolicy(String),

    #[error("cannot clean bundle '{bundle}' while an ingestion is in progress")]
    CleanupBlocked { bundle: String },

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
