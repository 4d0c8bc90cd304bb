//! Barvault Core — versioned columnar storage for market-data bundles.
//!
//! This crate contains the storage engine:
//! - Domain types (bars, asset records, adjustments, sids)
//! - Snapshot store with atomic commit and as-of resolution
//! - Asset, bar (daily/minute), and adjustment writers and readers
//! - Crash-recoverable ingestion cache
//! - Trading calendar
//!
//! Orchestration (bundle registry, ingestion coordinator, CLI) lives in the
//! `barvault-runner` and `barvault-cli` crates.

pub mod calendar;
pub mod domain;
pub mod error;
pub mod store;

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    /// The store is handed across the CLI/coordinator boundary and cloned
    /// into readers; everything that crosses a thread must stay Send + Sync.
    #[test]
    fn storage_types_are_send_sync() {
        assert_send::<store::SnapshotStore>();
        assert_sync::<store::SnapshotStore>();
        assert_send::<store::CommittedSnapshot>();
        assert_sync::<store::CommittedSnapshot>();
        assert_send::<store::RetentionPolicy>();
        assert_sync::<store::RetentionPolicy>();
        assert_send::<store::IngestionCache>();
        assert_sync::<store::IngestionCache>();
    }

    #[test]
    fn domain_types_are_send_sync() {
        assert_send::<domain::Bar>();
        assert_sync::<domain::Bar>();
        assert_send::<domain::AssetRecord>();
        assert_sync::<domain::AssetRecord>();
        assert_send::<domain::Adjustment>();
        assert_sync::<domain::Adjustment>();
        assert_send::<calendar::TradingCalendar>();
        assert_sync::<calendar::TradingCalendar>();
    }
}
