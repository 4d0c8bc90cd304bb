//! Ingestion coordinator: owns one ingestion run end to end.
//!
//! State machine per run: Idle → Running → {Committed, Failed}.
//! - begin() claims the bundle's pending slot (fails fast if taken)
//! - the ingest routine streams records into sinks bound to the pending
//!   snapshot, parking intermediates in the bundle's cache
//! - Ok(()) → manifest → atomic commit → cache cleared
//! - Err(_) → pending snapshot discarded, cache preserved for the retry
//!
//! There is no partial commit: a reader either sees the whole snapshot or
//! none of it.

use crate::config::VaultConfig;
use crate::error::IngestError;
use crate::registry::Bundle;
use barvault_core::calendar::TradingCalendar;
use barvault_core::store::{
    hash_snapshot_dir, AdjustmentSink, AdjustmentWriter, AssetSink, AssetWriter, BarSink,
    BarWriter, BundleData, CleanupReport, CommittedSnapshot, IngestionCache, Manifest,
    RetentionPolicy, SnapshotStore,
};
use chrono::{NaiveDateTime, Utc};
use std::collections::BTreeMap;
use tracing::{error, info};

/// Capability set handed to an ingest routine for the duration of one run.
///
/// The sinks are bound to the pending snapshot; the cache is bound to the
/// bundle and outlives the run.
pub struct IngestContext<'a> {
    pub environ: &'a BTreeMap<String, String>,
    pub assets: &'a mut dyn AssetSink,
    pub minute_bars: &'a mut dyn BarSink,
    pub daily_bars: &'a mut dyn BarSink,
    pub adjustments: &'a mut dyn AdjustmentSink,
    pub calendar: &'a TradingCalendar,
    pub cache: &'a IngestionCache,
    pub show_progress: bool,
}

/// Drives ingestion, as-of loading, and retention cleanup against one vault.
pub struct IngestionCoordinator {
    config: VaultConfig,
    store: SnapshotStore,
}

impl IngestionCoordinator {
    pub fn new(config: VaultConfig) -> Self {
        let store = SnapshotStore::new(&config.root);
        Self { config, store }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Run one ingestion with a freshly allocated snapshot timestamp.
    pub fn ingest(
        &self,
        bundle: &Bundle,
        show_progress: bool,
    ) -> Result<CommittedSnapshot, IngestError> {
        self.ingest_at(bundle, Utc::now().naive_utc(), show_progress)
    }

    /// Run one ingestion at an explicit snapshot timestamp.
    pub fn ingest_at(
        &self,
        bundle: &Bundle,
        timestamp: NaiveDateTime,
        show_progress: bool,
    ) -> Result<CommittedSnapshot, IngestError> {
        let pending = self.store.begin_at(bundle.name(), timestamp)?;
        let cache = IngestionCache::open(self.store.cache_dir(bundle.name()))?;
        info!(bundle = bundle.name(), %timestamp, "ingestion started");

        let mut assets = AssetWriter::new(pending.path());
        let mut minute_bars = BarWriter::minute(pending.path());
        let mut daily_bars = BarWriter::daily(pending.path());
        let mut adjustments = AdjustmentWriter::new(pending.path());

        let result = bundle.run(IngestContext {
            environ: &self.config.environ,
            assets: &mut assets,
            minute_bars: &mut minute_bars,
            daily_bars: &mut daily_bars,
            adjustments: &mut adjustments,
            calendar: bundle.calendar(),
            cache: &cache,
            show_progress,
        });

        match result {
            Ok(()) => {
                let manifest = Manifest {
                    bundle: bundle.name().to_string(),
                    timestamp: pending.timestamp(),
                    asset_count: assets.len(),
                    daily_sids: daily_bars.sid_count(),
                    minute_sids: minute_bars.sid_count(),
                    adjustment_count: adjustments.len(),
                    content_hash: hash_snapshot_dir(pending.path())?,
                };
                manifest.write_to(pending.path())?;

                let committed = self.store.commit(pending)?;
                // Only now, with the snapshot durable, may the cache go.
                cache.clear()?;
                info!(
                    bundle = bundle.name(),
                    timestamp = %committed.timestamp(),
                    assets = manifest.asset_count,
                    "ingestion committed"
                );
                Ok(committed)
            }
            Err(routine_err) => {
                if let Err(discard_err) = self.store.discard(pending) {
                    error!(
                        bundle = bundle.name(),
                        error = %discard_err,
                        "failed to discard pending snapshot after ingest failure"
                    );
                }
                info!(bundle = bundle.name(), "ingestion failed; cache preserved");
                Err(IngestError::Routine(routine_err))
            }
        }
    }

    /// Open the snapshot that existed as of `as_of` for downstream reads.
    pub fn load(&self, bundle_name: &str, as_of: NaiveDateTime) -> Result<BundleData, IngestError> {
        let snapshot = self.store.resolve_as_of(bundle_name, as_of)?;
        Ok(BundleData::open(&snapshot)?)
    }

    /// Apply a retention policy to a bundle's committed snapshots.
    pub fn clean(
        &self,
        bundle_name: &str,
        policy: &RetentionPolicy,
    ) -> Result<CleanupReport, IngestError> {
        Ok(self.store.cleanup(bundle_name, policy)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BundleRegistry;
    use barvault_core::domain::{AssetRecord, Bar};
    use barvault_core::error::StoreError;
    use chrono::NaiveDate;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn asset(sid: u32, symbol: &str) -> AssetRecord {
        AssetRecord {
            sid,
            symbol: symbol.to_string(),
            exchange: "TEST".to_string(),
            name: symbol.to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        }
    }

    fn daily_bar(day: u32, price: f64) -> Bar {
        Bar {
            ts: NaiveDate::from_ymd_opt(2024, 1, day)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            open: price,
            high: price + 1.0,
            low: price - 1.0,
            close: price,
            volume: 1_000,
        }
    }

    #[test]
    fn successful_run_commits_and_clears_cache() {
        let root = tempfile::tempdir().unwrap();
        let coordinator = IngestionCoordinator::new(VaultConfig::with_root(root.path()));

        let mut registry = BundleRegistry::new();
        registry.register(
            "quotes",
            TradingCalendar::nyse(),
            Box::new(|ctx: IngestContext<'_>| {
                ctx.cache.put("step/raw", b"payload")?;
                ctx.assets.write(&[asset(1, "SPY")])?;
                ctx.daily_bars
                    .write(&mut vec![(1u32, vec![daily_bar(2, 470.0), daily_bar(3, 471.0)])].into_iter())?;
                Ok(())
            }),
        );
        let bundle = registry.resolve("quotes").unwrap();

        let committed = coordinator.ingest_at(bundle, ts(1), false).unwrap();
        assert_eq!(committed.timestamp(), ts(1));

        // Snapshot is visible and complete.
        let data = coordinator.load("quotes", ts(1)).unwrap();
        assert_eq!(data.assets.len(), 1);
        let manifest = data.manifest().unwrap().unwrap();
        assert_eq!(manifest.asset_count, 1);
        assert_eq!(manifest.daily_sids, 1);
        assert_eq!(manifest.minute_sids, 0);
        assert!(!manifest.content_hash.is_empty());

        // Cache was cleared after the commit.
        let cache = IngestionCache::open(coordinator.store().cache_dir("quotes")).unwrap();
        assert_eq!(cache.get("step/raw").unwrap(), None);
    }

    #[test]
    fn failed_run_discards_snapshot_and_preserves_cache() {
        let root = tempfile::tempdir().unwrap();
        let coordinator = IngestionCoordinator::new(VaultConfig::with_root(root.path()));

        let mut registry = BundleRegistry::new();
        registry.register(
            "quotes",
            TradingCalendar::nyse(),
            Box::new(|ctx: IngestContext<'_>| {
                ctx.cache.put("fetched/spy", b"expensive")?;
                ctx.assets.write(&[asset(1, "SPY")])?;
                anyhow::bail!("provider went away mid-run")
            }),
        );
        let bundle = registry.resolve("quotes").unwrap();

        let err = coordinator.ingest_at(bundle, ts(1), false).unwrap_err();
        assert!(matches!(err, IngestError::Routine(_)));

        // No trace of the attempt in listings.
        assert!(coordinator.store().list("quotes").unwrap().is_empty());
        assert!(matches!(
            coordinator.load("quotes", ts(9)).unwrap_err(),
            IngestError::Store(StoreError::NoBundleData { .. })
        ));

        // The cache survived for the retry.
        let cache = IngestionCache::open(coordinator.store().cache_dir("quotes")).unwrap();
        assert_eq!(
            cache.get("fetched/spy").unwrap().as_deref(),
            Some(b"expensive".as_slice())
        );
    }

    #[test]
    fn sink_validation_failure_aborts_the_run() {
        let root = tempfile::tempdir().unwrap();
        let coordinator = IngestionCoordinator::new(VaultConfig::with_root(root.path()));

        let mut registry = BundleRegistry::new();
        registry.register(
            "quotes",
            TradingCalendar::nyse(),
            Box::new(|ctx: IngestContext<'_>| {
                ctx.daily_bars.write(
                    &mut vec![
                        (1u32, vec![daily_bar(2, 100.0)]),
                        (1u32, vec![daily_bar(3, 101.0)]),
                    ]
                    .into_iter(),
                )?;
                Ok(())
            }),
        );
        let bundle = registry.resolve("quotes").unwrap();

        let err = coordinator.ingest_at(bundle, ts(1), false).unwrap_err();
        assert!(matches!(
            err.as_store_error(),
            Some(StoreError::DuplicateSid { sid: 1 })
        ));
        assert!(coordinator.store().list("quotes").unwrap().is_empty());
    }
}
