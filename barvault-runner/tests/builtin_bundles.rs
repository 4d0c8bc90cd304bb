//! The built-in `csvdir` and `synthetic` bundles, end to end.

use barvault_core::domain::Granularity;
use barvault_core::store::IngestionCache;
use barvault_runner::{register_builtins, BundleRegistry, IngestError, IngestionCoordinator, VaultConfig};
use chrono::{NaiveDate, NaiveDateTime};
use std::fs;

fn noon(m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, m, d)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn write_csv_fixtures(dir: &std::path::Path) {
    fs::write(
        dir.join("spy.csv"),
        "date,open,high,low,close,volume\n\
         2024-01-03,470.0,472.0,469.0,471.0,1000\n\
         2024-01-02,468.0,471.0,467.5,470.0,900\n\
         2024-01-04,471.0,473.5,470.5,473.0,1100\n",
    )
    .unwrap();
    fs::write(
        dir.join("qqq.csv"),
        "date,open,high,low,close,volume\n\
         2024-01-02,400.0,402.0,399.0,401.0,800\n\
         2024-01-03,401.0,404.0,400.5,403.0,850\n",
    )
    .unwrap();
    fs::write(
        dir.join("splits.csv"),
        "symbol,effective_date,magnitude\nSPY,2024-01-03,2.0\n",
    )
    .unwrap();
    fs::write(
        dir.join("dividends.csv"),
        "symbol,effective_date,magnitude\nQQQ,2024-01-03,0.55\nGHOST,2024-01-03,1.0\n",
    )
    .unwrap();
}

#[test]
fn csvdir_ingests_bars_assets_and_adjustments() {
    let root = tempfile::tempdir().unwrap();
    let csv_dir = tempfile::tempdir().unwrap();
    write_csv_fixtures(csv_dir.path());

    let mut config = VaultConfig::with_root(root.path());
    config.set_env("CSVDIR", csv_dir.path().to_string_lossy());
    let coordinator = IngestionCoordinator::new(config);

    let mut registry = BundleRegistry::new();
    register_builtins(&mut registry);
    let bundle = registry.resolve("csvdir").unwrap();

    coordinator.ingest_at(bundle, noon(2, 1), false).unwrap();
    let data = coordinator.load("csvdir", noon(2, 1)).unwrap();

    // Sids follow sorted file-name order: QQQ=0, SPY=1.
    assert_eq!(data.assets.len(), 2);
    assert_eq!(
        data.assets
            .symbol_to_sid("QQQ", NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()),
        Some(0)
    );
    assert_eq!(
        data.assets
            .symbol_to_sid("SPY", NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()),
        Some(1)
    );

    // Rows were sorted by date before hitting the sink.
    let spy = data
        .bars
        .get_bars(1, noon(1, 1), noon(12, 31), Granularity::Daily)
        .unwrap();
    assert_eq!(spy.len(), 3);
    assert_eq!(spy[0].open, 468.0);
    assert_eq!(spy[2].close, 473.0);
    assert!(spy.windows(2).all(|w| w[0].ts < w[1].ts));

    // Adjustments landed on the right sids; the unknown symbol was skipped.
    let spy_adj = data
        .adjustments
        .adjustments_for(1, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
    assert_eq!(spy_adj.len(), 1);
    assert_eq!(spy_adj[0].magnitude, 2.0);
    assert_eq!(data.adjustments.len(), 2);

    let manifest = data.manifest().unwrap().unwrap();
    assert_eq!(manifest.asset_count, 2);
    assert_eq!(manifest.daily_sids, 2);
    assert_eq!(manifest.adjustment_count, 2);

    // Parsed-file cache entries were cleared by the successful commit.
    let cache = IngestionCache::open(coordinator.store().cache_dir("csvdir")).unwrap();
    assert!(cache.is_empty().unwrap());
}

#[test]
fn csvdir_without_environment_fails_cleanly() {
    let root = tempfile::tempdir().unwrap();
    let coordinator = IngestionCoordinator::new(VaultConfig::with_root(root.path()));

    let mut registry = BundleRegistry::new();
    register_builtins(&mut registry);
    let bundle = registry.resolve("csvdir").unwrap();

    let err = coordinator.ingest_at(bundle, noon(2, 1), false).unwrap_err();
    assert!(matches!(err, IngestError::Routine(_)));
    assert!(err.to_string().contains("CSVDIR"));
    assert!(coordinator.store().list("csvdir").unwrap().is_empty());
}

#[test]
fn synthetic_writes_consistent_granularities() {
    let root = tempfile::tempdir().unwrap();
    let mut config = VaultConfig::with_root(root.path());
    config.set_env("SYNTHETIC_SYMBOLS", "SPY");
    config.set_env("SYNTHETIC_START", "2024-01-02");
    config.set_env("SYNTHETIC_END", "2024-01-05");
    let coordinator = IngestionCoordinator::new(config);

    let mut registry = BundleRegistry::new();
    register_builtins(&mut registry);
    let bundle = registry.resolve("synthetic").unwrap();

    coordinator.ingest_at(bundle, noon(2, 1), false).unwrap();
    let data = coordinator.load("synthetic", noon(2, 1)).unwrap();

    // Four NYSE sessions (Tue–Fri), 390 minutes each.
    let minutes = data
        .bars
        .get_bars(0, noon(1, 1), noon(1, 31), Granularity::Minute)
        .unwrap();
    assert_eq!(minutes.len(), 4 * 390);
    assert!(minutes.windows(2).all(|w| w[0].ts < w[1].ts));

    let daily = data
        .bars
        .get_bars(0, noon(1, 1), noon(1, 31), Granularity::Daily)
        .unwrap();
    assert_eq!(daily.len(), 4);

    // Daily data was rolled up from the same minute walk, so the first
    // session's daily bar agrees with its minutes.
    let first_day = &daily[0];
    let first_session: Vec<_> = minutes
        .iter()
        .filter(|b| b.ts.date() == first_day.ts.date())
        .collect();
    assert_eq!(first_day.open, first_session[0].open);
    assert_eq!(first_day.close, first_session[first_session.len() - 1].close);
    assert_eq!(
        first_day.volume,
        first_session.iter().map(|b| b.volume).sum::<u64>()
    );

    // The midpoint split on sid 0 is queryable.
    let adjustments = data
        .adjustments
        .adjustments_for(0, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
    assert_eq!(adjustments.len(), 1);
    assert_eq!(adjustments[0].magnitude, 2.0);
}

#[test]
fn synthetic_is_deterministic_across_ingests() {
    let run = |root: &std::path::Path| {
        let mut config = VaultConfig::with_root(root);
        config.set_env("SYNTHETIC_SYMBOLS", "QQQ");
        config.set_env("SYNTHETIC_START", "2024-01-02");
        config.set_env("SYNTHETIC_END", "2024-01-03");
        let coordinator = IngestionCoordinator::new(config);

        let mut registry = BundleRegistry::new();
        register_builtins(&mut registry);
        let bundle = registry.resolve("synthetic").unwrap();
        coordinator.ingest_at(bundle, noon(2, 1), false).unwrap();
        coordinator
            .load("synthetic", noon(2, 1))
            .unwrap()
            .bars
            .get_bars(0, noon(1, 1), noon(1, 31), Granularity::Daily)
            .unwrap()
    };

    let a = run(tempfile::tempdir().unwrap().path());
    let b = run(tempfile::tempdir().unwrap().path());
    assert_eq!(a, b);
}
