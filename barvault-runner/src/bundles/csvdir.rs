//! `csvdir` bundle: ingest a directory of per-symbol CSV files.
//!
//! `environ["CSVDIR"]` names a directory of `{SYMBOL}.csv` files with
//! `date,open,high,low,close,volume` headers. Optional `splits.csv` and
//! `dividends.csv` (`symbol,effective_date,magnitude`) feed the adjustment
//! sink. Sids are assigned in sorted file-name order.
//!
//! Parsed files are parked in the ingestion cache keyed by
//! `csvdir/{file_name}`, so a run that dies halfway does not re-parse what
//! it already got through on retry.

use crate::coordinator::IngestContext;
use crate::registry::BundleRegistry;
use anyhow::{bail, Context, Result};
use barvault_core::calendar::TradingCalendar;
use barvault_core::domain::{AssetRecord, Bar, CorporateAction, Sid};
use barvault_core::store::{AdjustmentSink, AssetSink, BarSink};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const BUNDLE_NAME: &str = "csvdir";

const SPLITS_FILE: &str = "splits.csv";
const DIVIDENDS_FILE: &str = "dividends.csv";

pub fn register(registry: &mut BundleRegistry) {
    registry.register(BUNDLE_NAME, TradingCalendar::nyse(), Box::new(ingest_csvdir));
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CsvBarRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
}

#[derive(Debug, Deserialize)]
struct CsvActionRow {
    symbol: String,
    effective_date: NaiveDate,
    magnitude: f64,
}

fn ingest_csvdir(ctx: IngestContext<'_>) -> Result<()> {
    let Some(csv_dir) = ctx.environ.get("CSVDIR") else {
        bail!("csvdir bundle requires CSVDIR in the environment");
    };
    let csv_dir = PathBuf::from(csv_dir);

    let files = symbol_files(&csv_dir)?;
    if files.is_empty() {
        bail!("no symbol CSV files found in {}", csv_dir.display());
    }
    let total = files.len();

    // Parse (or recover from cache) every file, then write assets before bars
    // so the sid assignment is on disk first.
    let mut assets = Vec::with_capacity(total);
    let mut daily_chunks: Vec<(Sid, Vec<Bar>)> = Vec::with_capacity(total);
    for (i, (symbol, path)) in files.iter().enumerate() {
        let sid = i as Sid;
        if ctx.show_progress {
            println!("[{}/{total}] Parsing {symbol}...", i + 1);
        }

        let rows = load_rows(&ctx, path)?;
        if rows.is_empty() {
            warn!(symbol, "symbol file has no rows; skipping");
            continue;
        }

        assets.push(AssetRecord {
            sid,
            symbol: symbol.clone(),
            exchange: "CSVDIR".to_string(),
            name: symbol.clone(),
            start_date: rows[0].date,
            end_date: rows[rows.len() - 1].date,
        });
        daily_chunks.push((
            sid,
            rows.iter()
                .map(|r| Bar {
                    ts: r.date.and_hms_opt(0, 0, 0).unwrap(),
                    open: r.open,
                    high: r.high,
                    low: r.low,
                    close: r.close,
                    volume: r.volume,
                })
                .collect(),
        ));
    }

    let symbol_to_sid: HashMap<String, Sid> =
        assets.iter().map(|a| (a.symbol.clone(), a.sid)).collect();

    ctx.assets.write(&assets)?;
    ctx.daily_bars.write(&mut daily_chunks.into_iter())?;

    let splits = load_actions(&csv_dir.join(SPLITS_FILE), &symbol_to_sid)?;
    let dividends = load_actions(&csv_dir.join(DIVIDENDS_FILE), &symbol_to_sid)?;
    if splits.is_some() || dividends.is_some() {
        ctx.adjustments
            .write(splits.as_deref(), None, dividends.as_deref(), None)?;
    }

    if ctx.show_progress {
        println!("csvdir ingest done: {total} symbols");
    }
    Ok(())
}

/// `{SYMBOL}.csv` files in sorted name order, excluding the action files.
fn symbol_files(csv_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries = fs::read_dir(csv_dir)
        .with_context(|| format!("reading CSVDIR {}", csv_dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name == SPLITS_FILE || name == DIVIDENDS_FILE {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        files.push((stem.to_uppercase(), path.clone()));
    }
    files.sort();
    Ok(files)
}

/// Rows for one symbol file, sorted by date: from the cache when a previous
/// attempt already parsed this file, from disk otherwise.
fn load_rows(ctx: &IngestContext<'_>, path: &Path) -> Result<Vec<CsvBarRow>> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let cache_key = format!("csvdir/{file_name}");

    if let Some(payload) = ctx.cache.get(&cache_key)? {
        return serde_json::from_slice(&payload)
            .with_context(|| format!("corrupt cache entry '{cache_key}'"));
    }

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut rows: Vec<CsvBarRow> = Vec::new();
    for row in reader.deserialize() {
        rows.push(row.with_context(|| format!("parsing {}", path.display()))?);
    }
    rows.sort_by_key(|r| r.date);

    ctx.cache.put(&cache_key, &serde_json::to_vec(&rows)?)?;
    Ok(rows)
}

/// Corporate actions from an optional side file, resolved symbol→sid.
fn load_actions(
    path: &Path,
    symbol_to_sid: &HashMap<String, Sid>,
) -> Result<Option<Vec<CorporateAction>>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut actions = Vec::new();
    for row in reader.deserialize() {
        let row: CsvActionRow = row.with_context(|| format!("parsing {}", path.display()))?;
        let symbol = row.symbol.to_uppercase();
        match symbol_to_sid.get(&symbol) {
            Some(&sid) => actions.push(CorporateAction {
                sid,
                effective_date: row.effective_date,
                magnitude: row.magnitude,
            }),
            None => warn!(symbol, file = %path.display(), "action references unknown symbol"),
        }
    }
    Ok(Some(actions))
}
