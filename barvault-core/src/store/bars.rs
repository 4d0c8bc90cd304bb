//! Columnar bar store with Hive-style partitioning.
//!
//! Layout inside a snapshot:
//! - daily:  `daily_bars/sid={sid}.parquet` — one file per sid, one write
//! - minute: `minute_bars/sid={sid}/part-{n:05}.parquet` — one file per
//!   accepted chunk, so a large sid can be streamed without buffering
//!
//! Writes are atomic (write to .tmp, rename into place) and validated
//! incrementally: a chunk that fails validation is never written, and the
//! whole ingestion aborts.

use crate::domain::{Bar, Granularity, Sid};
use crate::error::StoreError;
use crate::store::BarSink;
use chrono::NaiveDateTime;
use polars::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DAILY_DIR: &str = "daily_bars";
pub const MINUTE_DIR: &str = "minute_bars";

/// Per-sid write progress: the last accepted timestamp and how many part
/// files exist.
struct SidState {
    last_ts: NaiveDateTime,
    parts: u32,
}

/// Writer bound to one granularity of one pending snapshot.
///
/// Minute sids may continue across chunks and across `write` calls as long
/// as timestamps keep strictly increasing; daily sids get exactly one chunk.
pub struct BarWriter {
    dir: PathBuf,
    granularity: Granularity,
    state: HashMap<Sid, SidState>,
}

impl BarWriter {
    pub fn daily(snapshot_dir: &Path) -> Self {
        Self {
            dir: snapshot_dir.join(DAILY_DIR),
            granularity: Granularity::Daily,
            state: HashMap::new(),
        }
    }

    pub fn minute(snapshot_dir: &Path) -> Self {
        Self {
            dir: snapshot_dir.join(MINUTE_DIR),
            granularity: Granularity::Minute,
            state: HashMap::new(),
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Number of distinct sids with at least one accepted bar.
    pub fn sid_count(&self) -> usize {
        self.state.len()
    }

    fn accept_chunk(&mut self, sid: Sid, bars: &[Bar]) -> Result<(), StoreError> {
        if bars.is_empty() {
            return Ok(());
        }

        let continuation = self.state.get(&sid);
        if self.granularity == Granularity::Daily && continuation.is_some() {
            return Err(StoreError::DuplicateSid { sid });
        }

        // Validate before anything touches disk: no partial sid data is valid.
        let mut last = continuation.map(|s| s.last_ts);
        for bar in bars {
            validate_bar(sid, bar)?;
            if let Some(prev) = last {
                if bar.ts <= prev {
                    return Err(StoreError::NonMonotonicTimestamp {
                        sid,
                        last: prev,
                        next: bar.ts,
                    });
                }
            }
            last = Some(bar.ts);
        }

        let df = bars_to_dataframe(bars)?;
        let part = continuation.map_or(0, |s| s.parts);
        let path = match self.granularity {
            Granularity::Daily => {
                fs::create_dir_all(&self.dir)?;
                self.dir.join(format!("sid={sid}.parquet"))
            }
            Granularity::Minute => {
                let sid_dir = self.dir.join(format!("sid={sid}"));
                fs::create_dir_all(&sid_dir)?;
                sid_dir.join(format!("part-{part:05}.parquet"))
            }
        };
        write_parquet_atomic(&df, &path)?;
        debug!(sid, part, rows = bars.len(), granularity = self.granularity.as_str(), "chunk written");

        self.state.insert(
            sid,
            SidState {
                last_ts: bars[bars.len() - 1].ts,
                parts: part + 1,
            },
        );
        Ok(())
    }
}

impl BarSink for BarWriter {
    /// Consume a finite, single-pass producer of `(sid, bars)` chunks.
    ///
    /// Chunks are consumed in the order produced; validation is applied as
    /// each chunk arrives, never after buffering the whole stream. An empty
    /// producer is an accepted no-op ("no data of this granularity").
    fn write(
        &mut self,
        chunks: &mut dyn Iterator<Item = (Sid, Vec<Bar>)>,
    ) -> Result<(), StoreError> {
        for (sid, bars) in chunks {
            self.accept_chunk(sid, &bars)?;
        }
        Ok(())
    }
}

fn validate_bar(sid: Sid, bar: &Bar) -> Result<(), StoreError> {
    let invalid = |reason: &str| StoreError::InvalidBar {
        sid,
        ts: bar.ts,
        reason: reason.to_string(),
    };
    let prices = [bar.open, bar.high, bar.low, bar.close];
    if prices.iter().any(|p| !p.is_finite()) {
        return Err(invalid("non-finite price"));
    }
    if prices.iter().any(|p| *p <= 0.0) {
        return Err(invalid("non-positive price"));
    }
    if bar.high < bar.low {
        return Err(invalid("high below low"));
    }
    if bar.open < bar.low || bar.open > bar.high {
        return Err(invalid("open outside [low, high]"));
    }
    if bar.close < bar.low || bar.close > bar.high {
        return Err(invalid("close outside [low, high]"));
    }
    Ok(())
}

/// Read side for both granularities of one committed snapshot.
pub struct BarReader {
    daily_dir: PathBuf,
    minute_dir: PathBuf,
}

impl BarReader {
    pub fn open(snapshot_dir: &Path) -> Self {
        Self {
            daily_dir: snapshot_dir.join(DAILY_DIR),
            minute_dir: snapshot_dir.join(MINUTE_DIR),
        }
    }

    /// Sids with data at the given granularity, ascending.
    pub fn sids(&self, granularity: Granularity) -> Result<Vec<Sid>, StoreError> {
        let dir = match granularity {
            Granularity::Daily => &self.daily_dir,
            Granularity::Minute => &self.minute_dir,
        };
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut sids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(sid) = name.to_str().and_then(parse_sid_entry) {
                sids.push(sid);
            }
        }
        sids.sort_unstable();
        Ok(sids)
    }

    /// Bars for `sid` in `[start, end]`, ordered by timestamp.
    ///
    /// A daily query against a sid that only has minute data is serviced by
    /// rolling the minute bars up on the fly; nothing is persisted.
    pub fn get_bars(
        &self,
        sid: Sid,
        start: NaiveDateTime,
        end: NaiveDateTime,
        granularity: Granularity,
    ) -> Result<Vec<Bar>, StoreError> {
        let bars = match granularity {
            Granularity::Minute => self.load_minute(sid)?.unwrap_or_default(),
            Granularity::Daily => match self.load_daily(sid)? {
                Some(bars) => bars,
                None => match self.load_minute(sid)? {
                    Some(minute) => rollup_daily(&minute),
                    None => Vec::new(),
                },
            },
        };
        Ok(bars
            .into_iter()
            .filter(|b| b.ts >= start && b.ts <= end)
            .collect())
    }

    fn load_daily(&self, sid: Sid) -> Result<Option<Vec<Bar>>, StoreError> {
        let path = self.daily_dir.join(format!("sid={sid}.parquet"));
        if !path.exists() {
            return Ok(None);
        }
        read_parquet_bars(&path).map(Some)
    }

    fn load_minute(&self, sid: Sid) -> Result<Option<Vec<Bar>>, StoreError> {
        let sid_dir = self.minute_dir.join(format!("sid={sid}"));
        if !sid_dir.exists() {
            return Ok(None);
        }

        let mut parts: Vec<PathBuf> = fs::read_dir(&sid_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("parquet"))
            .collect();
        // Part names are zero-padded, so name order is write order.
        parts.sort();

        let mut bars = Vec::new();
        for part in &parts {
            bars.extend(read_parquet_bars(part)?);
        }
        Ok(Some(bars))
    }
}

/// Collapse minute bars (sorted ascending) into one bar per calendar day:
/// open = first, close = last, high/low = extrema, volume = sum.
pub fn rollup_daily(minute_bars: &[Bar]) -> Vec<Bar> {
    let mut days: Vec<Bar> = Vec::new();
    for bar in minute_bars {
        let date = bar.ts.date();
        if let Some(day) = days.last_mut().filter(|d| d.ts.date() == date) {
            day.high = day.high.max(bar.high);
            day.low = day.low.min(bar.low);
            day.close = bar.close;
            day.volume += bar.volume;
        } else {
            days.push(Bar {
                ts: date.and_hms_opt(0, 0, 0).unwrap(),
                ..*bar
            });
        }
    }
    days
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn bars_to_dataframe(bars: &[Bar]) -> Result<DataFrame, StoreError> {
    let ts: Vec<i64> = bars
        .iter()
        .map(|b| b.ts.and_utc().timestamp_millis())
        .collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<u64> = bars.iter().map(|b| b.volume).collect();

    DataFrame::new(vec![
        Column::new("ts".into(), ts)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map_err(|e| StoreError::ParquetError(format!("ts cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| StoreError::ParquetError(format!("dataframe creation: {e}")))
}

fn dataframe_to_bars(df: &DataFrame) -> Result<Vec<Bar>, StoreError> {
    let col = |name: &str| {
        df.column(name)
            .map_err(|e| StoreError::ParquetError(format!("missing column '{name}': {e}")))
    };
    let ts_ca = col("ts")?
        .datetime()
        .map_err(|e| StoreError::ParquetError(format!("ts column type: {e}")))?;
    let open_ca = col("open")?
        .f64()
        .map_err(|e| StoreError::ParquetError(format!("open column type: {e}")))?;
    let high_ca = col("high")?
        .f64()
        .map_err(|e| StoreError::ParquetError(format!("high column type: {e}")))?;
    let low_ca = col("low")?
        .f64()
        .map_err(|e| StoreError::ParquetError(format!("low column type: {e}")))?;
    let close_ca = col("close")?
        .f64()
        .map_err(|e| StoreError::ParquetError(format!("close column type: {e}")))?;
    let vol_ca = col("volume")?
        .u64()
        .map_err(|e| StoreError::ParquetError(format!("volume column type: {e}")))?;

    let n = df.height();
    let mut bars = Vec::with_capacity(n);
    for i in 0..n {
        let millis = ts_ca
            .get(i)
            .ok_or_else(|| StoreError::ParquetError(format!("null ts at row {i}")))?;
        let ts = chrono::DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| StoreError::ParquetError(format!("ts out of range at row {i}")))?
            .naive_utc();
        bars.push(Bar {
            ts,
            open: open_ca.get(i).unwrap_or(f64::NAN),
            high: high_ca.get(i).unwrap_or(f64::NAN),
            low: low_ca.get(i).unwrap_or(f64::NAN),
            close: close_ca.get(i).unwrap_or(f64::NAN),
            volume: vol_ca.get(i).unwrap_or(0),
        });
    }
    Ok(bars)
}

fn write_parquet_atomic(df: &DataFrame, path: &Path) -> Result<(), StoreError> {
    let tmp_path = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp_path)
        .map_err(|e| StoreError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| StoreError::ParquetError(format!("write parquet: {e}")))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        StoreError::ParquetError(format!("atomic rename failed: {e}"))
    })
}

fn read_parquet_bars(path: &Path) -> Result<Vec<Bar>, StoreError> {
    let file =
        fs::File::open(path).map_err(|e| StoreError::ParquetError(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| StoreError::ParquetError(format!("read: {e}")))?;
    dataframe_to_bars(&df)
}

/// Parse `sid=N` or `sid=N.parquet` directory entries.
fn parse_sid_entry(name: &str) -> Option<Sid> {
    let rest = name.strip_prefix("sid=")?;
    let rest = rest.strip_suffix(".parquet").unwrap_or(rest);
    rest.parse().ok()
}
