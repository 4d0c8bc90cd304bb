//! Asset metadata store: identity and lifetime of every sid in a snapshot.

use crate::domain::{AssetRecord, Sid};
use crate::error::StoreError;
use crate::store::{write_json_atomic, AssetSink};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const ASSETS_FILE: &str = "assets.json";

/// Writer bound to one pending snapshot.
///
/// Sid uniqueness is enforced across all `write` calls of the ingestion, not
/// just within one batch.
pub struct AssetWriter {
    path: PathBuf,
    records: Vec<AssetRecord>,
    seen: HashSet<Sid>,
}

impl AssetWriter {
    pub fn new(snapshot_dir: &Path) -> Self {
        Self {
            path: snapshot_dir.join(ASSETS_FILE),
            records: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Number of records accepted so far.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn validate(&self, records: &[AssetRecord]) -> Result<(), StoreError> {
        let mut batch: HashSet<Sid> = HashSet::new();
        for record in records {
            if record.symbol.is_empty() {
                return Err(StoreError::InvalidAssetRecord {
                    sid: record.sid,
                    reason: "empty symbol".to_string(),
                });
            }
            if record.start_date > record.end_date {
                return Err(StoreError::InvalidAssetRecord {
                    sid: record.sid,
                    reason: format!(
                        "start_date {} is after end_date {}",
                        record.start_date, record.end_date
                    ),
                });
            }
            if self.seen.contains(&record.sid) || !batch.insert(record.sid) {
                return Err(StoreError::InvalidAssetRecord {
                    sid: record.sid,
                    reason: "duplicate sid".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl AssetSink for AssetWriter {
    /// Validate the whole batch, then persist. A rejected batch leaves the
    /// store exactly as it was.
    fn write(&mut self, records: &[AssetRecord]) -> Result<(), StoreError> {
        self.validate(records)?;
        self.seen.extend(records.iter().map(|r| r.sid));
        self.records.extend_from_slice(records);
        write_json_atomic(&self.path, &self.records)
    }
}

/// Read side of the asset table, loaded from a committed snapshot.
pub struct AssetReader {
    records: Vec<AssetRecord>,
    by_sid: HashMap<Sid, usize>,
}

impl AssetReader {
    /// A snapshot whose ingestion never wrote assets reads as an empty table.
    pub fn open(snapshot_dir: &Path) -> Result<Self, StoreError> {
        let path = snapshot_dir.join(ASSETS_FILE);
        let records: Vec<AssetRecord> = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            Vec::new()
        };
        let by_sid = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.sid, i))
            .collect();
        Ok(Self { records, by_sid })
    }

    pub fn lookup(&self, sid: Sid) -> Option<&AssetRecord> {
        self.by_sid.get(&sid).map(|&i| &self.records[i])
    }

    /// Resolve a symbol to a sid as of a date.
    ///
    /// Symbols get recycled: the record whose lifetime contains `as_of`
    /// wins; failing that, the most recently delisted holder that already
    /// existed by `as_of`.
    pub fn symbol_to_sid(&self, symbol: &str, as_of: NaiveDate) -> Option<Sid> {
        let holders = self.records.iter().filter(|r| r.symbol == symbol);

        let mut best_past: Option<&AssetRecord> = None;
        for record in holders {
            if record.start_date <= as_of && as_of <= record.end_date {
                return Some(record.sid);
            }
            if record.start_date <= as_of
                && best_past.map_or(true, |b| record.end_date > b.end_date)
            {
                best_past = Some(record);
            }
        }
        best_past.map(|r| r.sid)
    }

    /// All sids in the table, ascending.
    pub fn sids(&self) -> Vec<Sid> {
        let mut sids: Vec<Sid> = self.by_sid.keys().copied().collect();
        sids.sort_unstable();
        sids
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
