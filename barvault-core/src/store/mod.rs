//! On-disk storage: snapshot lifecycle, per-snapshot writers and readers,
//! and the bundle-scoped ingestion cache.
//!
//! Writers are handed to ingest routines as capability traits ([`AssetSink`],
//! [`BarSink`], [`AdjustmentSink`]) so routines depend on the write contract,
//! not on storage concretions.

pub mod adjustments;
pub mod assets;
pub mod bars;
pub mod cache;
pub mod snapshot;

pub use adjustments::{AdjustmentReader, AdjustmentWriter};
pub use assets::{AssetReader, AssetWriter};
pub use bars::{rollup_daily, BarReader, BarWriter};
pub use cache::IngestionCache;
pub use snapshot::{
    format_timestamp, parse_timestamp, CleanupReport, CommittedSnapshot, PendingSnapshot,
    RetentionPolicy, SnapshotStore,
};

use crate::domain::{AssetRecord, Bar, CorporateAction, Sid};
use crate::error::StoreError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Write capability over the asset metadata table.
pub trait AssetSink {
    /// Validate and persist a batch of asset records. Sid uniqueness is
    /// enforced across the whole ingestion, not just this batch.
    fn write(&mut self, records: &[AssetRecord]) -> Result<(), StoreError>;
}

/// Write capability over one granularity of bar data.
pub trait BarSink {
    /// Consume a finite, single-pass, non-restartable producer of
    /// `(sid, bars)` chunks. If a retry is needed the producer must be
    /// re-obtained from the source — it is never rewound.
    fn write(&mut self, chunks: &mut dyn Iterator<Item = (Sid, Vec<Bar>)>)
        -> Result<(), StoreError>;
}

/// Write capability over the corporate-action table.
pub trait AdjustmentSink {
    /// Persist whichever tables are present; each parameter is
    /// independently optional.
    fn write(
        &mut self,
        splits: Option<&[CorporateAction]>,
        mergers: Option<&[CorporateAction]>,
        cash_dividends: Option<&[CorporateAction]>,
        stock_dividends: Option<&[CorporateAction]>,
    ) -> Result<(), StoreError>;
}

pub const MANIFEST_FILE: &str = "manifest.json";

/// Informational sidecar written into a snapshot just before commit.
/// Readers do not require it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub bundle: String,
    pub timestamp: NaiveDateTime,
    pub asset_count: usize,
    pub daily_sids: usize,
    pub minute_sids: usize,
    pub adjustment_count: usize,
    pub content_hash: String,
}

impl Manifest {
    pub fn write_to(&self, snapshot_dir: &Path) -> Result<(), StoreError> {
        write_json_atomic(&snapshot_dir.join(MANIFEST_FILE), self)
    }

    pub fn read_from(snapshot_dir: &Path) -> Result<Option<Self>, StoreError> {
        let path = snapshot_dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&fs::read_to_string(&path)?)?))
    }
}

/// Blake3 digest over a snapshot directory's contents (relative path plus
/// bytes of every file except the manifest itself), in sorted path order.
pub fn hash_snapshot_dir(snapshot_dir: &Path) -> Result<String, StoreError> {
    let mut files = Vec::new();
    collect_files(snapshot_dir, snapshot_dir, &mut files)?;
    files.sort();

    let mut hasher = blake3::Hasher::new();
    for rel in &files {
        if rel.as_path() == Path::new(MANIFEST_FILE) {
            continue;
        }
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update(&fs::read(snapshot_dir.join(rel))?);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

fn collect_files(
    root: &Path,
    dir: &Path,
    out: &mut Vec<std::path::PathBuf>,
) -> Result<(), StoreError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(root) {
            out.push(rel.to_path_buf());
        }
    }
    Ok(())
}

/// The read surface of one committed snapshot: everything a downstream
/// consumer (pricing, backtest engine) needs.
pub struct BundleData {
    snapshot: CommittedSnapshot,
    pub assets: AssetReader,
    pub bars: BarReader,
    pub adjustments: AdjustmentReader,
}

impl std::fmt::Debug for BundleData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleData")
            .field("snapshot", &self.snapshot)
            .finish_non_exhaustive()
    }
}

impl BundleData {
    pub fn open(snapshot: &CommittedSnapshot) -> Result<Self, StoreError> {
        Ok(Self {
            snapshot: snapshot.clone(),
            assets: AssetReader::open(snapshot.path())?,
            bars: BarReader::open(snapshot.path()),
            adjustments: AdjustmentReader::open(snapshot.path())?,
        })
    }

    pub fn snapshot(&self) -> &CommittedSnapshot {
        &self.snapshot
    }

    pub fn manifest(&self) -> Result<Option<Manifest>, StoreError> {
        Manifest::read_from(self.snapshot.path())
    }
}

/// Serialize to `.tmp`, then rename: readers of a live snapshot directory
/// never see a torn file.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        e.into()
    })
}
