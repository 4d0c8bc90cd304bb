//! Versioned snapshot store.
//!
//! Layout: `{root}/{bundle}/{timestamp}/` per committed snapshot.
//!
//! Features:
//! - One pending snapshot per bundle, promoted by a single atomic rename
//! - Hidden `.incoming-{timestamp}` staging directories, invisible to readers
//! - As-of resolution over the committed, timestamp-ordered sequence
//! - Retention cleanup (before/after window or keep-last)
//! - Stale staging directories from crashed processes swept on `begin`

use crate::error::StoreError;
use chrono::{NaiveDateTime, Timelike, Utc};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Prefix for the staging directory of a not-yet-committed snapshot.
const INCOMING_PREFIX: &str = ".incoming-";

/// Directory names sort lexicographically in timestamp order with this format.
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6f";

/// Render a snapshot timestamp as its directory name.
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a directory name back into a snapshot timestamp.
pub fn parse_timestamp(name: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(name, TIMESTAMP_FORMAT).ok()
}

/// Store of committed snapshots plus the per-bundle pending slot.
///
/// Cloning shares the pending-slot guard set, so clones of one store see
/// each other's in-progress ingestions.
#[derive(Clone)]
pub struct SnapshotStore {
    root: PathBuf,
    active: Arc<Mutex<HashSet<String>>>,
}

/// Releases the bundle's pending slot when the pending snapshot goes away,
/// whether through commit, discard, or a drop on an error path.
#[derive(Debug)]
struct SlotGuard {
    bundle: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.active.lock().unwrap().remove(&self.bundle);
    }
}

/// A snapshot under construction. Invisible to `list` and `resolve_as_of`
/// until committed. Dropping it without commit leaves the staging directory
/// for the next `begin` to sweep — the crash path and the forgotten-handle
/// path are the same path.
#[derive(Debug)]
pub struct PendingSnapshot {
    bundle: String,
    timestamp: NaiveDateTime,
    dir: PathBuf,
    _slot: SlotGuard,
}

impl PendingSnapshot {
    pub fn bundle(&self) -> &str {
        &self.bundle
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    /// Staging directory the sinks write into.
    pub fn path(&self) -> &Path {
        &self.dir
    }
}

/// An immutable, committed snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedSnapshot {
    bundle: String,
    timestamp: NaiveDateTime,
    dir: PathBuf,
}

impl CommittedSnapshot {
    pub fn bundle(&self) -> &str {
        &self.bundle
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bundle_dir(&self, bundle: &str) -> PathBuf {
        self.root.join(bundle)
    }

    /// Ingestion-cache directory for a bundle. Bundle-scoped, not
    /// snapshot-scoped: it must outlive failed ingestion attempts.
    pub fn cache_dir(&self, bundle: &str) -> PathBuf {
        self.bundle_dir(bundle).join(".cache")
    }

    /// Open the pending slot for `bundle` with a freshly allocated timestamp.
    pub fn begin(&self, bundle: &str) -> Result<PendingSnapshot, StoreError> {
        self.begin_at(bundle, Utc::now().naive_utc())
    }

    /// Open the pending slot for `bundle` at an explicit timestamp.
    ///
    /// Fails with `IngestionInProgress` if the slot is taken, and with
    /// `TimestampCollision` if `timestamp` is not strictly greater than the
    /// latest committed snapshot — ids are never reused or reordered.
    pub fn begin_at(
        &self,
        bundle: &str,
        timestamp: NaiveDateTime,
    ) -> Result<PendingSnapshot, StoreError> {
        // Directory names carry microsecond precision; drop anything finer
        // so the id round-trips through `list` unchanged.
        let timestamp = timestamp
            .with_nanosecond(timestamp.nanosecond() / 1_000 * 1_000)
            .unwrap_or(timestamp);
        {
            let mut active = self.active.lock().unwrap();
            if !active.insert(bundle.to_string()) {
                return Err(StoreError::IngestionInProgress {
                    bundle: bundle.to_string(),
                });
            }
        }
        // From here on the slot is ours; the guard releases it on any exit.
        let slot = SlotGuard {
            bundle: bundle.to_string(),
            active: Arc::clone(&self.active),
        };

        let bundle_dir = self.bundle_dir(bundle);
        fs::create_dir_all(&bundle_dir)?;
        self.sweep_stale_incoming(bundle, &bundle_dir);

        if let Some(latest) = self.list(bundle)?.last().copied() {
            if timestamp <= latest {
                return Err(StoreError::TimestampCollision {
                    bundle: bundle.to_string(),
                    candidate: timestamp,
                    latest,
                });
            }
        }

        let dir = bundle_dir.join(format!("{INCOMING_PREFIX}{}", format_timestamp(timestamp)));
        fs::create_dir_all(&dir)?;
        debug!(bundle, %timestamp, "opened pending snapshot");

        Ok(PendingSnapshot {
            bundle: bundle.to_string(),
            timestamp,
            dir,
            _slot: slot,
        })
    }

    /// Promote a pending snapshot. A single rename makes it visible: readers
    /// see either nothing or the whole snapshot, never a half-written one.
    pub fn commit(&self, pending: PendingSnapshot) -> Result<CommittedSnapshot, StoreError> {
        let final_dir = self
            .bundle_dir(&pending.bundle)
            .join(format_timestamp(pending.timestamp));
        fs::rename(&pending.dir, &final_dir)?;
        info!(bundle = %pending.bundle, timestamp = %pending.timestamp, "snapshot committed");
        Ok(CommittedSnapshot {
            bundle: pending.bundle.clone(),
            timestamp: pending.timestamp,
            dir: final_dir,
        })
    }

    /// Remove a pending snapshot entirely. No trace remains in listings.
    pub fn discard(&self, pending: PendingSnapshot) -> Result<(), StoreError> {
        fs::remove_dir_all(&pending.dir)?;
        info!(bundle = %pending.bundle, timestamp = %pending.timestamp, "pending snapshot discarded");
        Ok(())
    }

    /// Committed snapshot timestamps for a bundle, oldest first.
    ///
    /// A bundle that was never ingested is an empty list, not an error.
    pub fn list(&self, bundle: &str) -> Result<Vec<NaiveDateTime>, StoreError> {
        let bundle_dir = self.bundle_dir(bundle);
        if !bundle_dir.exists() {
            return Ok(Vec::new());
        }

        let mut timestamps = Vec::new();
        for entry in fs::read_dir(&bundle_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            // Hidden names (the cache, staging dirs) never surface.
            if name.starts_with('.') {
                continue;
            }
            match parse_timestamp(name) {
                Some(ts) => timestamps.push(ts),
                None => warn!(bundle, name, "unrecognized entry in bundle directory"),
            }
        }
        timestamps.sort_unstable();
        Ok(timestamps)
    }

    /// The committed snapshot with the greatest timestamp `<= as_of`.
    ///
    /// Rerunning an analysis "as of" a past date must see exactly the data
    /// that existed then, not data ingested later.
    pub fn resolve_as_of(
        &self,
        bundle: &str,
        as_of: NaiveDateTime,
    ) -> Result<CommittedSnapshot, StoreError> {
        let timestamp = self
            .list(bundle)?
            .into_iter()
            .filter(|ts| *ts <= as_of)
            .next_back()
            .ok_or_else(|| StoreError::NoBundleData {
                bundle: bundle.to_string(),
                as_of,
            })?;
        Ok(CommittedSnapshot {
            bundle: bundle.to_string(),
            timestamp,
            dir: self.bundle_dir(bundle).join(format_timestamp(timestamp)),
        })
    }

    /// Apply a retention policy: validate, compute the surviving set, then
    /// delete. Refuses to run while the bundle has a pending snapshot.
    ///
    /// Deletion failures do not abort the pass; they are reported so the
    /// caller knows exactly which snapshots are still on disk.
    pub fn cleanup(
        &self,
        bundle: &str,
        policy: &RetentionPolicy,
    ) -> Result<CleanupReport, StoreError> {
        policy.validate()?;
        if self.active.lock().unwrap().contains(bundle) {
            return Err(StoreError::CleanupBlocked {
                bundle: bundle.to_string(),
            });
        }

        let all = self.list(bundle)?;
        let kept = policy.survivors(&all);
        let keep_set: HashSet<NaiveDateTime> = kept.iter().copied().collect();

        let mut removed = Vec::new();
        let mut failed = Vec::new();
        for ts in &all {
            if keep_set.contains(ts) {
                continue;
            }
            let dir = self.bundle_dir(bundle).join(format_timestamp(*ts));
            match fs::remove_dir_all(&dir) {
                Ok(()) => removed.push(*ts),
                Err(e) => {
                    warn!(bundle, timestamp = %ts, error = %e, "failed to remove snapshot");
                    failed.push((*ts, e.to_string()));
                }
            }
        }
        info!(bundle, removed = removed.len(), kept = kept.len(), "cleanup finished");

        Ok(CleanupReport {
            removed,
            kept,
            failed,
        })
    }

    /// Remove staging directories left behind by a crashed process. Safe
    /// because the caller holds the bundle's pending slot: any `.incoming-*`
    /// on disk belongs to no live ingestion.
    fn sweep_stale_incoming(&self, bundle: &str, bundle_dir: &Path) {
        let Ok(entries) = fs::read_dir(bundle_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(INCOMING_PREFIX) {
                warn!(bundle, name, "sweeping stale staging directory");
                if let Err(e) = fs::remove_dir_all(entry.path()) {
                    warn!(bundle, name, error = %e, "failed to sweep staging directory");
                }
            }
        }
    }
}

/// Which committed snapshots survive a `cleanup` pass.
///
/// `before`/`after` delete strictly outside the kept band; `keep_last`
/// retains the N most recent. The two forms are mutually exclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetentionPolicy {
    pub before: Option<NaiveDateTime>,
    pub after: Option<NaiveDateTime>,
    pub keep_last: Option<usize>,
}

impl RetentionPolicy {
    pub fn keep_last(n: usize) -> Self {
        Self {
            keep_last: Some(n),
            ..Self::default()
        }
    }

    pub fn before(ts: NaiveDateTime) -> Self {
        Self {
            before: Some(ts),
            ..Self::default()
        }
    }

    pub fn after(ts: NaiveDateTime) -> Self {
        Self {
            after: Some(ts),
            ..Self::default()
        }
    }

    /// All-validate-then-act: a rejected policy deletes nothing.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.keep_last.is_some() && (self.before.is_some() || self.after.is_some()) {
            return Err(StoreError::InvalidRetentionPolicy(
                "keep_last cannot be combined with before/after".to_string(),
            ));
        }
        if self.keep_last.is_none() && self.before.is_none() && self.after.is_none() {
            return Err(StoreError::InvalidRetentionPolicy(
                "at least one of before, after, keep_last is required".to_string(),
            ));
        }
        Ok(())
    }

    /// The subset of `all` (sorted ascending) this policy retains, in order.
    /// Idempotent: `survivors(survivors(x)) == survivors(x)`.
    pub fn survivors(&self, all: &[NaiveDateTime]) -> Vec<NaiveDateTime> {
        if let Some(n) = self.keep_last {
            let cut = all.len().saturating_sub(n);
            return all[cut..].to_vec();
        }
        all.iter()
            .copied()
            .filter(|ts| {
                let too_old = self.before.is_some_and(|b| *ts < b);
                let too_new = self.after.is_some_and(|a| *ts > a);
                !too_old && !too_new
            })
            .collect()
    }
}

/// Outcome of one cleanup pass.
#[derive(Debug, Clone)]
pub struct CleanupReport {
    pub removed: Vec<NaiveDateTime>,
    pub kept: Vec<NaiveDateTime>,
    /// Snapshots the policy condemned but the OS refused to delete.
    pub failed: Vec<(NaiveDateTime, String)>,
}
