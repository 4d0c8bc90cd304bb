//! Corporate-action store.
//!
//! Adjustments are written without cross-validation against asset or bar
//! data — they may reference sids the rest of the ingestion has not settled
//! yet. Application order is resolved at read time.

use crate::domain::{Adjustment, AdjustmentKind, CorporateAction, Sid};
use crate::error::StoreError;
use crate::store::{write_json_atomic, AdjustmentSink};
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

pub const ADJUSTMENTS_FILE: &str = "adjustments.json";

/// Writer bound to one pending snapshot.
pub struct AdjustmentWriter {
    path: PathBuf,
    records: Vec<Adjustment>,
}

impl AdjustmentWriter {
    pub fn new(snapshot_dir: &Path) -> Self {
        Self {
            path: snapshot_dir.join(ADJUSTMENTS_FILE),
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn stamp(&mut self, kind: AdjustmentKind, actions: Option<&[CorporateAction]>) {
        for action in actions.unwrap_or_default() {
            self.records.push(Adjustment {
                sid: action.sid,
                effective_date: action.effective_date,
                kind,
                magnitude: action.magnitude,
            });
        }
    }
}

impl AdjustmentSink for AdjustmentWriter {
    /// Persist whichever tables are present; each is independently optional.
    fn write(
        &mut self,
        splits: Option<&[CorporateAction]>,
        mergers: Option<&[CorporateAction]>,
        cash_dividends: Option<&[CorporateAction]>,
        stock_dividends: Option<&[CorporateAction]>,
    ) -> Result<(), StoreError> {
        self.stamp(AdjustmentKind::Split, splits);
        self.stamp(AdjustmentKind::Merger, mergers);
        self.stamp(AdjustmentKind::CashDividend, cash_dividends);
        self.stamp(AdjustmentKind::StockDividend, stock_dividends);
        write_json_atomic(&self.path, &self.records)
    }
}

/// Read side, loaded from a committed snapshot.
pub struct AdjustmentReader {
    records: Vec<Adjustment>,
}

impl AdjustmentReader {
    pub fn open(snapshot_dir: &Path) -> Result<Self, StoreError> {
        let path = snapshot_dir.join(ADJUSTMENTS_FILE);
        let records = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            Vec::new()
        };
        Ok(Self { records })
    }

    /// Adjustments for `sid` effective on or before `as_of`, ordered by
    /// effective date. Same-date adjustments keep their write order.
    pub fn adjustments_for(&self, sid: Sid, as_of: NaiveDate) -> Vec<Adjustment> {
        let mut matching: Vec<Adjustment> = self
            .records
            .iter()
            .filter(|a| a.sid == sid && a.effective_date <= as_of)
            .cloned()
            .collect();
        matching.sort_by_key(|a| a.effective_date);
        matching
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
