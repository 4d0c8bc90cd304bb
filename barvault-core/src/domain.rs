//! Domain types shared by the writers, readers, and ingest routines.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Integer surrogate identifier for a tradable asset, stable within a snapshot.
pub type Sid = u32;

/// A single OHLCV bar at either daily or minute granularity.
///
/// Daily bars carry a midnight timestamp; minute bars carry the minute's
/// open time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Bar granularity stored in (and queried from) a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Daily,
    Minute,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Daily => "daily",
            Granularity::Minute => "minute",
        }
    }
}

/// Identity and lifetime of one asset within a snapshot.
///
/// `start_date`/`end_date` bound the period during which `symbol` referred
/// to this sid — symbols get recycled across listings, sids never do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub sid: Sid,
    pub symbol: String,
    pub exchange: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Kind of corporate action affecting historical price interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    Split,
    Merger,
    CashDividend,
    StockDividend,
}

impl AdjustmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentKind::Split => "split",
            AdjustmentKind::Merger => "merger",
            AdjustmentKind::CashDividend => "cash_dividend",
            AdjustmentKind::StockDividend => "stock_dividend",
        }
    }
}

/// One corporate action as handed to the adjustment sink.
///
/// The kind is implied by which parameter of
/// [`AdjustmentSink::write`](crate::store::AdjustmentSink::write) it arrives
/// through; the sink stamps it on the persisted [`Adjustment`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorporateAction {
    pub sid: Sid,
    pub effective_date: NaiveDate,
    /// Ratio for splits/mergers, per-share amount for dividends.
    pub magnitude: f64,
}

/// A persisted corporate action, ordered by `effective_date` when applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub sid: Sid,
    pub effective_date: NaiveDate,
    pub kind: AdjustmentKind,
    pub magnitude: f64,
}
