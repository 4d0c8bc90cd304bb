//! `synthetic` bundle: deterministic random-walk data for development.
//!
//! Generates minute bars for every session in the range, rolls them up for
//! the daily store so both granularities agree, and throws in a 2:1 split
//! halfway through for the first symbol so the adjustment path gets real
//! data. Seeded per symbol — two ingests of the same range are identical.

use crate::coordinator::IngestContext;
use crate::registry::BundleRegistry;
use anyhow::{Context, Result};
use barvault_core::calendar::TradingCalendar;
use barvault_core::domain::{AssetRecord, Bar, CorporateAction, Sid};
use barvault_core::store::{rollup_daily, AdjustmentSink, AssetSink, BarSink};
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const BUNDLE_NAME: &str = "synthetic";

const DEFAULT_SYMBOLS: &str = "SPY,QQQ";
const DEFAULT_START: &str = "2024-01-02";
const DEFAULT_END: &str = "2024-02-29";

pub fn register(registry: &mut BundleRegistry) {
    registry.register(
        BUNDLE_NAME,
        TradingCalendar::nyse(),
        Box::new(ingest_synthetic),
    );
}

fn ingest_synthetic(ctx: IngestContext<'_>) -> Result<()> {
    let symbols: Vec<String> = ctx
        .environ
        .get("SYNTHETIC_SYMBOLS")
        .map(String::as_str)
        .unwrap_or(DEFAULT_SYMBOLS)
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();

    let start = parse_env_date(&ctx, "SYNTHETIC_START", DEFAULT_START)?;
    let end = parse_env_date(&ctx, "SYNTHETIC_END", DEFAULT_END)?;
    let sessions = ctx.calendar.sessions_between(start, end);

    let assets: Vec<AssetRecord> = symbols
        .iter()
        .enumerate()
        .map(|(i, symbol)| AssetRecord {
            sid: i as Sid,
            symbol: symbol.clone(),
            exchange: "SYNTHETIC".to_string(),
            name: format!("{symbol} (synthetic)"),
            start_date: start,
            end_date: end,
        })
        .collect();
    ctx.assets.write(&assets)?;

    let mut daily_chunks: Vec<(Sid, Vec<Bar>)> = Vec::with_capacity(symbols.len());
    for (i, symbol) in symbols.iter().enumerate() {
        let sid = i as Sid;
        if ctx.show_progress {
            println!(
                "[{}/{}] Generating {symbol}: {} sessions",
                i + 1,
                symbols.len(),
                sessions.len()
            );
        }

        let minute_bars = generate_minute_walk(symbol, ctx.calendar, &sessions);
        daily_chunks.push((sid, rollup_daily(&minute_bars)));

        // One chunk per session: exercises streamed sid continuation the way
        // a real intraday provider would.
        let mut session_chunks = sessions
            .iter()
            .map(|session| {
                let day: Vec<Bar> = minute_bars
                    .iter()
                    .filter(|b| b.ts.date() == *session)
                    .copied()
                    .collect();
                (sid, day)
            })
            .collect::<Vec<_>>()
            .into_iter();
        ctx.minute_bars.write(&mut session_chunks)?;
    }
    ctx.daily_bars.write(&mut daily_chunks.into_iter())?;

    // A 2:1 split halfway through for the first symbol.
    if let Some(mid) = sessions.get(sessions.len() / 2) {
        ctx.adjustments.write(
            Some(&[CorporateAction {
                sid: 0,
                effective_date: *mid,
                magnitude: 2.0,
            }]),
            None,
            None,
            None,
        )?;
    }

    Ok(())
}

fn parse_env_date(ctx: &IngestContext<'_>, key: &str, default: &str) -> Result<NaiveDate> {
    let raw = ctx.environ.get(key).map(String::as_str).unwrap_or(default);
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("{key}={raw}"))
}

/// Random walk at minute resolution, seeded from the symbol name.
fn generate_minute_walk(
    symbol: &str,
    calendar: &TradingCalendar,
    sessions: &[NaiveDate],
) -> Vec<Bar> {
    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let mut bars = Vec::with_capacity(sessions.len() * calendar.minutes_per_session() as usize);
    let mut price = 100.0_f64;
    for session in sessions {
        let open_ts = calendar.session_open(*session);
        for minute in 0..calendar.minutes_per_session() {
            let ret: f64 = rng.gen_range(-0.0008..0.0008);
            let open = price;
            let close = price * (1.0 + ret);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.0003));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.0003));
            bars.push(Bar {
                ts: open_ts + Duration::minutes(minute as i64),
                open,
                high,
                low,
                close,
                volume: rng.gen_range(1_000..50_000),
            });
            price = close;
        }
    }
    bars
}
