//! Labor apportionment across local calendar days.
//!
//! A work segment is a continuous stretch of time attributed to a fixed
//! worker count. [`split`] cuts a segment at every local midnight it crosses,
//! [`merge`] folds the pieces into a session's per-date history, and
//! [`distribute`] hands the session's single target quantity out to those
//! dates in proportion to the labor each one received.
//!
//! All timestamps are UTC. The fixed local offset is applied only to decide
//! which calendar date an instant belongs to.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{DailyLabor, LaborTime};

/// Split `[start, end)` worked by `workers` people into per-date labor.
///
/// Returns an empty map when `start >= end`. Timestamps are truncated to
/// millisecond precision first, so the values always sum to exactly
/// `workers × (end − start)`. A piece of zero length (an interval ending
/// exactly at midnight) is not emitted.
pub fn split(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    workers: u32,
    offset: FixedOffset,
) -> BTreeMap<NaiveDate, LaborTime> {
    let start = start.trunc_subsecs(3);
    let end = end.trunc_subsecs(3);
    let mut pieces = BTreeMap::new();
    if start >= end {
        return pieces;
    }

    let end_date = local_date(end, offset);
    let mut cursor = start;
    while local_date(cursor, offset) < end_date {
        let Some(midnight) = next_local_midnight(cursor, offset) else {
            break;
        };
        add_piece(&mut pieces, local_date(cursor, offset), midnight, cursor, workers);
        cursor = midnight;
    }
    add_piece(&mut pieces, end_date, end, cursor, workers);

    pieces
}

fn add_piece(
    pieces: &mut BTreeMap<NaiveDate, LaborTime>,
    date: NaiveDate,
    until: DateTime<Utc>,
    from: DateTime<Utc>,
    workers: u32,
) {
    let labor = LaborTime::for_workers(until - from, workers);
    if !labor.is_zero() {
        *pieces.entry(date).or_default() += labor;
    }
}

/// Fold `increment` into `history`: add to the entry for the same date, or
/// append a new entry in date order of the increment.
pub fn merge(
    mut history: Vec<DailyLabor>,
    increment: &BTreeMap<NaiveDate, LaborTime>,
) -> Vec<DailyLabor> {
    for (&date, &labor) in increment {
        match history.iter_mut().find(|d| d.date == date) {
            Some(existing) => existing.labor += labor,
            None => history.push(DailyLabor::new(date, labor)),
        }
    }
    history
}

/// Per-date totals of a history, independent of its storage order.
pub fn totals(history: &[DailyLabor]) -> BTreeMap<NaiveDate, LaborTime> {
    let mut out = BTreeMap::new();
    for d in history {
        *out.entry(d.date).or_insert(LaborTime::ZERO) += d.labor;
    }
    out
}

/// The calendar date `at` falls on in the given offset.
pub fn local_date(at: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    at.with_timezone(&offset).date_naive()
}

/// The first local midnight strictly after `at`, as a UTC instant.
pub fn next_local_midnight(at: DateTime<Utc>, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let next_day = local_date(at, offset).succ_opt()?;
    let local_midnight = next_day.and_hms_opt(0, 0, 0)?;
    offset
        .from_local_datetime(&local_midnight)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// One date's share of a session's target quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyShare {
    pub date: NaiveDate,
    pub labor: LaborTime,
    pub quantity: u64,
}

/// Distribute `target_quantity` across the history's dates, weighted by
/// labor share and rounded half up per date.
///
/// Returns nothing when the history holds no labor at all. Dates are
/// returned in ascending order. Rounding is per date, so the quantities may
/// differ from `target_quantity` by at most half a unit per date.
pub fn distribute(history: &[DailyLabor], target_quantity: u64) -> Vec<DailyShare> {
    let per_date = totals(history);
    let total: i64 = per_date.values().map(|l| l.as_millis()).sum();
    if total <= 0 {
        return Vec::new();
    }

    let total = total as u128;
    per_date
        .into_iter()
        .map(|(date, labor)| {
            let part = labor.as_millis().max(0) as u128;
            let scaled = 2 * u128::from(target_quantity) * part + total;
            let quantity = (scaled / (2 * total)) as u64;
            DailyShare {
                date,
                labor,
                quantity,
            }
        })
        .collect()
}
