use chrono::{DateTime, FixedOffset, TimeDelta};
use chrono_tz::Tz;
use itertools::Itertools;
use serde::Deserialize;
use serde_json::Value;
use serde_with::serde_as;

use super::{Lenient, PriceInterval};
use crate::{core::interval::Interval, prelude::*, quantity::price::KilowattHourPrice};

/// Energi Data Service record:
///
/// ```yaml
/// hour: '2025-12-25T00:00:00+01:00'
/// price: 0.0568
/// ```
#[serde_as]
#[derive(Deserialize)]
struct Record {
    hour: DateTime<FixedOffset>,

    #[serde_as(as = "Lenient")]
    price: f64,
}

pub const DEFAULT_DURATION: TimeDelta = TimeDelta::hours(1);

/// Parse one day of records.
///
/// An interval lasts until the next record starts. The last one lasts as long as
/// the previous valid one, or `default_duration` when there is none.
pub fn parse(records: &[Value], time_zone: Tz, default_duration: TimeDelta) -> Vec<PriceInterval> {
    let records = records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| match Record::deserialize(record) {
            Ok(record) => Some((record.hour.with_timezone(&time_zone), record.price)),
            Err(error) => {
                warn!(index, "dropped an invalid record: {error:#}");
                None
            }
        })
        .collect_vec();

    let mut intervals = Vec::with_capacity(records.len());
    let mut last_duration = default_duration;
    for (index, (start, price)) in records.iter().copied().enumerate() {
        let interval = match records.get(index + 1) {
            Some((next_start, _)) => Interval::new(start, *next_start),
            None => Interval::starting_at(start, last_duration),
        };
        if !interval.is_empty() {
            last_duration = interval.duration();
        }
        intervals.push(PriceInterval { interval, market_price: KilowattHourPrice(price) });
    }
    intervals
}
