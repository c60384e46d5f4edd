//! Normalization of the upstream price sensors into one canonical price series.

mod detailed;
mod raw_hourly;
mod simplified;

use std::collections::BTreeMap;

use chrono::{DateTime, MappedLocalTime, NaiveDate, NaiveTime, TimeDelta};
use chrono_tz::Tz;
use serde_json::{Map, Value};

use crate::{
    core::interval::Interval,
    error::PriceError,
    prelude::*,
    quantity::price::KilowattHourPrice,
};

/// Accepts a number or a numeric string.
type Lenient = serde_with::PickFirst<(serde_with::Same, serde_with::DisplayFromStr)>;

/// Upstream Home Assistant integration which feeds the market prices.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, clap::ValueEnum)]
pub enum SourceType {
    /// Detect from the sensor attributes.
    #[default]
    Auto,

    /// EPEX Spot integration: `data` with explicit intervals.
    EpexSpot,

    /// Energi Data Service integration: `raw_today`/`raw_tomorrow` or `today`/`tomorrow`.
    EnergiDataService,
}

/// Market price over a time interval.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PriceInterval {
    pub interval: Interval,
    pub market_price: KilowattHourPrice,
}

/// Recognized layout of the upstream sensor attributes.
#[derive(Debug)]
pub enum UpstreamShape<'a> {
    /// Records with explicit `start_time`, `end_time` and a price.
    Detailed(&'a [Value]),

    /// Bare hourly prices, starting at local midnight.
    Simplified { today: &'a [Value], tomorrow: &'a [Value] },

    /// `{hour, price}` records with explicit start times.
    RawHourly { today: &'a [Value], tomorrow: &'a [Value] },
}

impl<'a> UpstreamShape<'a> {
    pub fn detect(
        attributes: &'a Map<String, Value>,
        source_type: SourceType,
    ) -> Result<Self, PriceError> {
        let array = |key: &str| attributes.get(key).and_then(Value::as_array).map(Vec::as_slice);
        let optional_array = |key: &str| array(key).unwrap_or_default();

        let detailed = || array("data").map(Self::Detailed);
        let raw_hourly = || {
            array("raw_today")
                .map(|today| Self::RawHourly { today, tomorrow: optional_array("raw_tomorrow") })
        };
        let simplified = || {
            array("today")
                .map(|today| Self::Simplified { today, tomorrow: optional_array("tomorrow") })
        };

        let shape = match source_type {
            SourceType::Auto => detailed()
                .filter(|shape| !shape.is_empty())
                .or_else(|| raw_hourly().filter(|shape| !shape.is_empty()))
                .or_else(simplified)
                .or_else(detailed)
                .or_else(raw_hourly),
            SourceType::EpexSpot => detailed(),
            SourceType::EnergiDataService => raw_hourly().or_else(simplified),
        };
        shape.ok_or_else(|| {
            let mut keys = attributes.keys().map(String::as_str).collect::<Vec<_>>();
            keys.sort_unstable();
            PriceError::UnsupportedFormat(format!(
                "no price series for {source_type:?} among attributes {keys:?}"
            ))
        })
    }

    /// Whether the shape carries no records at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        match self {
            Self::Detailed(records) => records.is_empty(),
            Self::Simplified { today, tomorrow } | Self::RawHourly { today, tomorrow } => {
                today.is_empty() && tomorrow.is_empty()
            }
        }
    }

    /// Raw, not yet validated intervals in the input order.
    fn intervals(&self, today: NaiveDate, time_zone: Tz) -> Vec<PriceInterval> {
        match self {
            Self::Detailed(records) => detailed::parse(records, time_zone),
            Self::Simplified { today: today_prices, tomorrow: tomorrow_prices } => {
                simplified::parse(today_prices, tomorrow_prices, today, time_zone)
            }
            Self::RawHourly { today: today_records, tomorrow: tomorrow_records } => {
                let mut intervals =
                    raw_hourly::parse(today_records, time_zone, raw_hourly::DEFAULT_DURATION);
                let last_duration = intervals
                    .last()
                    .map(|interval| interval.interval.duration())
                    .filter(|duration| *duration > TimeDelta::zero())
                    .unwrap_or(raw_hourly::DEFAULT_DURATION);
                intervals.extend(raw_hourly::parse(tomorrow_records, time_zone, last_duration));
                intervals
            }
        }
    }
}

/// Parse the sensor attributes into a sorted series of non-overlapping intervals.
///
/// `today` anchors the synthesized timestamps of the simplified format. A series without
/// a single interval starting on `today` is [`PriceError::MissingData`].
#[instrument(skip_all, fields(source_type = ?source_type, today = %today))]
pub fn parse(
    attributes: &Map<String, Value>,
    source_type: SourceType,
    today: NaiveDate,
    time_zone: Tz,
) -> Result<Vec<PriceInterval>, PriceError> {
    let shape = UpstreamShape::detect(attributes, source_type)?;
    if shape.is_empty() {
        return Err(PriceError::MissingData);
    }
    let series = normalize(shape.intervals(today, time_zone));
    if series.is_empty() {
        return Err(PriceError::MissingData);
    }
    if !series.iter().any(|interval| interval.interval.start.date_naive() == today) {
        warn!(first = ?series[0].interval, "no prices for today");
        return Err(PriceError::MissingData);
    }
    debug!(n_intervals = series.len(), "parsed");
    Ok(series)
}

/// Drop the invalid intervals, sort by start time, and resolve duplicates and overlaps.
///
/// Of the duplicate start times, the last one wins. An interval overlapping its predecessor
/// is dropped.
fn normalize(intervals: Vec<PriceInterval>) -> Vec<PriceInterval> {
    let mut by_start = BTreeMap::new();
    for interval in intervals {
        if interval.interval.is_empty() {
            warn!(interval = ?interval.interval, "dropped: start time is not before end time");
            continue;
        }
        if !interval.market_price.0.is_finite() {
            warn!(interval = ?interval.interval, "dropped: price is not finite");
            continue;
        }
        if let Some(replaced) = by_start.insert(interval.interval.start, interval) {
            debug!(interval = ?replaced.interval, "replaced a duplicate");
        }
    }

    let mut series: Vec<PriceInterval> = Vec::with_capacity(by_start.len());
    for interval in by_start.into_values() {
        if let Some(previous) = series.last()
            && previous.interval.overlaps(interval.interval)
        {
            warn!(
                interval = ?interval.interval,
                previous = ?previous.interval,
                "dropped: overlaps the previous interval",
            );
            continue;
        }
        series.push(interval);
    }
    series
}

/// Local midnight at the start of the day.
fn start_of_day(date: NaiveDate, time_zone: Tz) -> Option<DateTime<Tz>> {
    match date.and_time(NaiveTime::MIN).and_local_timezone(time_zone) {
        MappedLocalTime::Single(midnight) | MappedLocalTime::Ambiguous(midnight, _) => {
            Some(midnight)
        }
        MappedLocalTime::None => {
            warn!(%date, "local midnight does not exist");
            None
        }
    }
}
