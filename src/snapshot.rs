//! Immutable result of one refresh cycle and its presentation as sensor attributes.

use chrono::{DateTime, Days, NaiveDate};
use chrono_tz::Tz;
use serde::Serialize;

use crate::{
    pricing::{Coefficients, PriceKind, PricedInterval, price_series},
    source::PriceInterval,
    statistics::{DaySummary, summarize},
};

#[must_use]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DaySummaries {
    pub today: DaySummary,
    pub tomorrow: DaySummary,
}

#[must_use]
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub source_entity: String,

    /// Local day the snapshot has been computed for.
    pub today: NaiveDate,

    pub time_zone: Tz,
    pub coefficients: Coefficients,
    pub intervals: Vec<PricedInterval>,
    pub consumption: DaySummaries,
    pub injection: DaySummaries,
}

impl Snapshot {
    /// Apply the coefficients to the market price series and aggregate the days.
    pub fn compute(
        source_entity: impl Into<String>,
        series: &[PriceInterval],
        coefficients: Coefficients,
        today: NaiveDate,
        time_zone: Tz,
    ) -> Self {
        let intervals = price_series(series, &coefficients);
        let tomorrow = today.checked_add_days(Days::new(1));
        let summaries = |kind| DaySummaries {
            today: summarize(&intervals, today, time_zone, kind),
            tomorrow: tomorrow
                .map(|tomorrow| summarize(&intervals, tomorrow, time_zone, kind))
                .unwrap_or_default(),
        };
        let consumption = summaries(PriceKind::Consumption);
        let injection = summaries(PriceKind::Injection);
        Self {
            source_entity: source_entity.into(),
            today,
            time_zone,
            coefficients,
            intervals,
            consumption,
            injection,
        }
    }

    #[must_use]
    pub const fn summaries(&self, kind: PriceKind) -> &DaySummaries {
        match kind {
            PriceKind::Consumption => &self.consumption,
            PriceKind::Injection => &self.injection,
        }
    }

    /// Interval which contains the moment.
    #[must_use]
    pub fn current(&self, now: DateTime<Tz>) -> Option<&PricedInterval> {
        let index = self.intervals.partition_point(|interval| interval.interval.start <= now);
        self.intervals[..index].last().filter(|interval| interval.interval.contains(now))
    }

    fn intervals_on(&self, day: NaiveDate) -> impl Iterator<Item = &PricedInterval> {
        self.intervals.iter().filter(move |interval| {
            interval.interval.start.with_timezone(&self.time_zone).date_naive() == day
        })
    }

    pub fn attributes(&self, kind: PriceKind) -> SensorAttributes<'_> {
        let tomorrow = self.today.checked_add_days(Days::new(1));
        let records_on = |day: Option<NaiveDate>| {
            day.map(|day| {
                self.intervals_on(day)
                    .map(|interval| RawRecord {
                        hour: interval.interval.start,
                        price: interval.price(kind).rounded(),
                    })
                    .collect::<Vec<_>>()
            })
            .filter(|records| !records.is_empty())
        };
        let prices_on = |records: &Option<Vec<RawRecord>>| {
            records
                .as_ref()
                .map(|records| records.iter().map(|record| record.price).collect::<Vec<_>>())
        };

        let data = self
            .intervals
            .iter()
            .map(|interval| DetailedRecord {
                start_time: interval.interval.start,
                end_time: interval.interval.end,
                price_per_kwh: interval.price(kind).rounded(),
            })
            .collect::<Vec<_>>();
        let raw_today = records_on(Some(self.today));
        let raw_tomorrow = records_on(tomorrow);
        let summaries = self.summaries(kind);

        SensorAttributes {
            data: (!data.is_empty()).then_some(data),
            today: prices_on(&raw_today),
            tomorrow: prices_on(&raw_tomorrow),
            raw_today,
            raw_tomorrow,
            today_min: summaries.today.min.map(|price| price.rounded()),
            today_max: summaries.today.max.map(|price| price.rounded()),
            today_mean: summaries.today.mean.map(|price| price.rounded()),
            tomorrow_min: summaries.tomorrow.min.map(|price| price.rounded()),
            tomorrow_max: summaries.tomorrow.max.map(|price| price.rounded()),
            tomorrow_mean: summaries.tomorrow.mean.map(|price| price.rounded()),
            tomorrow_valid: summaries.tomorrow.is_valid(),
            source_entity: &self.source_entity,
        }
    }
}

/// Sensor attributes compatible with both upstream layouts.
///
/// Empty series and absent statistics are `null`.
#[must_use]
#[derive(Debug, Serialize)]
pub struct SensorAttributes<'a> {
    pub data: Option<Vec<DetailedRecord>>,
    pub raw_today: Option<Vec<RawRecord>>,
    pub raw_tomorrow: Option<Vec<RawRecord>>,
    pub today: Option<Vec<f64>>,
    pub tomorrow: Option<Vec<f64>>,
    pub today_min: Option<f64>,
    pub today_max: Option<f64>,
    pub today_mean: Option<f64>,
    pub tomorrow_min: Option<f64>,
    pub tomorrow_max: Option<f64>,
    pub tomorrow_mean: Option<f64>,
    pub tomorrow_valid: bool,
    pub source_entity: &'a str,
}

#[derive(Debug, Serialize)]
pub struct DetailedRecord {
    pub start_time: DateTime<Tz>,
    pub end_time: DateTime<Tz>,
    pub price_per_kwh: f64,
}

#[derive(Debug, Serialize)]
pub struct RawRecord {
    pub hour: DateTime<Tz>,
    pub price: f64,
}
