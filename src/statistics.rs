use chrono::NaiveDate;
use chrono_tz::Tz;
use itertools::{Itertools, MinMaxResult};

use crate::{
    pricing::{PriceKind, PricedInterval},
    quantity::price::KilowattHourPrice,
};

/// Aggregates of one price kind over one local calendar day.
///
/// All the statistics are absent when the day has no intervals.
#[must_use]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DaySummary {
    pub min: Option<KilowattHourPrice>,
    pub max: Option<KilowattHourPrice>,
    pub mean: Option<KilowattHourPrice>,
}

impl DaySummary {
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.mean.is_some()
    }
}

/// Summarize the intervals which start on `day` in the time zone.
pub fn summarize(
    series: &[PricedInterval],
    day: NaiveDate,
    time_zone: Tz,
    kind: PriceKind,
) -> DaySummary {
    let prices = series
        .iter()
        .filter(|interval| interval.interval.start.with_timezone(&time_zone).date_naive() == day)
        .map(|interval| interval.price(kind))
        .collect_vec();
    let (min, max) = match prices.iter().copied().minmax() {
        MinMaxResult::NoElements => return DaySummary::default(),
        MinMaxResult::OneElement(price) => (price, price),
        MinMaxResult::MinMax(min, max) => (min, max),
    };
    #[allow(clippy::cast_precision_loss)]
    let mean = prices.iter().copied().sum::<KilowattHourPrice>() / prices.len() as f64;
    DaySummary { min: Some(min), max: Some(max), mean: Some(mean) }
}
