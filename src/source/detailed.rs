use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::Value;
use serde_with::serde_as;

use super::{Lenient, PriceInterval};
use crate::{core::interval::Interval, prelude::*, quantity::price::KilowattHourPrice};

/// EPEX Spot record:
///
/// ```yaml
/// start_time: '2025-12-25T00:00:00+01:00'
/// end_time: '2025-12-25T00:15:00+01:00'
/// price_per_kwh: 0.05678
/// ```
#[serde_as]
#[derive(Deserialize)]
struct Record {
    start_time: DateTime<FixedOffset>,
    end_time: DateTime<FixedOffset>,

    #[serde_as(as = "Lenient")]
    #[serde(alias = "price", alias = "rate")]
    price_per_kwh: f64,
}

pub fn parse(records: &[Value], time_zone: Tz) -> Vec<PriceInterval> {
    records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| match Record::deserialize(record) {
            Ok(record) => Some(PriceInterval {
                interval: Interval::new(
                    record.start_time.with_timezone(&time_zone),
                    record.end_time.with_timezone(&time_zone),
                ),
                market_price: KilowattHourPrice(record.price_per_kwh),
            }),
            Err(error) => {
                warn!(index, "dropped an invalid record: {error:#}");
                None
            }
        })
        .collect()
}
