use chrono::{Days, NaiveDate, TimeDelta};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::Value;
use serde_with::serde_as;

use super::{Lenient, PriceInterval, start_of_day};
use crate::{core::interval::Interval, prelude::*, quantity::price::KilowattHourPrice};

#[serde_as]
#[derive(Deserialize)]
#[serde(transparent)]
struct HourlyPrice(#[serde_as(as = "Lenient")] f64);

/// Synthesize the hourly intervals: the `i`-th price starts `i` hours after local midnight.
pub fn parse(today: &[Value], tomorrow: &[Value], on: NaiveDate, time_zone: Tz) -> Vec<PriceInterval> {
    let mut intervals = parse_day(today, on, time_zone);
    if let Some(next_day) = on.checked_add_days(Days::new(1)) {
        intervals.extend(parse_day(tomorrow, next_day, time_zone));
    }
    intervals
}

#[instrument(skip_all, fields(on = %on, n_prices = prices.len()))]
fn parse_day(prices: &[Value], on: NaiveDate, time_zone: Tz) -> Vec<PriceInterval> {
    let Some(midnight) = start_of_day(on, time_zone) else {
        return Vec::new();
    };
    prices
        .iter()
        .zip(0..)
        .filter_map(|(price, hour)| match HourlyPrice::deserialize(price) {
            Ok(HourlyPrice(price)) => Some(PriceInterval {
                interval: Interval::starting_at(
                    midnight + TimeDelta::hours(hour),
                    TimeDelta::hours(1),
                ),
                market_price: KilowattHourPrice(price),
            }),
            Err(error) => {
                warn!(hour, "dropped an invalid price: {error:#}");
                None
            }
        })
        .collect()
}
