use chrono_tz::Tz;
use clap::Parser;

use crate::source::SourceType;

#[derive(Parser)]
pub struct SourceArgs {
    /// Upstream market price sensor, for example `sensor.epex_spot_data_price`.
    #[clap(long = "source-entity-id", env = "SOURCE_ENTITY_ID")]
    pub entity_id: String,

    #[clap(long, env = "SOURCE_TYPE", value_enum, default_value = "auto")]
    pub source_type: SourceType,

    /// Time zone of the calendar days and the synthesized hourly intervals.
    #[clap(long, env = "TIME_ZONE", default_value = "Europe/Brussels")]
    pub time_zone: Tz,
}
