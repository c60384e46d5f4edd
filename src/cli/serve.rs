use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use tokio::{join, signal};
use tokio_util::sync::CancellationToken;

use crate::{
    cli::{home_assistant::HomeAssistantArgs, source::SourceArgs},
    coefficients::CoefficientStore,
    coordinator::Coordinator,
    prelude::*,
    publisher::Publisher,
    watcher::Watcher,
};

#[derive(Parser)]
pub struct ServeArgs {
    #[clap(flatten)]
    home_assistant: HomeAssistantArgs,

    #[clap(flatten)]
    source: SourceArgs,

    /// Recompute period, also the retry period after a failure.
    #[clap(
        long,
        env = "REFRESH_INTERVAL_SECS",
        default_value = "300",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    refresh_interval_secs: u64,

    /// Source entity and coefficient entity polling period.
    #[clap(
        long,
        env = "WATCH_INTERVAL_SECS",
        default_value = "30",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    watch_interval_secs: u64,

    /// Republish period of the derived sensors.
    #[clap(
        long,
        env = "PUBLISH_INTERVAL_SECS",
        default_value = "60",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    publish_interval_secs: u64,

    #[clap(long, env = "SENSOR_PREFIX", default_value = "sensor.ecopower_")]
    sensor_prefix: String,

    /// Mirror `<prefix><coefficient>` entities, for example with `input_number.ecopower_`.
    #[clap(long, env = "COEFFICIENT_ENTITY_PREFIX")]
    coefficient_entity_prefix: Option<String>,
}

impl ServeArgs {
    pub async fn run(self, store: CoefficientStore, coefficients_file: Option<PathBuf>) -> Result {
        let api = Arc::new(self.home_assistant.connect()?);
        let time_zone = self.source.time_zone;

        let coordinator = Coordinator::builder()
            .upstream(Arc::clone(&api))
            .source_entity(self.source.entity_id.clone())
            .source_type(self.source.source_type)
            .time_zone(time_zone)
            .refresh_interval(Duration::from_secs(self.refresh_interval_secs))
            .store(Arc::new(store))
            .maybe_coefficients_file(coefficients_file)
            .build();
        let handle = coordinator.handle();
        let publisher = Publisher::builder()
            .downstream(Arc::clone(&api))
            .snapshots(handle.subscribe())
            .sensor_prefix(self.sensor_prefix)
            .time_zone(time_zone)
            .interval(Duration::from_secs(self.publish_interval_secs))
            .build();
        let watcher = Watcher::builder()
            .upstream(api)
            .handle(handle)
            .source_entity(self.source.entity_id)
            .maybe_coefficient_entity_prefix(self.coefficient_entity_prefix)
            .interval(Duration::from_secs(self.watch_interval_secs))
            .build();

        let cancellation = CancellationToken::new();
        let shutdown = async {
            match signal::ctrl_c().await {
                Ok(()) => info!("shutting down…"),
                Err(error) => error!("failed to listen for the interrupt: {error:#}"),
            }
            cancellation.cancel();
        };
        join!(
            coordinator.run(cancellation.clone()),
            publisher.run(cancellation.clone()),
            watcher.run(cancellation.clone()),
            shutdown,
        );
        Ok(())
    }
}
