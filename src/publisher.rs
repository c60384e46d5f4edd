use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bon::Builder;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::{
    select,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;

use crate::{
    api::home_assistant::{Api, StateUpdate},
    coordinator::SnapshotReceiver,
    prelude::*,
    pricing::PriceKind,
    snapshot::{SensorAttributes, Snapshot},
};

/// Destination of the derived sensor states.
#[async_trait]
pub trait Downstream: Send + Sync {
    async fn post(&self, entity_id: &str, update: &StateUpdate<SensorState<'_>>) -> Result;
}

#[async_trait]
impl Downstream for Api {
    async fn post(&self, entity_id: &str, update: &StateUpdate<SensorState<'_>>) -> Result {
        self.post_state(entity_id, update).await
    }
}

#[async_trait]
impl<T: Downstream + ?Sized> Downstream for Arc<T> {
    async fn post(&self, entity_id: &str, update: &StateUpdate<SensorState<'_>>) -> Result {
        (**self).post(entity_id, update).await
    }
}

/// Pushes the derived price sensors to Home Assistant.
#[derive(Builder)]
pub struct Publisher<D> {
    downstream: D,
    snapshots: SnapshotReceiver,

    /// Entity ID prefix, for example `sensor.ecopower_`.
    #[builder(into)]
    sensor_prefix: String,

    time_zone: Tz,

    /// Republish period, so that the state follows the current interval.
    #[builder(into)]
    interval: Duration,
}

impl<D: Downstream> Publisher<D> {
    #[instrument(skip_all, fields(sensor_prefix = %self.sensor_prefix))]
    pub async fn run(mut self, cancellation: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            select! {
                biased;
                () = cancellation.cancelled() => break,
                result = self.snapshots.changed() => {
                    if result.is_err() {
                        warn!("the coordinator is gone");
                        break;
                    }
                    debug!("new snapshot");
                }
                _ = ticker.tick() => trace!("tick"),
            }
            let snapshot = self.snapshots.borrow_and_update().clone();
            if let Some(snapshot) = snapshot {
                self.publish(&snapshot, Utc::now().with_timezone(&self.time_zone)).await;
            }
        }
        info!("stopped");
    }

    /// Publish both sensors. Failures are only logged: the next snapshot or tick retries.
    async fn publish(&self, snapshot: &Snapshot, now: DateTime<Tz>) {
        for kind in PriceKind::ALL {
            let entity_id = self.entity_id(kind);
            let update = sensor_update(snapshot, kind, now);
            if let Err(error) = self.downstream.post(&entity_id, &update).await {
                warn!(%entity_id, "failed to publish: {error:#}");
            }
        }
    }

    fn entity_id(&self, kind: PriceKind) -> String {
        format!("{}{}_price", self.sensor_prefix, kind.name())
    }
}

#[derive(Serialize)]
pub struct SensorState<'a> {
    #[serde(flatten)]
    prices: SensorAttributes<'a>,

    unit_of_measurement: &'static str,
    device_class: &'static str,
    state_class: &'static str,
    friendly_name: &'static str,
    icon: &'static str,
}

/// Sensor state with the current price, `unknown` if no interval covers the moment.
pub fn sensor_update<'a>(
    snapshot: &'a Snapshot,
    kind: PriceKind,
    now: DateTime<Tz>,
) -> StateUpdate<SensorState<'a>> {
    let state = snapshot
        .current(now)
        .map_or_else(|| "unknown".to_owned(), |interval| format!("{:.4}", interval.price(kind).0));
    let (friendly_name, icon) = match kind {
        PriceKind::Consumption => ("Ecopower consumption price", "mdi:home-lightning-bolt"),
        PriceKind::Injection => ("Ecopower injection price", "mdi:solar-power"),
    };
    StateUpdate {
        state,
        attributes: SensorState {
            prices: snapshot.attributes(kind),
            unit_of_measurement: "€/kWh",
            device_class: "monetary",
            state_class: "measurement",
            friendly_name,
            icon,
        },
    }
}
