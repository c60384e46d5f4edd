use std::{collections::BTreeMap, time::Duration};

use bon::Builder;
use chrono::{DateTime, FixedOffset};
use tokio::{
    select,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;

use crate::{
    coefficients::Coefficient,
    coordinator::{CoordinatorHandle, Upstream},
    prelude::*,
};

/// Polls Home Assistant for the source entity changes and the coefficient entities.
#[derive(Builder)]
pub struct Watcher<U> {
    upstream: U,
    handle: CoordinatorHandle,

    #[builder(into)]
    source_entity: String,

    /// Mirror `<prefix><coefficient>` entities, for example `input_number.ecopower_vat_rate`.
    #[builder(into)]
    coefficient_entity_prefix: Option<String>,

    #[builder(into)]
    interval: Duration,

    #[builder(skip)]
    last_updated: Option<DateTime<FixedOffset>>,

    /// Last seen state of each mirrored coefficient entity.
    #[builder(skip)]
    mirrored: BTreeMap<Coefficient, String>,
}

impl<U: Upstream> Watcher<U> {
    #[instrument(skip_all, fields(source_entity = %self.source_entity))]
    pub async fn run(mut self, cancellation: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            select! {
                biased;
                () = cancellation.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.poll_source().await;
            self.poll_coefficients().await;
        }
        info!("stopped");
    }

    /// Request a refresh when the source entity has been updated since the last poll.
    async fn poll_source(&mut self) -> bool {
        let last_updated = match self.upstream.fetch(&self.source_entity).await {
            Ok(state) => state.last_updated,
            Err(error) => {
                warn!("failed to poll the source: {error:#}");
                return false;
            }
        };
        if self.last_updated.replace(last_updated) == Some(last_updated) {
            return false;
        }
        info!(%last_updated, "the source has been updated");
        self.handle.request_refresh();
        true
    }

    /// Apply the changed coefficient entities and return the number of the accepted values.
    async fn poll_coefficients(&mut self) -> usize {
        let Some(prefix) = self.coefficient_entity_prefix.clone() else {
            return 0;
        };
        let mut n_accepted = 0;
        for coefficient in Coefficient::all() {
            let entity_id = format!("{prefix}{coefficient}");
            let state = match self.upstream.fetch(&entity_id).await {
                Ok(state) => state.state,
                Err(error) => {
                    debug!(%entity_id, "skipped: {error:#}");
                    continue;
                }
            };
            if self.mirrored.get(&coefficient) == Some(&state) {
                continue;
            }
            self.mirrored.insert(coefficient, state.clone());
            let value = match state.parse::<f64>() {
                Ok(value) => value,
                Err(error) => {
                    warn!(%entity_id, %state, "not a number: {error}");
                    continue;
                }
            };
            #[allow(clippy::float_cmp)]
            let is_unchanged = self.handle.coefficient(coefficient) == value;
            if is_unchanged {
                continue;
            }
            match self.handle.set_coefficient(coefficient, value) {
                Ok(_) => n_accepted += 1,
                Err(error) => warn!(%entity_id, "rejected: {error:#}"),
            }
        }
        n_accepted
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use approx::assert_abs_diff_eq;
    use async_trait::async_trait;
    use chrono::{TimeDelta, Utc};
    use chrono_tz::Europe::Brussels;

    use tokio::time::sleep;

    use super::*;
    use crate::{api::home_assistant::EntityState, coordinator::Coordinator, error::PriceError};

    #[derive(Default)]
    struct FakeHomeAssistant(Mutex<HashMap<String, EntityState>>);

    impl FakeHomeAssistant {
        fn set(&self, entity_id: &str, state: &str, last_updated: DateTime<FixedOffset>) {
            let state = EntityState {
                entity_id: entity_id.to_owned(),
                state: state.to_owned(),
                attributes: serde_json::Map::new(),
                last_updated,
            };
            self.0.lock().unwrap().insert(entity_id.to_owned(), state);
        }
    }

    #[async_trait]
    impl Upstream for FakeHomeAssistant {
        async fn fetch(&self, entity_id: &str) -> Result<EntityState> {
            let state = self.0.lock().unwrap().get(entity_id).cloned();
            state.ok_or_else(|| {
                PriceError::UpstreamUnavailable { entity_id: entity_id.to_owned() }.into()
            })
        }
    }

    fn watcher(
        home_assistant: &Arc<FakeHomeAssistant>,
        coefficient_entity_prefix: Option<&str>,
    ) -> Watcher<Arc<FakeHomeAssistant>> {
        let coordinator = Coordinator::builder()
            .upstream(Arc::clone(home_assistant))
            .source_entity("sensor.epex_spot_data_price")
            .time_zone(Brussels)
            .build();
        Watcher::builder()
            .upstream(Arc::clone(home_assistant))
            .handle(coordinator.handle())
            .source_entity("sensor.epex_spot_data_price")
            .maybe_coefficient_entity_prefix(coefficient_entity_prefix)
            .interval(Duration::from_secs(30))
            .build()
    }

    #[tokio::test]
    async fn test_poll_source() {
        let home_assistant = Arc::new(FakeHomeAssistant::default());
        let mut watcher = watcher(&home_assistant, None);
        assert!(!watcher.poll_source().await, "the entity does not exist yet");

        let last_updated = Utc::now().fixed_offset();
        home_assistant.set("sensor.epex_spot_data_price", "0.1", last_updated);
        assert!(watcher.poll_source().await);
        assert!(!watcher.poll_source().await);

        let last_updated = last_updated + TimeDelta::minutes(15);
        home_assistant.set("sensor.epex_spot_data_price", "0.2", last_updated);
        assert!(watcher.poll_source().await);
        assert_eq!(watcher.poll_coefficients().await, 0);
    }

    #[tokio::test]
    async fn test_poll_coefficients() {
        let home_assistant = Arc::new(FakeHomeAssistant::default());
        let mut watcher = watcher(&home_assistant, Some("input_number.ecopower_"));
        let now = Utc::now().fixed_offset();
        home_assistant.set("input_number.ecopower_vat_rate", "21.0", now);
        home_assistant.set("input_number.ecopower_excise_tax", "5.0", now);
        home_assistant.set("input_number.ecopower_supplier_cost", "unknown", now);

        assert_eq!(watcher.poll_coefficients().await, 1);
        assert_abs_diff_eq!(watcher.handle.coefficient(Coefficient::VatRate), 21.0);
        assert_abs_diff_eq!(watcher.handle.coefficient(Coefficient::ExciseTax), 0.0475);
        assert_abs_diff_eq!(watcher.handle.coefficient(Coefficient::SupplierCost), 0.004);

        // Unchanged states are not applied again:
        assert_eq!(watcher.poll_coefficients().await, 0);

        home_assistant.set("input_number.ecopower_excise_tax", "0.05", now);
        assert_eq!(watcher.poll_coefficients().await, 1);
        assert_abs_diff_eq!(watcher.handle.coefficient(Coefficient::ExciseTax), 0.05);

        // A changed state with the same value is not a change:
        home_assistant.set("input_number.ecopower_excise_tax", "0.0500", now);
        assert_eq!(watcher.poll_coefficients().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_mirrors_until_cancelled() {
        let home_assistant = Arc::new(FakeHomeAssistant::default());
        let watcher = watcher(&home_assistant, Some("input_number.ecopower_"));
        let handle = watcher.handle.clone();
        let cancellation = CancellationToken::new();
        let task = tokio::spawn(watcher.run(cancellation.clone()));

        sleep(Duration::from_secs(1)).await;
        assert_abs_diff_eq!(handle.coefficient(Coefficient::VatRate), 6.0);

        home_assistant.set("input_number.ecopower_vat_rate", "21", Utc::now().fixed_offset());
        sleep(Duration::from_secs(30)).await;
        assert_abs_diff_eq!(handle.coefficient(Coefficient::VatRate), 21.0);

        cancellation.cancel();
        task.await.unwrap();
    }
}
