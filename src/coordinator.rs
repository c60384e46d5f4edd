//! Refresh cycle scheduling and the snapshot publication.

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bon::bon;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::{
    select,
    sync::{Notify, watch},
    task,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;

use crate::{
    api::home_assistant::EntityState,
    coefficients::{Coefficient, CoefficientStore},
    error::PriceError,
    prelude::*,
    pricing::Coefficients,
    snapshot::Snapshot,
    source::{self, SourceType},
};

/// Source of the upstream price sensor state.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Fetch the current entity state.
    ///
    /// Fails with [`PriceError::UpstreamUnavailable`] when the entity is missing or unavailable.
    async fn fetch(&self, entity_id: &str) -> Result<EntityState>;
}

#[async_trait]
impl<T: Upstream + ?Sized> Upstream for Arc<T> {
    async fn fetch(&self, entity_id: &str) -> Result<EntityState> {
        (**self).fetch(entity_id).await
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, derive_more::Display)]
pub enum Phase {
    Idle,
    Fetching,
    Parsing,
    Computing,
    Published,
    Failed,
}

pub type SnapshotReceiver = watch::Receiver<Option<Arc<Snapshot>>>;

struct Shared {
    store: Arc<CoefficientStore>,
    coefficients_file: Option<PathBuf>,
    coefficients_changed: AtomicBool,
    refresh_requested: Notify,
    snapshot: watch::Sender<Option<Arc<Snapshot>>>,
}

/// Cheap cloneable access to a running coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle(Arc<Shared>);

impl CoordinatorHandle {
    /// Schedule a refresh cycle.
    ///
    /// Requests made while a cycle is running collapse into a single extra cycle.
    pub fn request_refresh(&self) {
        self.0.refresh_requested.notify_one();
    }

    /// Validate and store the coefficient, and schedule a refresh.
    ///
    /// The coordinator saves the coefficients file before the next cycle. Returns the previous value.
    pub fn set_coefficient(&self, coefficient: Coefficient, value: f64) -> Result<f64, PriceError> {
        let previous = self.0.store.set(coefficient, value)?;
        info!(%coefficient, value, previous, "coefficient updated");
        self.0.coefficients_changed.store(true, Ordering::Release);
        self.request_refresh();
        Ok(previous)
    }

    #[must_use]
    pub fn coefficient(&self, coefficient: Coefficient) -> f64 {
        self.0.store.get(coefficient)
    }

    pub fn coefficients(&self) -> Coefficients {
        self.0.store.coefficients()
    }

    #[must_use]
    pub fn subscribe(&self) -> SnapshotReceiver {
        self.0.snapshot.subscribe()
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.0.snapshot.borrow().clone()
    }
}

/// Runs the strictly serialized refresh cycles of one source entity.
pub struct Coordinator<U> {
    upstream: U,
    source_entity: String,
    source_type: SourceType,
    time_zone: Tz,
    refresh_interval: Duration,
    phase: Phase,
    handle: CoordinatorHandle,
}

#[bon]
impl<U: Upstream> Coordinator<U> {
    #[builder]
    pub fn new(
        upstream: U,
        #[builder(into)] source_entity: String,
        #[builder(default)] source_type: SourceType,
        time_zone: Tz,
        #[builder(default = Duration::from_secs(300))] refresh_interval: Duration,
        #[builder(default)] store: Arc<CoefficientStore>,
        coefficients_file: Option<PathBuf>,
    ) -> Self {
        let shared = Shared {
            store,
            coefficients_file,
            coefficients_changed: AtomicBool::new(false),
            refresh_requested: Notify::new(),
            snapshot: watch::Sender::new(None),
        };
        Self {
            upstream,
            source_entity,
            source_type,
            time_zone,
            refresh_interval,
            phase: Phase::Idle,
            handle: CoordinatorHandle(Arc::new(shared)),
        }
    }

    #[must_use]
    pub fn handle(&self) -> CoordinatorHandle {
        self.handle.clone()
    }

    /// Refresh on every tick and on every request until cancelled.
    ///
    /// A cycle in progress is abandoned on cancellation and publishes nothing.
    #[instrument(skip_all, fields(source_entity = %self.source_entity))]
    pub async fn run(mut self, cancellation: CancellationToken) {
        let mut ticker = interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let shared = Arc::clone(&self.handle.0);

        loop {
            select! {
                biased;
                () = cancellation.cancelled() => break,
                _ = ticker.tick() => trace!("tick"),
                () = shared.refresh_requested.notified() => debug!("refresh requested"),
            }
            self.save_coefficients().await;
            let now = Utc::now().with_timezone(&self.time_zone);
            select! {
                biased;
                () = cancellation.cancelled() => {
                    warn!(phase = %self.phase, "abandoned the refresh cycle");
                    break;
                }
                _ = self.refresh(now) => {}
            }
        }
        self.save_coefficients().await;
        info!("stopped");
    }

    /// Write the coefficients file if anything has changed since the last save.
    ///
    /// The write runs on the blocking pool. Failures are logged, the next change retries.
    async fn save_coefficients(&self) {
        let Some(path) = self.handle.0.coefficients_file.clone() else {
            return;
        };
        if !self.handle.0.coefficients_changed.swap(false, Ordering::AcqRel) {
            return;
        }
        let store = Arc::clone(&self.handle.0.store);
        let result = match task::spawn_blocking(move || store.save_to(path)).await {
            Ok(result) => result,
            Err(error) => Err(error.into()),
        };
        if let Err(error) = result {
            warn!("failed to save the coefficients: {error:#}");
        }
    }

    /// Run one refresh cycle as of `now` and return its outcome.
    ///
    /// On failure, the previous snapshot stays published.
    pub async fn refresh(&mut self, now: DateTime<Tz>) -> Phase {
        let outcome = match self.try_refresh(now).await {
            Ok(snapshot) => {
                let current = snapshot.current(now).map(|interval| interval.consumption_price);
                info!(n_intervals = snapshot.intervals.len(), ?current, "publishing");
                self.handle.0.snapshot.send_replace(Some(Arc::new(snapshot)));
                Phase::Published
            }
            Err(error) => {
                error!(phase = %self.phase, "refresh failed: {error:#}");
                Phase::Failed
            }
        };
        self.transition(outcome);
        self.transition(Phase::Idle);
        outcome
    }

    async fn try_refresh(&mut self, now: DateTime<Tz>) -> Result<Snapshot> {
        self.transition(Phase::Fetching);
        let state = self.upstream.fetch(&self.source_entity).await?;
        debug!(entity_id = %state.entity_id, last_updated = %state.last_updated, "fetched");

        self.transition(Phase::Parsing);
        let today = now.date_naive();
        let series = source::parse(&state.attributes, self.source_type, today, self.time_zone)?;

        self.transition(Phase::Computing);
        Ok(Snapshot::compute(
            &self.source_entity,
            &series,
            self.handle.coefficients(),
            today,
            self.time_zone,
        ))
    }

    fn transition(&mut self, to: Phase) {
        trace!(from = %self.phase, %to, "transition");
        self.phase = to;
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;
    use chrono_tz::Europe::Brussels;
    use serde_json::json;
    use tokio::time::sleep;

    use super::*;

    /// Replays the scripted responses and then reports the entity as unavailable.
    #[derive(Default)]
    struct ScriptedUpstream {
        responses: Mutex<VecDeque<EntityState>>,
        n_calls: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl ScriptedUpstream {
        fn new(responses: impl IntoIterator<Item = EntityState>) -> Self {
            Self { responses: Mutex::new(responses.into_iter().collect()), ..Self::default() }
        }
    }

    #[async_trait]
    impl Upstream for ScriptedUpstream {
        async fn fetch(&self, entity_id: &str) -> Result<EntityState> {
            self.n_calls.fetch_add(1, Ordering::SeqCst);
            sleep(self.delay).await;
            let response = self.responses.lock().unwrap().pop_front();
            response.ok_or_else(|| {
                PriceError::UpstreamUnavailable { entity_id: entity_id.to_owned() }.into()
            })
        }
    }

    fn state(attributes: serde_json::Value) -> EntityState {
        EntityState {
            entity_id: "sensor.energi_data_service".to_owned(),
            state: "0.1".to_owned(),
            attributes: attributes.as_object().cloned().unwrap_or_default(),
            last_updated: Utc::now().fixed_offset(),
        }
    }

    fn now() -> DateTime<Tz> {
        Brussels.with_ymd_and_hms(2025, 12, 25, 1, 30, 0).unwrap()
    }

    fn coordinator(upstream: ScriptedUpstream) -> Coordinator<ScriptedUpstream> {
        Coordinator::builder()
            .upstream(upstream)
            .source_entity("sensor.energi_data_service")
            .time_zone(Brussels)
            .build()
    }

    #[tokio::test]
    async fn test_refresh_publishes() {
        let mut coordinator = coordinator(ScriptedUpstream::new([state(json!({
            "today": [0.10, 0.20, 0.30],
            "tomorrow": null,
        }))]));
        let handle = coordinator.handle();
        assert!(handle.snapshot().is_none());

        assert_eq!(coordinator.refresh(now()).await, Phase::Published);
        assert_eq!(coordinator.phase, Phase::Idle);
        let snapshot = handle.snapshot().unwrap();
        assert_eq!(snapshot.intervals.len(), 3);
        assert_eq!(snapshot.source_entity, "sensor.energi_data_service");
        assert_abs_diff_eq!(snapshot.current(now()).unwrap().market_price.0, 0.20);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_snapshot() {
        let mut coordinator = coordinator(ScriptedUpstream::new([
            state(json!({"today": [0.10, 0.20]})),
            state(json!({"friendly_name": "Prices"})),
        ]));
        let handle = coordinator.handle();
        let mut receiver = handle.subscribe();

        assert_eq!(coordinator.refresh(now()).await, Phase::Published);
        assert!(receiver.has_changed().unwrap());
        let before = receiver.borrow_and_update().clone().unwrap();

        // Unsupported format:
        assert_eq!(coordinator.refresh(now()).await, Phase::Failed);
        // Upstream unavailable:
        assert_eq!(coordinator.refresh(now()).await, Phase::Failed);

        assert!(!receiver.has_changed().unwrap());
        let after = handle.snapshot().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(coordinator.phase, Phase::Idle);
    }

    #[tokio::test]
    async fn test_no_prices_for_today_keeps_previous_snapshot() {
        let mut coordinator = coordinator(ScriptedUpstream::new([
            state(json!({"today": [0.10, 0.20]})),
            state(json!({
                "data": [{
                    "start_time": "2025-12-24T12:00:00+01:00",
                    "end_time": "2025-12-24T13:00:00+01:00",
                    "price_per_kwh": 0.3,
                }],
            })),
        ]));
        let handle = coordinator.handle();

        assert_eq!(coordinator.refresh(now()).await, Phase::Published);
        let before = handle.snapshot().unwrap();
        assert_eq!(coordinator.refresh(now()).await, Phase::Failed);
        let after = handle.snapshot().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert!(after.current(now()).is_some());
    }

    #[tokio::test]
    async fn test_set_coefficient() {
        let mut coordinator = coordinator(ScriptedUpstream::new([state(json!({"today": [0.10]}))]));
        let handle = coordinator.handle();

        match handle.set_coefficient(Coefficient::VatRate, f64::NAN) {
            Err(PriceError::InvalidValue { coefficient, .. }) => {
                assert_eq!(coefficient, Coefficient::VatRate);
            }
            result => panic!("NaN is accepted: {result:?}"),
        }
        assert_abs_diff_eq!(handle.coefficient(Coefficient::VatRate), 6.0);

        assert_abs_diff_eq!(handle.set_coefficient(Coefficient::VatRate, 21.0).unwrap(), 6.0);
        assert_eq!(coordinator.refresh(now()).await, Phase::Published);
        let snapshot = handle.snapshot().unwrap();
        assert_abs_diff_eq!(snapshot.coefficients.vat_rate.0, 21.0);
        assert_abs_diff_eq!(
            snapshot.intervals[0].consumption_price.0,
            (0.10 * 1.02 + 0.1272) * 1.21,
            epsilon = 1e-12,
        );
    }

    #[tokio::test]
    async fn test_coefficients_are_saved_by_the_coordinator() -> Result {
        let path = std::env::temp_dir()
            .join(format!("ecopower-coordinator-{}.toml", std::process::id()));
        let coordinator = Coordinator::builder()
            .upstream(ScriptedUpstream::default())
            .source_entity("sensor.energi_data_service")
            .time_zone(Brussels)
            .coefficients_file(path.clone())
            .build();
        let handle = coordinator.handle();

        handle.set_coefficient(Coefficient::VatRate, 21.0)?;
        assert!(!path.exists(), "the handle must not write the file itself");

        coordinator.save_coefficients().await;
        let restored = CoefficientStore::default();
        restored.restore_from(&path)?;
        std::fs::remove_file(&path)?;
        assert_abs_diff_eq!(restored.get(Coefficient::VatRate), 21.0);

        // Nothing has changed since:
        coordinator.save_coefficients().await;
        assert!(!path.exists());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_during_cycle_are_coalesced() {
        let upstream = ScriptedUpstream {
            delay: Duration::from_secs(10),
            ..ScriptedUpstream::new([state(json!({"today": [0.1]})), state(json!({"today": [0.2]}))])
        };
        let n_calls = Arc::clone(&upstream.n_calls);
        let coordinator = Coordinator::builder()
            .upstream(upstream)
            .source_entity("sensor.energi_data_service")
            .time_zone(Brussels)
            .refresh_interval(Duration::from_secs(3600))
            .build();
        let handle = coordinator.handle();
        let cancellation = CancellationToken::new();
        let task = tokio::spawn(coordinator.run(cancellation.clone()));

        // The first tick fires immediately and the cycle is now waiting for the upstream.
        sleep(Duration::from_secs(1)).await;
        assert_eq!(n_calls.load(Ordering::SeqCst), 1);
        for _ in 0..5 {
            handle.request_refresh();
        }

        sleep(Duration::from_secs(60)).await;
        assert_eq!(n_calls.load(Ordering::SeqCst), 2);
        assert_abs_diff_eq!(handle.snapshot().unwrap().intervals[0].market_price.0, 0.2);

        cancellation.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_abandons_the_cycle() {
        let upstream = ScriptedUpstream {
            delay: Duration::from_secs(10),
            ..ScriptedUpstream::new([state(json!({"today": [0.1]}))])
        };
        let coordinator = coordinator(upstream);
        let handle = coordinator.handle();
        let cancellation = CancellationToken::new();
        let task = tokio::spawn(coordinator.run(cancellation.clone()));

        sleep(Duration::from_secs(1)).await;
        cancellation.cancel();
        task.await.unwrap();
        assert!(handle.snapshot().is_none());
    }
}
