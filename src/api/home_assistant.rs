use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use http::StatusCode;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{api::client, coordinator::Upstream, error::PriceError, prelude::*};

/// Home Assistant REST API.
pub struct Api {
    client: Client,
    base_url: Url,
}

impl Api {
    /// `base_url` points to the API root, for example `http://homeassistant.local:8123/api`.
    pub fn try_new(access_token: &str, base_url: Url) -> Result<Self> {
        Ok(Self { client: client::try_new(access_token)?, base_url })
    }

    /// Get the entity state, or `None` if the entity does not exist.
    #[instrument(skip_all, fields(entity_id = entity_id))]
    pub async fn get_state(&self, entity_id: &str) -> Result<Option<EntityState>> {
        let response = self.client.get(self.state_url(entity_id)?).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("not found");
            return Ok(None);
        }
        let state: EntityState = response.error_for_status()?.json().await?;
        trace!(state = %state.state, last_updated = %state.last_updated, "fetched");
        Ok(Some(state))
    }

    /// Create or overwrite the entity state.
    #[instrument(skip_all, fields(entity_id = entity_id, state = %update.state))]
    pub async fn post_state<A: Serialize + Sync>(
        &self,
        entity_id: &str,
        update: &StateUpdate<A>,
    ) -> Result {
        self.client
            .post(self.state_url(entity_id)?)
            .json(update)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("failed to update `{entity_id}`"))?;
        debug!("posted");
        Ok(())
    }

    fn state_url(&self, entity_id: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("invalid base URL"))?
            .pop_if_empty()
            .push("states")
            .push(entity_id);
        Ok(url)
    }
}

#[async_trait]
impl Upstream for Api {
    async fn fetch(&self, entity_id: &str) -> Result<EntityState> {
        Ok(EntityState::available(entity_id, self.get_state(entity_id).await?)?)
    }
}

#[must_use]
#[derive(Clone, Debug, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,

    #[serde(default)]
    pub attributes: Map<String, Value>,

    pub last_updated: DateTime<FixedOffset>,
}

impl EntityState {
    /// Treat a missing entity the same way as an unavailable one.
    pub fn available(entity_id: &str, state: Option<Self>) -> Result<Self, PriceError> {
        match state {
            Some(state) if !state.is_unavailable() => Ok(state),
            _ => Err(PriceError::UpstreamUnavailable { entity_id: entity_id.to_owned() }),
        }
    }

    /// Whether the integration behind the entity is down.
    ///
    /// An `unknown` state may still carry the price attributes.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        self.state == "unavailable"
    }
}

#[must_use]
#[derive(Debug, Serialize)]
pub struct StateUpdate<A> {
    pub state: String,
    pub attributes: A,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_deserialize_entity_state_ok() -> Result {
        // language=JSON
        const RESPONSE: &str = r#"
            {
                "entity_id": "sensor.energi_data_service",
                "state": "0.0568",
                "attributes": {
                    "today": [0.0568, 0.0612],
                    "tomorrow": null,
                    "tomorrow_valid": false,
                    "unit_of_measurement": "EUR/kWh"
                },
                "last_changed": "2025-12-25T00:00:00.326747+00:00",
                "last_reported": "2025-12-25T00:00:00.326747+00:00",
                "last_updated": "2025-12-25T00:00:00.326747+00:00",
                "context": {"id": "01JG", "parent_id": null, "user_id": null}
            }
        "#;
        let state = serde_json::from_str::<EntityState>(RESPONSE)?;
        assert_eq!(state.entity_id, "sensor.energi_data_service");
        assert_eq!(state.state, "0.0568");
        assert!(!state.is_unavailable());
        assert_eq!(state.attributes["today"].as_array().map(Vec::len), Some(2));
        assert_eq!(state.last_updated, chrono::Utc.timestamp_micros(1_766_620_800_326_747).unwrap());
        Ok(())
    }

    #[test]
    fn test_deserialize_unavailable_without_attributes() -> Result {
        // language=JSON
        const RESPONSE: &str = r#"
            {
                "entity_id": "sensor.epex_spot_data_price",
                "state": "unavailable",
                "last_updated": "2025-12-25T10:15:00+01:00"
            }
        "#;
        let state = serde_json::from_str::<EntityState>(RESPONSE)?;
        assert!(state.is_unavailable());
        assert!(state.attributes.is_empty());
        Ok(())
    }

    #[test]
    fn test_available() -> Result {
        let state = |state: &str| -> Result<EntityState> {
            Ok(serde_json::from_value(serde_json::json!({
                "entity_id": "sensor.epex_spot_data_price",
                "state": state,
                "last_updated": "2025-12-25T10:15:00+01:00",
            }))?)
        };
        let entity_id = "sensor.epex_spot_data_price";

        assert_eq!(EntityState::available(entity_id, Some(state("unknown")?))?.state, "unknown");
        match EntityState::available(entity_id, Some(state("unavailable")?)) {
            Err(PriceError::UpstreamUnavailable { entity_id }) => {
                assert_eq!(entity_id, "sensor.epex_spot_data_price");
            }
            result => panic!("unexpected result: {result:?}"),
        }
        assert!(matches!(
            EntityState::available(entity_id, None),
            Err(PriceError::UpstreamUnavailable { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_state_url() -> Result {
        let api = Api::try_new("token", Url::parse("http://homeassistant.local:8123/api/")?)?;
        assert_eq!(
            api.state_url("sensor.ecopower_consumption_price")?.as_str(),
            "http://homeassistant.local:8123/api/states/sensor.ecopower_consumption_price",
        );
        Ok(())
    }

    #[test]
    fn test_serialize_state_update() -> Result {
        let update = StateUpdate { state: "0.2430".to_owned(), attributes: serde_json::json!({}) };
        assert_eq!(serde_json::to_string(&update)?, r#"{"state":"0.2430","attributes":{}}"#);
        Ok(())
    }
}
