use clap::Parser;
use reqwest::Url;

use crate::{api::home_assistant::Api, prelude::*};

#[derive(Parser)]
pub struct HomeAssistantArgs {
    /// API root, for example `http://homeassistant.local:8123/api`.
    #[clap(long = "home-assistant-api-base-url", env = "HOME_ASSISTANT_API_BASE_URL")]
    base_url: Url,

    /// Long-lived access token.
    #[clap(
        long = "home-assistant-access-token",
        env = "HOME_ASSISTANT_ACCESS_TOKEN",
        hide_env_values = true
    )]
    access_token: String,
}

impl HomeAssistantArgs {
    pub fn connect(&self) -> Result<Api> {
        Api::try_new(&self.access_token, self.base_url.clone())
    }
}
