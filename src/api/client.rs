use std::time::Duration;

use reqwest::{
    Client,
    header::{HeaderMap, HeaderName, HeaderValue},
};

use crate::prelude::*;

/// Build a client which authenticates with the bearer token.
pub fn try_new(access_token: &str) -> Result<Client> {
    let mut authorization = HeaderValue::from_str(&format!("Bearer {access_token}"))
        .context("the access token is not a valid header value")?;
    authorization.set_sensitive(true);
    let headers = HeaderMap::from_iter([(HeaderName::from_static("authorization"), authorization)]);
    Ok(Client::builder().default_headers(headers).timeout(Duration::from_secs(10)).build()?)
}
