use crate::config::SourceConfig;
use crate::error::{FetchError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Parsed provider response; the transformer decodes it into typed structs.
pub type RawPayload = serde_json::Value;

/// Error bodies longer than this are cut before they reach logs.
const MAX_ERROR_BODY: usize = 200;

pub struct Fetcher {
    client: Client,
    base_url: String,
    api_key: String,
    include_air_quality: bool,
}

/// Body WeatherAPI sends alongside 4xx responses.
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    message: String,
}

impl Fetcher {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("weather-etl/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            include_air_quality: true,
        })
    }

    pub fn from_config(source: &SourceConfig) -> Result<Self> {
        let mut fetcher = Self::new(&source.base_url, &source.api_key, source.request_timeout())?;
        fetcher.include_air_quality = source.include_air_quality;
        Ok(fetcher)
    }

    /// Fetch current conditions for `city`.
    ///
    /// Single attempt. Failures are returned to the caller, which decides
    /// whether to skip the city and reports it.
    pub async fn fetch(&self, city: &str) -> std::result::Result<RawPayload, FetchError> {
        match self.fetch_impl(city).await {
            Ok(payload) => Ok(payload),
            Err(e) => {
                debug!("Error fetching data for {}: {}", city, e);
                Err(e)
            }
        }
    }

    async fn fetch_impl(&self, city: &str) -> std::result::Result<RawPayload, FetchError> {
        let url = format!("{}/current.json", self.base_url);
        let aqi = if self.include_air_quality { "yes" } else { "no" };
        debug!("Fetching current weather for {} from {}", city, url);

        let response = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.as_str()), ("q", city), ("aqi", aqi)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let payload: RawPayload = serde_json::from_str(&body)?;
        Ok(payload)
    }
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ProviderErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => truncate_body(body),
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
