use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::{Client, redirect};

use crate::config::{LocationConfig, mask_token};
use crate::http::{FetchError, with_retry};

use super::types::{Location, LookupResult, RawLocation};

const USER_AGENT: &str = concat!("geolocate/", env!("GEOLOCATE_VERSION"));

#[async_trait]
pub trait LocationLookup: Send + Sync {
    /// Looks up `ip`, or the caller's own address when `ip` is `None`.
    /// Never fails outright: errors come back as [`LookupResult::Failure`].
    async fn lookup(&self, ip: Option<&str>) -> LookupResult;
}

/// Lookup against an HTTP geolocation service of the form
/// `GET {base_url}[/{ip}]?token={api_key}`.
pub struct HttpLocationLookup {
    config: LocationConfig,
}

impl HttpLocationLookup {
    pub fn new(config: LocationConfig) -> Self {
        Self { config }
    }

    /// The IP is appended verbatim; it is not validated.
    pub fn request_url(&self, ip: Option<&str>) -> String {
        match ip {
            Some(ip) if !ip.is_empty() => {
                format!("{}/{}", self.config.base_url.trim_end_matches('/'), ip)
            }
            _ => self.config.base_url.clone(),
        }
    }

    /// One attempt on a client of its own, dropped when the attempt ends.
    async fn fetch_once(
        &self,
        url: &str,
        label: &str,
        attempt: u32,
    ) -> Result<Location, FetchError> {
        info!("Attempt {} to fetch location for IP: {}", attempt, label);

        // Redirects count as non-2xx answers and are never followed
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(self.config.timeout)
            .redirect(redirect::Policy::none())
            .build()?;

        debug!(
            "Requesting {} with token {}",
            url,
            mask_token(&self.config.api_key)
        );

        let response = client
            .get(url)
            .query(&[("token", self.config.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.text().await?;

        let raw: RawLocation =
            serde_json::from_str(&body).map_err(|e| FetchError::InvalidBody(e.to_string()))?;

        raw.into_location()
    }
}

#[async_trait]
impl LocationLookup for HttpLocationLookup {
    #[tracing::instrument(skip(self))]
    async fn lookup(&self, ip: Option<&str>) -> LookupResult {
        let ip = ip.filter(|ip| !ip.is_empty());
        let label = ip.unwrap_or("default");
        let url = self.request_url(ip);

        let outcome = with_retry("Fetching location", &self.config.retry, |attempt| {
            self.fetch_once(&url, label, attempt)
        })
        .await;

        match outcome {
            Ok(location) => {
                info!("Location found for {}: {}", label, location);
                LookupResult::Success(location)
            }
            Err(e) => {
                match &e {
                    FetchError::IncompleteData { .. } => {
                        warn!("Incomplete location data for {}", label)
                    }
                    e if e.is_retryable() => error!(
                        "Failed to fetch location for IP {} after {} attempts.",
                        label,
                        self.config.retry.max_attempts.max(1)
                    ),
                    e => error!("Failed to fetch location for IP {}: {}", label, e),
                }
                LookupResult::failure(format!("Failed to fetch location: {}", e))
            }
        }
    }
}
