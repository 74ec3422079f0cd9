//! Reverse geocoding of note coordinates.
//!
//! Notes taken on a phone carry latitude/longitude. The header shows a
//! `city country` place name for them, looked up from a Nominatim-compatible
//! service. Lookups are serialized and spaced out to respect the service's
//! usage policy.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};
use url::Url;

use nsxconv_shared::{ConvertError, GeocodingConfig, Result};

/// User-Agent string for geocoding requests.
const USER_AGENT: &str = concat!("nsxconv/", env!("CARGO_PKG_VERSION"));

/// Language requested for place names.
const LANGUAGE: &str = "en";

// ---------------------------------------------------------------------------
// Place
// ---------------------------------------------------------------------------

/// The parts of an address shown in a note header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Place {
    pub city: Option<String>,
    pub country: Option<String>,
}

impl Place {
    /// `city country`, skipping missing parts. `None` when both are missing.
    pub fn display_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.city.as_deref(), self.country.as_deref()]
            .into_iter()
            .flatten()
            .filter(|p| !p.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Resolves coordinates to a [`Place`].
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, lat: f64, lon: f64) -> Result<Place>;
}

// ---------------------------------------------------------------------------
// Nominatim
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    #[serde(default)]
    address: Option<NominatimAddress>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    country: Option<String>,
}

impl From<NominatimAddress> for Place {
    fn from(address: NominatimAddress) -> Self {
        Self {
            city: address.city.or(address.town).or(address.village),
            country: address.country,
        }
    }
}

/// Nominatim client that waits at least `min_delay` between two lookups.
#[derive(Debug)]
pub struct NominatimGeocoder {
    client: Client,
    endpoint: Url,
    min_delay: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocodingConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            ConvertError::config(format!("invalid geocoding endpoint {}: {e}", config.endpoint))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConvertError::Geocode(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            min_delay: Duration::from_millis(config.min_delay_ms),
            last_call: Mutex::new(None),
        })
    }

    fn request_url(&self, lat: f64, lon: f64) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("format", "jsonv2")
            .append_pair("lat", &lat.to_string())
            .append_pair("lon", &lon.to_string())
            .append_pair("accept-language", LANGUAGE);
        url
    }

    async fn fetch(&self, lat: f64, lon: f64) -> Result<Place> {
        let url = self.request_url(lat, lon);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ConvertError::Geocode(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConvertError::Geocode(format!("{url}: HTTP {status}")));
        }

        let body: NominatimResponse = response
            .json()
            .await
            .map_err(|e| ConvertError::Geocode(format!("{url}: invalid response: {e}")))?;

        if let Some(error) = body.error {
            return Err(ConvertError::Geocode(error));
        }

        let address = body
            .address
            .ok_or_else(|| ConvertError::Geocode("response has no address".into()))?;
        Ok(Place::from(address))
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    #[instrument(skip(self))]
    async fn reverse(&self, lat: f64, lon: f64) -> Result<Place> {
        let mut last_call = self.last_call.lock().await;

        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.min_delay {
                tokio::time::sleep(self.min_delay - elapsed).await;
            }
        }

        let result = self.fetch(lat, lon).await;
        *last_call = Some(Instant::now());

        if let Ok(place) = &result {
            debug!(?place, "reverse geocoded");
        }
        result
    }
}
