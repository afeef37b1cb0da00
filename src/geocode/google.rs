// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Google Geocoding API client.

use super::{GeocodeError, GeocodeProvider, Place};
use crate::config::GeocodeConfig;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    #[serde(default)]
    address_components: Vec<AddressComponent>,
    #[serde(default)]
    formatted_address: String,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct AddressComponent {
    long_name: String,
    short_name: String,
    #[serde(default)]
    types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

impl GeocodeResult {
    fn component(&self, kinds: &[&str]) -> Option<&AddressComponent> {
        self.address_components
            .iter()
            .find(|c| c.types.iter().any(|t| kinds.contains(&t.as_str())))
    }

    /// Map to a place, using `fallback_name` when no city component exists.
    fn to_place(&self, fallback_name: &str, lat: f64, lng: f64) -> Place {
        let name = self
            .component(&["locality", "administrative_area_level_2"])
            .map(|c| c.long_name.clone())
            .unwrap_or_else(|| fallback_name.to_string());
        let state = self
            .component(&["administrative_area_level_1"])
            .map(|c| c.short_name.as_str());
        let country = self
            .component(&["country"])
            .map(|c| c.long_name.clone())
            .unwrap_or_default();

        let mut full_name = name.clone();
        for part in [state, Some(country.as_str())].into_iter().flatten() {
            if !part.is_empty() {
                full_name.push_str(", ");
                full_name.push_str(part);
            }
        }

        Place {
            name,
            country,
            full_name,
            lat,
            lng,
        }
    }
}

impl GeocodeResponse {
    /// Provider-level failures: an error message or a status other than
    /// `OK` / `ZERO_RESULTS`.
    fn check(&self) -> Result<(), GeocodeError> {
        if let Some(message) = &self.error_message {
            return Err(GeocodeError::Provider(message.clone()));
        }
        match self.status.as_str() {
            "OK" | "ZERO_RESULTS" => Ok(()),
            "REQUEST_DENIED" => Err(GeocodeError::Provider(
                "API request denied. Please check your API key and enable Geocoding API."
                    .to_string(),
            )),
            other => Err(GeocodeError::Status(other.to_string())),
        }
    }

    fn into_places(self, max_results: usize) -> Result<Vec<Place>, GeocodeError> {
        self.check()?;
        Ok(self
            .results
            .iter()
            .take(max_results)
            .map(|r| {
                let fallback = r.formatted_address.split(',').next().unwrap_or_default();
                r.to_place(fallback.trim(), r.geometry.location.lat, r.geometry.location.lng)
            })
            .collect())
    }

    fn into_place(self, unknown_label: &str, lat: f64, lng: f64) -> Result<Place, GeocodeError> {
        self.check()?;
        let first = self
            .results
            .first()
            .ok_or_else(|| GeocodeError::Status(self.status.clone()))?;
        Ok(first.to_place(unknown_label, lat, lng))
    }
}

/// Geocoding provider backed by the Google Maps Geocoding API.
pub struct GoogleGeocoder {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
    language: String,
    max_results: usize,
    unknown_label: String,
}

impl GoogleGeocoder {
    /// Build a client from configuration, or `None` without an API key.
    pub fn from_config(config: &GeocodeConfig) -> Result<Option<Self>, GeocodeError> {
        let Some(api_key) = config.api_key.clone().filter(|k| !k.is_empty()) else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Some(Self {
            client,
            endpoint: Url::parse(&config.endpoint)?,
            api_key,
            language: config.language.clone(),
            max_results: config.max_results,
            unknown_label: config.unknown_location_label.clone(),
        }))
    }

    fn request_url(&self, param: (&str, &str)) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair(param.0, param.1)
            .append_pair("language", &self.language)
            .append_pair("key", &self.api_key);
        url
    }

    async fn fetch(&self, url: Url) -> Result<GeocodeResponse, GeocodeError> {
        let response = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<GeocodeResponse>()
            .await?;
        if response.status != "OK" {
            debug!(status = %response.status, "Geocoding provider returned non-OK status");
        }
        Ok(response)
    }
}

#[async_trait]
impl GeocodeProvider for GoogleGeocoder {
    async fn forward_search(&self, query: &str) -> Result<Vec<Place>, GeocodeError> {
        let response = self.fetch(self.request_url(("address", query))).await?;
        response.into_places(self.max_results).inspect_err(|e| {
            warn!(query = %query, error = %e, "Forward geocoding rejected by provider");
        })
    }

    async fn reverse(&self, lat: f64, lng: f64) -> Result<Place, GeocodeError> {
        let latlng = format!("{lat},{lng}");
        let response = self.fetch(self.request_url(("latlng", &latlng))).await?;
        response.into_place(&self.unknown_label, lat, lng)
    }
}
