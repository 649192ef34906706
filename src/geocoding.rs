//! Address lookups against the Google Geocoding API.

use async_trait::async_trait;
use lambda_runtime::tracing;
use serde::Deserialize;

use crate::error::ProxyError;

#[derive(Clone, Debug, PartialEq)]
pub struct Geocoded {
    pub latitude: f64,
    pub longitude: f64,
    pub formatted_address: Option<String>,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str, api_key: &str) -> Result<Geocoded, ProxyError>;
}

#[derive(Debug, Deserialize)]
pub struct GeocodeReply {
    status: String,

    #[serde(default)]
    error_message: Option<String>,

    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    #[serde(default)]
    formatted_address: Option<String>,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

impl GeocodeReply {
    /// The first result, provided Google said `OK` and actually gave us one.
    pub fn into_geocoded(self) -> Result<Geocoded, ProxyError> {
        if self.status != "OK" {
            return Err(ProxyError::Geocoding {
                status: self.status,
                message: self
                    .error_message
                    .unwrap_or_else(|| "unknown error".to_owned()),
            });
        }

        let first = self
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ProxyError::Geocoding {
                status: "OK".to_owned(),
                message: "no results".to_owned(),
            })?;

        Ok(Geocoded {
            latitude: first.geometry.location.lat,
            longitude: first.geometry.location.lng,
            formatted_address: first.formatted_address,
        })
    }
}

#[derive(Clone, Debug)]
pub struct GoogleGeocoder {
    http: reqwest::Client,
    endpoint: String,
}

impl GoogleGeocoder {
    pub fn new<S: Into<String>>(http: reqwest::Client, endpoint: S) -> Self {
        GoogleGeocoder {
            http,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode(&self, address: &str, api_key: &str) -> Result<Geocoded, ProxyError> {
        // Google reports most failures (bad key, quota, no match) in the
        // `status` field of a 200 reply, so the HTTP status is mostly noise.
        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[("address", address), ("key", api_key)])
            .send()
            .await?;

        let http_status = resp.status();
        let text = resp.text().await?;

        let reply: GeocodeReply = serde_json::from_str(&text).map_err(|_| ProxyError::Geocoding {
            status: http_status.as_u16().to_string(),
            message: "unreadable reply from geocoding service".to_owned(),
        })?;

        let geocoded = reply.into_geocoded()?;
        tracing::info!(
            "address geocoded: lat {}, lng {}",
            geocoded.latitude,
            geocoded.longitude
        );
        Ok(geocoded)
    }
}
