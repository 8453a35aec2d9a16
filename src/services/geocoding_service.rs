use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::Coordinates;

const METERS_PER_MILE: f64 = 1609.344;

/// Dirección geocodificada
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeocodedAddress {
    pub coordinates: Coordinates,
    pub formatted_address: Option<String>,
}

/// Distancia de conducción entre dos puntos
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistanceEstimate {
    pub text: String,
    pub miles: f64,
    pub seconds: i64,
}

/// Proveedor de geocoding y direcciones.
///
/// Los fallos nunca se propagan: devuelven `None` ("desconocido").
#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    async fn geocode(&self, address: &str) -> Option<GeocodedAddress>;

    async fn distance(&self, from: Coordinates, to: Coordinates) -> Option<DistanceEstimate>;
}

/// Proveedor usado cuando no hay MAPBOX_TOKEN configurado
pub struct DisabledGeocoder;

#[async_trait]
impl GeocodingProvider for DisabledGeocoder {
    async fn geocode(&self, address: &str) -> Option<GeocodedAddress> {
        log::debug!("Geocoding deshabilitado, se ignora: {}", address);
        None
    }

    async fn distance(&self, _from: Coordinates, _to: Coordinates) -> Option<DistanceEstimate> {
        None
    }
}

#[derive(Debug, Deserialize)]
struct MapboxGeocodingResponse {
    features: Vec<MapboxFeature>,
}

#[derive(Debug, Deserialize)]
struct MapboxFeature {
    geometry: MapboxGeometry,
    properties: MapboxProperties,
}

#[derive(Debug, Deserialize)]
struct MapboxGeometry {
    coordinates: Vec<f64>, // [longitude, latitude]
}

#[derive(Debug, Deserialize)]
struct MapboxProperties {
    full_address: Option<String>,
    name: Option<String>,
    place_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MapboxDirectionsResponse {
    code: String,
    #[serde(default)]
    routes: Vec<MapboxDirectionsRoute>,
}

#[derive(Debug, Deserialize)]
struct MapboxDirectionsRoute {
    distance: f64, // metros
    duration: f64, // segundos
}

pub struct MapboxGeocoder {
    mapbox_token: String,
    client: reqwest::Client,
}

impl MapboxGeocoder {
    pub fn new(mapbox_token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            mapbox_token,
            client,
        })
    }

    async fn geocode_address(&self, address: &str) -> Result<Option<GeocodedAddress>> {
        log::info!("🗺️ Geocoding address: {}", address);

        let url = format!(
            "https://api.mapbox.com/search/geocode/v6/forward?q={}&access_token={}&limit=1",
            urlencoding::encode(address),
            self.mapbox_token
        );

        let response = self
            .client
            .get(&url)
            .header("User-Agent", "RouteExecution/1.0")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Geocoding failed with status {}: {}", status, error_text));
        }

        let mapbox_response: MapboxGeocodingResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse geocoding response: {}", e))?;

        Ok(mapbox_response.features.into_iter().next().and_then(parse_feature))
    }

    async fn driving_distance(&self, from: Coordinates, to: Coordinates) -> Result<Option<DistanceEstimate>> {
        let url = format!(
            "https://api.mapbox.com/directions/v5/mapbox/driving/{},{};{},{}?overview=false&access_token={}",
            from.longitude, from.latitude, to.longitude, to.latitude, self.mapbox_token
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Directions failed with status {}", status));
        }

        let directions: MapboxDirectionsResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse directions response: {}", e))?;

        parse_directions(directions)
    }
}

#[async_trait]
impl GeocodingProvider for MapboxGeocoder {
    async fn geocode(&self, address: &str) -> Option<GeocodedAddress> {
        match self.geocode_address(address).await {
            Ok(Some(geocoded)) => {
                log::info!(
                    "✅ Geocoding successful: {} -> ({}, {})",
                    address,
                    geocoded.coordinates.latitude,
                    geocoded.coordinates.longitude
                );
                Some(geocoded)
            }
            Ok(None) => {
                log::warn!("⚠️ No coordinates found for address: {}", address);
                None
            }
            Err(e) => {
                log::error!("❌ Geocoding error for '{}': {}", address, e);
                None
            }
        }
    }

    async fn distance(&self, from: Coordinates, to: Coordinates) -> Option<DistanceEstimate> {
        match self.driving_distance(from, to).await {
            Ok(estimate) => estimate,
            Err(e) => {
                log::error!("❌ Directions error: {}", e);
                None
            }
        }
    }
}

fn parse_feature(feature: MapboxFeature) -> Option<GeocodedAddress> {
    if feature.geometry.coordinates.len() < 2 {
        return None;
    }
    let longitude = feature.geometry.coordinates[0];
    let latitude = feature.geometry.coordinates[1];

    let properties = feature.properties;
    let formatted_address = properties
        .full_address
        .or(properties.place_name)
        .or(properties.name);

    Some(GeocodedAddress {
        coordinates: Coordinates { latitude, longitude },
        formatted_address,
    })
}

/// Primera ruta de la respuesta; `code` distinto de "Ok" es un error
fn parse_directions(directions: MapboxDirectionsResponse) -> Result<Option<DistanceEstimate>> {
    if directions.code != "Ok" {
        return Err(anyhow!("Directions returned code {}", directions.code));
    }

    Ok(directions
        .routes
        .first()
        .map(|route| estimate_from_meters(route.distance, route.duration)))
}

fn estimate_from_meters(meters: f64, seconds: f64) -> DistanceEstimate {
    let miles = meters / METERS_PER_MILE;
    DistanceEstimate {
        text: format!("{:.1} mi", miles),
        miles,
        seconds: seconds.round() as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feature_takes_lon_lat_order() {
        let body = r#"{
            "features": [{
                "geometry": { "coordinates": [2.3522, 48.8566] },
                "properties": { "full_address": "Paris, France", "name": "Paris" }
            }]
        }"#;
        let response: MapboxGeocodingResponse = serde_json::from_str(body).unwrap();
        let geocoded = response.features.into_iter().next().and_then(parse_feature).unwrap();

        assert_eq!(geocoded.coordinates.latitude, 48.8566);
        assert_eq!(geocoded.coordinates.longitude, 2.3522);
        assert_eq!(geocoded.formatted_address.as_deref(), Some("Paris, France"));
    }

    #[test]
    fn test_estimate_from_meters() {
        let estimate = estimate_from_meters(16093.44, 900.4);
        assert!((estimate.miles - 10.0).abs() < 1e-9);
        assert_eq!(estimate.text, "10.0 mi");
        assert_eq!(estimate.seconds, 900);
    }

    #[test]
    fn test_parse_directions_takes_first_route() {
        let body = r#"{
            "code": "Ok",
            "routes": [
                { "distance": 8046.72, "duration": 612.6, "weight": 640.1 },
                { "distance": 9500.0, "duration": 700.0, "weight": 720.0 }
            ],
            "waypoints": []
        }"#;
        let directions: MapboxDirectionsResponse = serde_json::from_str(body).unwrap();
        let estimate = parse_directions(directions).unwrap().unwrap();

        assert!((estimate.miles - 5.0).abs() < 1e-9);
        assert_eq!(estimate.text, "5.0 mi");
        assert_eq!(estimate.seconds, 613);
    }

    #[test]
    fn test_parse_directions_without_route() {
        let directions: MapboxDirectionsResponse =
            serde_json::from_str(r#"{ "code": "NoRoute", "message": "No route found" }"#).unwrap();
        assert!(parse_directions(directions).is_err());

        let directions: MapboxDirectionsResponse =
            serde_json::from_str(r#"{ "code": "Ok", "routes": [] }"#).unwrap();
        assert!(parse_directions(directions).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disabled_geocoder_is_unknown() {
        let geocoder = DisabledGeocoder;
        assert!(geocoder.geocode("15 Rue de la Paix, 75001 Paris").await.is_none());
        let a = Coordinates { latitude: 48.85, longitude: 2.35 };
        assert!(geocoder.distance(a, a).await.is_none());
    }

    #[tokio::test]
    async fn test_mapbox_geocoder() {
        // Requiere un token válido de Mapbox
        let token = std::env::var("MAPBOX_TOKEN").unwrap_or_default();
        if token.is_empty() {
            println!("⚠️ Skipping test: MAPBOX_TOKEN not set");
            return;
        }

        let geocoder = MapboxGeocoder::new(token).unwrap();
        if let Some(geocoded) = geocoder.geocode("15 Rue de la Paix, 75001 Paris").await {
            assert!(geocoded.coordinates.latitude > 48.0);
        }
    }
}
