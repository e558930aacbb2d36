use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::cache::GeocodeCache;
use crate::config::AppConfig;

/// Classified, non-propagating geocode failures. Every class resolves to
/// "no coordinates this run"; the row stays eligible for retry on the next
/// pipeline run because failures are never cached.
#[derive(Debug, Error)]
pub enum GeocodeFailure {
    #[error("geocoding request timed out")]
    Timeout,
    #[error("geocoding service unavailable")]
    Unavailable,
    #[error("geocoding service error: {0}")]
    ServiceError(String),
    #[error("geocoder returned no location")]
    NoResult,
}

impl GeocodeFailure {
    pub fn class(&self) -> &'static str {
        match self {
            GeocodeFailure::Timeout => "timeout",
            GeocodeFailure::Unavailable => "unavailable",
            GeocodeFailure::ServiceError(_) => "service_error",
            GeocodeFailure::NoResult => "no_result",
        }
    }
}

#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<(f64, f64), GeocodeFailure>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Blank,
    Cache,
    Provider,
    Failed,
}

#[derive(Debug, Clone, Copy)]
pub struct Resolution {
    pub coordinates: Option<(f64, f64)>,
    pub source: ResolutionSource,
}

impl Resolution {
    fn blank() -> Self {
        Self {
            coordinates: None,
            source: ResolutionSource::Blank,
        }
    }
}

/// Cache-aside front for the external geocoding provider. Requests are issued
/// strictly sequentially with a minimum spacing between them; the provider's
/// usage policy forbids parallel calls.
pub struct Geocoder {
    provider: Arc<dyn GeocodeProvider>,
    rate_limiter: RateLimiter,
}

impl Geocoder {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            provider: Arc::new(NominatimClient::new(config)),
            rate_limiter: RateLimiter::new(Duration::from_millis(config.geocoder_min_delay_ms)),
        }
    }

    pub fn with_provider(provider: Arc<dyn GeocodeProvider>, min_delay: Duration) -> Self {
        Self {
            provider,
            rate_limiter: RateLimiter::new(min_delay),
        }
    }

    /// Resolves an address to coordinates. Blank input short-circuits without
    /// touching the cache or the provider. Nothing here aborts the batch:
    /// provider failures resolve to `None`, a cache read fault is treated as
    /// a miss, and a cache write fault leaves the result uncached for the
    /// next run.
    pub async fn resolve(&self, cache: &GeocodeCache, address: &str) -> Resolution {
        let address = address.trim();
        if address.is_empty() {
            return Resolution::blank();
        }

        match cache.get(address) {
            Ok(Some(coords)) => {
                debug!(address, "geocode cache hit");
                return Resolution {
                    coordinates: Some(coords),
                    source: ResolutionSource::Cache,
                };
            }
            Ok(None) => {}
            Err(err) => warn!(address, %err, "geocode cache read failed; querying provider"),
        }

        self.rate_limiter.wait().await;
        match self.provider.geocode(address).await {
            Ok((lat, lon)) => {
                if let Err(err) = cache.put(address, lat, lon) {
                    warn!(address, %err, "geocode cache write failed; result not cached");
                }
                Resolution {
                    coordinates: Some((lat, lon)),
                    source: ResolutionSource::Provider,
                }
            }
            Err(failure) => {
                warn!(address, class = failure.class(), %failure, "geocoding failed");
                Resolution {
                    coordinates: None,
                    source: ResolutionSource::Failed,
                }
            }
        }
    }
}

struct RateLimiter {
    min_interval: Duration,
    last_tick: AsyncMutex<Option<Instant>>,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_tick: AsyncMutex::new(None),
        }
    }

    async fn wait(&self) {
        let mut guard = self.last_tick.lock().await;
        if let Some(prev) = *guard {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *guard = Some(Instant::now());
    }
}

/// Free-text search client for a Nominatim-compatible endpoint.
struct NominatimClient {
    http: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

impl NominatimClient {
    fn new(config: &AppConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(config.geocoder_user_agent.clone())
            .timeout(Duration::from_secs(config.geocoder_timeout_secs))
            .build()
            .expect("geocoder http client");
        Self {
            http,
            endpoint: config.geocoder_endpoint.clone(),
        }
    }

    fn classify(err: reqwest::Error) -> GeocodeFailure {
        if err.is_timeout() {
            GeocodeFailure::Timeout
        } else if err.is_connect() {
            GeocodeFailure::Unavailable
        } else {
            GeocodeFailure::ServiceError(err.to_string())
        }
    }
}

#[async_trait]
impl GeocodeProvider for NominatimClient {
    async fn geocode(&self, address: &str) -> Result<(f64, f64), GeocodeFailure> {
        let url = format!("{}/search", self.endpoint);
        let response = self
            .http
            .get(&url)
            .query(&[("q", address), ("format", "jsonv2"), ("limit", "1")])
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(GeocodeFailure::Unavailable);
        }
        if !status.is_success() {
            return Err(GeocodeFailure::ServiceError(format!(
                "unexpected status {status}"
            )));
        }

        let places: Vec<NominatimPlace> = response.json().await.map_err(Self::classify)?;
        let place = places.into_iter().next().ok_or(GeocodeFailure::NoResult)?;

        let lat = place.lat.parse::<f64>();
        let lon = place.lon.parse::<f64>();
        match (lat, lon) {
            (Ok(lat), Ok(lon)) => Ok((lat, lon)),
            _ => Err(GeocodeFailure::ServiceError(
                "malformed coordinates in response".into(),
            )),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::ScriptedProvider;
    use super::*;

    fn geocoder(provider: Arc<ScriptedProvider>) -> Geocoder {
        Geocoder::with_provider(provider, Duration::from_millis(0))
    }

    #[tokio::test]
    async fn blank_addresses_short_circuit() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok((1.0, 2.0))]));
        let cache = GeocodeCache::in_memory().unwrap();
        let geocoder = geocoder(provider.clone());

        for address in ["", "   ", "\t"] {
            let resolution = geocoder.resolve(&cache, address).await;
            assert_eq!(resolution.coordinates, None);
            assert_eq!(resolution.source, ResolutionSource::Blank);
        }
        assert_eq!(provider.call_count(), 0);
        assert!(cache.is_empty().unwrap());
    }

    #[tokio::test]
    async fn caches_successful_lookups() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok((-23.55, -46.63))]));
        let cache = GeocodeCache::in_memory().unwrap();
        let geocoder = geocoder(provider.clone());

        let first = geocoder
            .resolve(&cache, "Praça da Sé, São Paulo, SP")
            .await;
        assert_eq!(first.coordinates, Some((-23.55, -46.63)));
        assert_eq!(first.source, ResolutionSource::Provider);

        let second = geocoder
            .resolve(&cache, "Praça da Sé, São Paulo, SP")
            .await;
        assert_eq!(second.coordinates, Some((-23.55, -46.63)));
        assert_eq!(second.source, ResolutionSource::Cache);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(GeocodeFailure::Timeout),
            Ok((10.0, 20.0)),
        ]));
        let cache = GeocodeCache::in_memory().unwrap();
        let geocoder = geocoder(provider.clone());

        let failed = geocoder.resolve(&cache, "Rua XYZ, 99999").await;
        assert_eq!(failed.coordinates, None);
        assert_eq!(failed.source, ResolutionSource::Failed);
        assert!(cache.is_empty().unwrap());

        // the same address reaches the provider again instead of being served
        // a stale failure
        let retried = geocoder.resolve(&cache, "Rua XYZ, 99999").await;
        assert_eq!(retried.coordinates, Some((10.0, 20.0)));
        assert_eq!(retried.source, ResolutionSource::Provider);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn all_failure_classes_resolve_to_none() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(GeocodeFailure::Timeout),
            Err(GeocodeFailure::Unavailable),
            Err(GeocodeFailure::ServiceError("boom".into())),
            Err(GeocodeFailure::NoResult),
        ]));
        let cache = GeocodeCache::in_memory().unwrap();
        let geocoder = geocoder(provider.clone());

        for address in ["a, SP", "b, SP", "c, SP", "d, SP"] {
            let resolution = geocoder.resolve(&cache, address).await;
            assert_eq!(resolution.coordinates, None);
            assert_eq!(resolution.source, ResolutionSource::Failed);
        }
        assert!(cache.is_empty().unwrap());
    }

    #[tokio::test]
    async fn cache_faults_do_not_abort_resolution() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok((-23.55, -46.63)),
            Ok((-23.55, -46.63)),
        ]));
        let cache = GeocodeCache::in_memory().unwrap();
        cache.drop_storage();
        let geocoder = geocoder(provider.clone());

        // the read fault counts as a miss and the write fault is swallowed,
        // so the lookup still succeeds
        let resolution = geocoder.resolve(&cache, "Praça da Sé, São Paulo, SP").await;
        assert_eq!(resolution.coordinates, Some((-23.55, -46.63)));
        assert_eq!(resolution.source, ResolutionSource::Provider);

        // nothing was cached, so the next call pays the provider again
        let again = geocoder.resolve(&cache, "Praça da Sé, São Paulo, SP").await;
        assert_eq!(again.source, ResolutionSource::Provider);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn rate_limiter_spaces_consecutive_calls() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok((1.0, 1.0)),
            Ok((2.0, 2.0)),
        ]));
        let cache = GeocodeCache::in_memory().unwrap();
        let geocoder = Geocoder::with_provider(provider, Duration::from_millis(40));

        let started = std::time::Instant::now();
        geocoder.resolve(&cache, "first, SP").await;
        geocoder.resolve(&cache, "second, SP").await;
        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
