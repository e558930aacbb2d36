use tracing::info;

use crate::cache::GeocodeCache;
use crate::geocoder::{Geocoder, ResolutionSource};
use crate::records::ListingRecord;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentStats {
    pub scanned: usize,
    pub already_geocoded: usize,
    pub cache_hits: usize,
    pub geocoded: usize,
    pub failed: usize,
    pub skipped_blank_address: usize,
}

/// Fills in coordinates for history rows that lack them. Rows that already
/// carry coordinates are never re-geocoded, so a steady-state run costs a
/// handful of provider calls for new listings only. The pass is strictly
/// sequential; pacing toward the provider belongs to the geocoder.
pub async fn enrich(
    records: &mut [ListingRecord],
    geocoder: &Geocoder,
    cache: &GeocodeCache,
) -> EnrichmentStats {
    let mut stats = EnrichmentStats::default();
    for record in records.iter_mut() {
        stats.scanned += 1;
        if record.latitude.is_some() {
            stats.already_geocoded += 1;
            continue;
        }
        let address = record.geocode_address();
        let resolution = geocoder.resolve(cache, &address).await;
        match resolution.source {
            ResolutionSource::Blank => stats.skipped_blank_address += 1,
            ResolutionSource::Cache => stats.cache_hits += 1,
            ResolutionSource::Provider => stats.geocoded += 1,
            ResolutionSource::Failed => stats.failed += 1,
        }
        if let Some((lat, lon)) = resolution.coordinates {
            record.latitude = Some(lat);
            record.longitude = Some(lon);
        }
    }
    info!(
        scanned = stats.scanned,
        already_geocoded = stats.already_geocoded,
        cache_hits = stats.cache_hits,
        geocoded = stats.geocoded,
        failed = stats.failed,
        skipped_blank_address = stats.skipped_blank_address,
        "enrichment pass finished"
    );
    stats
}
