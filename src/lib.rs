pub mod cache;
pub mod config;
pub mod enrich;
pub mod errors;
pub mod geocoder;
pub mod pipeline;
pub mod reconcile;
pub mod records;
pub mod report;
pub mod store;

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::cache::GeocodeCache;
pub use crate::config::AppConfig;
pub use crate::errors::{AppError, AppResult};
pub use crate::geocoder::Geocoder;
pub use crate::records::{IdentityKey, ListingRecord};

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,caixa_aberta=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
