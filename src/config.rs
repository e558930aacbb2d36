use std::path::PathBuf;
use std::{env, io};

use tracing::debug;

const DEFAULT_GEOCODER_ENDPOINT: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_USER_AGENT: &str = "caixa-aberta/0.1";
// Nominatim's usage policy caps clients at one request per second.
const MIN_GEOCODE_DELAY_MS: u64 = 1_000;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub history_file_name: String,
    pub cache_file_name: String,
    pub geocoder_endpoint: String,
    pub geocoder_user_agent: String,
    pub geocoder_min_delay_ms: u64,
    pub geocoder_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            history_file_name: env::var("HISTORY_FILE_NAME")
                .unwrap_or_else(|_| "imoveis_BR.csv".to_string()),
            cache_file_name: env::var("CACHE_FILE_NAME")
                .unwrap_or_else(|_| "cache.sqlite".to_string()),
            geocoder_endpoint: env::var("GEOCODER_ENDPOINT")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_GEOCODER_ENDPOINT.to_string()),
            geocoder_user_agent: env::var("GEOCODER_USER_AGENT")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            geocoder_min_delay_ms: parse_u64("GEOCODER_MIN_DELAY_MS", MIN_GEOCODE_DELAY_MS)
                .max(MIN_GEOCODE_DELAY_MS),
            geocoder_timeout_secs: parse_u64("GEOCODER_TIMEOUT_SECS", 10).max(1),
        }
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(&self.history_file_name)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join(&self.cache_file_name)
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}
