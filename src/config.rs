use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Runtime configuration, collected from the environment in one place.
/// Every field has a default; a missing variable never aborts startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    /// When absent, all AI endpoints run in mock mode.
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub storage_path: PathBuf,
    pub storage_version: String,
    /// Serialized-store size budget in bytes.
    pub max_storage_size: usize,
    pub default_language: String,
    pub default_currency: String,
    pub default_location: String,
    pub environment: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        let default_store = PathBuf::from(home).join(".mandi").join("mandi-data.json");

        Self {
            bind_addr: env_or("MANDI_BIND_ADDR", "0.0.0.0:8001"),
            gemini_api_key: std::env::var("GEMINI_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            gemini_base_url: env_or("GEMINI_BASE_URL", DEFAULT_GEMINI_BASE_URL),
            storage_path: std::env::var("MANDI_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(default_store),
            storage_version: env_or("MANDI_STORAGE_VERSION", "1.0.0"),
            max_storage_size: env_parse("MANDI_MAX_STORAGE_SIZE", 5 * 1024 * 1024),
            default_language: env_or("MANDI_DEFAULT_LANGUAGE", "en"),
            default_currency: env_or("MANDI_DEFAULT_CURRENCY", "INR"),
            default_location: env_or("MANDI_DEFAULT_LOCATION", "India"),
            environment: env_or("MANDI_ENVIRONMENT", "development"),
            max_retries: env_parse("MANDI_MAX_RETRIES", 3),
            retry_delay: Duration::from_millis(env_parse("MANDI_RETRY_DELAY_MS", 1000)),
        }
    }

    pub fn gemini_configured(&self) -> bool {
        self.gemini_api_key.is_some()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
