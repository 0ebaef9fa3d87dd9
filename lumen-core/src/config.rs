use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct LumenConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub classifier: ClassifierConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Classifier gateway settings. `backend` selects "remote" (the external
/// classifier service) or "simulated" (seeded synthetic predictions).
#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    pub backend: String,
    pub base_url: String,
    pub timeout_seconds: u64,
    #[serde(default)]
    pub simulated_seed: u64,
    #[serde(default = "default_simulated_delay_ms")]
    pub simulated_delay_ms: u64,
}

fn default_simulated_delay_ms() -> u64 {
    250
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub blob_root: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8750,
        }
    }
}

impl LumenConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        s.try_deserialize()
    }
}
