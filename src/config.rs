//! Runtime configuration: source file locations and server address

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default location of the district boundary GeoJSON.
pub const DEFAULT_GEO_PATH: &str = "data/maharashtra_districts.geojson";
/// Default location of the market price/arrivals CSV.
pub const DEFAULT_CSV_PATH: &str = "data/data.csv";

/// Top-level configuration assembled by the CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub data: DataConfig,
    pub server: ServerConfig,
}

/// Paths of the two sources read once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// GeoJSON FeatureCollection with a `district` property per feature
    pub geometry_path: PathBuf,
    /// CSV with Commodity, district_name, APMC and the metric columns
    pub market_path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            geometry_path: PathBuf::from(DEFAULT_GEO_PATH),
            market_path: PathBuf::from(DEFAULT_CSV_PATH),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8050,
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for parsing into a socket address
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
