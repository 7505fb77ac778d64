//! APMC Dash: district-level agricultural market analysis
//!
//! Loads district boundaries and APMC market records once, then answers
//! (commodity, metric x, metric y) selections with K-Means clustered map and
//! chart projections.

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod geojson;
pub mod model;
pub mod query;
pub mod server;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use config::{AppConfig, DataConfig, ServerConfig};
pub use data::{load, normalize_district, Dataset, Metric};
pub use error::LoadError;
pub use model::{cluster, cluster_rows, ClusteredRow, UNCLUSTERED};
pub use query::{Dashboard, QueryResponse, Selection};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
