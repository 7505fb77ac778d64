//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{AppConfig, DataConfig, ServerConfig, DEFAULT_CSV_PATH, DEFAULT_GEO_PATH};
use crate::data::Metric;

/// District-level APMC market analysis with K-Means clustering
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// District boundary GeoJSON with a `district` property per feature
    #[arg(long, global = true, env = "APMC_GEO_PATH", default_value = DEFAULT_GEO_PATH)]
    pub geo: PathBuf,

    /// Market CSV with Commodity, district_name, APMC and price/arrival columns
    #[arg(long, global = true, env = "APMC_CSV_PATH", default_value = DEFAULT_CSV_PATH)]
    pub csv: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List available commodities and metrics
    Commodities,

    /// Cluster one commodity along two metrics
    Query {
        /// Commodity to select (exact, case-sensitive); defaults to the first available
        #[arg(short, long)]
        commodity: Option<String>,

        /// Metric on the x axis (min_price, max_price, modal_price, arrivals_in_qtl)
        #[arg(short = 'x', long, default_value = "modal_price", value_parser = parse_metric)]
        metric_x: Metric,

        /// Metric on the y axis
        #[arg(short = 'y', long, default_value = "arrivals_in_qtl", value_parser = parse_metric)]
        metric_y: Metric,

        /// Write the map layer (districts, choropleth values, markers) as GeoJSON
        #[arg(long)]
        map_out: Option<PathBuf>,

        /// Write the cluster scatter plot as PNG (sizes chart goes next to it)
        #[arg(long)]
        chart_out: Option<String>,

        /// Print the full response as JSON instead of statistics
        #[arg(long)]
        json: bool,
    },

    /// Serve the query interface over HTTP
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(short, long, default_value = "8050")]
        port: u16,
    },
}

impl Args {
    /// Build the runtime configuration from the parsed flags
    pub fn config(&self) -> AppConfig {
        let server = match &self.command {
            Command::Serve { host, port } => ServerConfig {
                host: host.clone(),
                port: *port,
            },
            _ => ServerConfig::default(),
        };
        AppConfig {
            data: DataConfig {
                geometry_path: self.geo.clone(),
                market_path: self.csv.clone(),
            },
            server,
        }
    }

    /// Default `tracing` filter directive for this invocation
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "apmc_dash=debug,tower_http=debug"
        } else {
            "apmc_dash=info,tower_http=info"
        }
    }
}

/// Parse a metric column name
fn parse_metric(s: &str) -> Result<Metric, String> {
    s.parse::<Metric>().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let args = Args::try_parse_from([
            "apmc-dash",
            "--geo",
            "g.geojson",
            "query",
            "--commodity",
            "Onion",
            "-x",
            "min_price",
            "-y",
            "max_price",
        ])
        .unwrap();

        assert_eq!(args.geo, PathBuf::from("g.geojson"));
        match args.command {
            Command::Query { commodity, metric_x, metric_y, json, .. } => {
                assert_eq!(commodity.as_deref(), Some("Onion"));
                assert_eq!(metric_x, Metric::MinPrice);
                assert_eq!(metric_y, Metric::MaxPrice);
                assert!(!json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_query_defaults() {
        let args = Args::try_parse_from(["apmc-dash", "query"]).unwrap();
        match args.command {
            Command::Query { commodity, metric_x, metric_y, .. } => {
                assert_eq!(commodity, None);
                assert_eq!(metric_x, Metric::ModalPrice);
                assert_eq!(metric_y, Metric::ArrivalsInQtl);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_metric_flags_take_column_names() {
        for metric in Metric::ALL {
            let args = Args::try_parse_from(["apmc-dash", "query", "-x", metric.column(), "-y", metric.column()]).unwrap();
            match args.command {
                Command::Query { metric_x, metric_y, .. } => {
                    assert_eq!(metric_x, metric);
                    assert_eq!(metric_y, metric);
                }
                other => panic!("unexpected command {:?}", other),
            }
        }
    }

    #[test]
    fn test_invalid_metric_rejected() {
        assert!(Args::try_parse_from(["apmc-dash", "query", "-x", "price"]).is_err());
    }

    #[test]
    fn test_serve_config() {
        let args = Args::try_parse_from(["apmc-dash", "serve", "--port", "9000", "-v"]).unwrap();
        let config = args.config();
        assert_eq!(config.server.address(), "127.0.0.1:9000");
        assert!(args.verbose);
        assert_eq!(args.log_filter(), "apmc_dash=debug,tower_http=debug");
    }
}
