//! APMC Dash entrypoint: loads the sources once, then lists, queries or serves.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use apmc_dash::cli::{Args, Command};
use apmc_dash::server::DashServer;
use apmc_dash::{geojson, load, viz, Dashboard, Metric, Selection};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.config();

    let start_time = Instant::now();
    let dataset = Arc::new(load(&config.data));
    tracing::debug!(elapsed = ?start_time.elapsed(), "Data load finished");
    let dashboard = Dashboard::new(dataset);

    match args.command {
        Command::Commodities => list_choices(&dashboard),
        Command::Query {
            commodity,
            metric_x,
            metric_y,
            map_out,
            chart_out,
            json,
        } => {
            let commodity = commodity.unwrap_or_else(|| Selection::default_for(dashboard.dataset()).commodity);
            let selection = Selection::new(commodity, metric_x, metric_y);
            run_query(&dashboard, &selection, map_out.as_deref(), chart_out.as_deref(), json)?;
        }
        Command::Serve { .. } => {
            DashServer::new(config.server, dashboard).start().await?;
        }
    }

    Ok(())
}

fn list_choices(dashboard: &Dashboard) {
    println!("Commodities:");
    for commodity in dashboard.commodities() {
        println!("  {}", commodity);
    }
    println!("\nMetrics:");
    for metric in dashboard.metrics() {
        println!("  {:<16} {}", metric.column(), Metric::title(*metric));
    }
}

fn run_query(
    dashboard: &Dashboard,
    selection: &Selection,
    map_out: Option<&std::path::Path>,
    chart_out: Option<&str>,
    json: bool,
) -> Result<()> {
    let query_start = Instant::now();
    let response = dashboard.handle_selection(selection);
    tracing::debug!(elapsed = ?query_start.elapsed(), "Selection handled");

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        viz::print_cluster_statistics(&response);
    }

    if let Some(path) = map_out {
        geojson::write_map_geojson(path, dashboard.dataset(), &response.map)?;
        tracing::info!(path = %path.display(), "Map layer saved");
    }

    if let Some(path) = chart_out {
        viz::generate_visualization_report(&response.chart, path)?;
    }

    Ok(())
}
