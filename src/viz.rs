//! Visualization functions using Plotters for the cluster scatter chart

use std::path::{Path, PathBuf};

use plotters::prelude::*;

use crate::model::ClusterSummary;
use crate::query::{ChartData, QueryResponse};

/// Color palette for cluster labels; "-1" always maps to grey
const CLUSTER_COLORS: [RGBColor; 5] = [RED, BLUE, GREEN, YELLOW, MAGENTA];
const UNCLUSTERED_COLOR: RGBColor = RGBColor(128, 128, 128);

/// Color for a categorical cluster label
pub fn cluster_color(label: &str) -> RGBColor {
    match label.parse::<usize>() {
        Ok(idx) => CLUSTER_COLORS[idx % CLUSTER_COLORS.len()],
        Err(_) => UNCLUSTERED_COLOR,
    }
}

/// Padded `(min..max)` range over `values`; a unit range when empty or flat
pub fn axis_range(values: impl Iterator<Item = f64>) -> std::ops::Range<f64> {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !min.is_finite() || !max.is_finite() {
        return 0.0..1.0;
    }
    let pad = if max > min { (max - min) * 0.05 } else { min.abs().max(1.0) * 0.05 };
    (min - pad)..(max + pad)
}

/// Create scatter plot of chart points colored by cluster label
///
/// # Arguments
/// * `chart` - Chart projection of a query
/// * `output_path` - Path to save the PNG plot
pub fn create_cluster_visualization(chart: &ChartData, output_path: &str) -> crate::Result<()> {
    let x_range = axis_range(chart.points.iter().map(|p| p.x));
    let y_range = axis_range(chart.points.iter().map(|p| p.y));

    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut plot = ChartBuilder::on(&root)
        .caption(&chart.title, ("sans-serif", 26))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(x_range, y_range)?;

    plot.configure_mesh()
        .x_desc(&chart.x_label)
        .y_desc(&chart.y_label)
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    // One series per label so the legend is categorical
    for label in chart.cluster_counts().keys() {
        let color = cluster_color(label);
        plot.draw_series(
            chart
                .points
                .iter()
                .filter(|p| &p.cluster == label)
                .map(|p| Circle::new((p.x, p.y), 6, color.filled())),
        )?
        .label(format!("Cluster {label}"))
        .legend(move |(x, y)| Circle::new((x + 5, y), 5, color.filled()));
    }

    plot.configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    tracing::info!(path = output_path, "Cluster scatter plot saved");

    Ok(())
}

/// Create a bar chart of points per cluster label
pub fn create_cluster_size_chart(chart: &ChartData, output_path: &str) -> crate::Result<()> {
    let counts: Vec<(String, usize)> = chart.cluster_counts().into_iter().collect();
    let max_size = counts.iter().map(|(_, n)| *n).max().unwrap_or(1) as f64;

    let root = BitMapBackend::new(output_path, (600, 400)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut plot = ChartBuilder::on(&root)
        .caption("Cluster Sizes", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0f64..(counts.len().max(1) as f64), 0f64..(max_size * 1.1))?;

    plot.configure_mesh()
        .x_desc("Cluster")
        .y_desc("Number of Markets")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for (idx, (label, size)) in counts.iter().enumerate() {
        let color = cluster_color(label);
        let left = idx as f64 + 0.1;
        plot.draw_series(std::iter::once(Rectangle::new(
            [(left, 0.0), (left + 0.8, *size as f64)],
            color.filled(),
        )))?;
    }

    root.present()?;
    tracing::info!(path = output_path, "Cluster size chart saved");

    Ok(())
}

/// Print cluster statistics to console
pub fn print_cluster_statistics(response: &QueryResponse) {
    let chart = &response.chart;
    println!("\n=== {} ===", chart.title);
    println!("Markets plotted: {}", chart.points.len());
    println!("Districts on map: {}", response.map.markers.len());

    let Some(summary) = &response.summary else {
        if chart.points.is_empty() {
            println!("No data for commodity '{}'", response.selection.commodity);
        } else {
            println!("Not enough data to cluster (label -1)");
        }
        return;
    };
    print_summary(summary, chart);
}

fn print_summary(summary: &ClusterSummary, chart: &ChartData) {
    let total = chart.points.len().max(1);
    println!("Number of clusters: {}", summary.n_clusters);
    println!("Within-cluster sum of squares (Inertia): {:.2}", summary.inertia);
    println!("Silhouette score (sample): {:.3}", summary.silhouette);

    println!("\nCluster sizes:");
    for (i, &size) in summary.sizes.iter().enumerate() {
        let percentage = (size as f64 / total as f64) * 100.0;
        println!("  Cluster {}: {} markets ({:.1}%)", i, size, percentage);
    }

    println!("\nCluster centroids:");
    println!("  Cluster | {:>15} | {:>15}", chart.x_label, chart.y_label);
    for (i, [x, y]) in summary.centroids.iter().enumerate() {
        println!("  {:7} | {:15.2} | {:15.2}", i, x, y);
    }
}

/// Generate the scatter plot and the size chart next to it
pub fn generate_visualization_report(chart: &ChartData, base_output_path: &str) -> crate::Result<()> {
    create_cluster_visualization(chart, base_output_path)?;
    let size_chart_path = sizes_chart_path(Path::new(base_output_path));
    create_cluster_size_chart(chart, &size_chart_path.to_string_lossy())?;
    Ok(())
}

/// `dir/plot.png` -> `dir/plot_sizes.png`
fn sizes_chart_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}_sizes.png"))
}
