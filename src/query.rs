//! Selection handling: filter by commodity, cluster, and shape map/chart projections

use std::collections::BTreeMap;
use std::sync::Arc;

use geo::Centroid;
use serde::{Deserialize, Serialize};

use crate::data::{field_title, Dataset, Metric};
use crate::model::{cluster_rows, ClusterSummary, ClusteredRow};

/// Fields shown in a marker label, in display order.
pub const LABEL_FIELDS: [&str; 7] = [
    "district",
    "APMC",
    "min_price",
    "max_price",
    "modal_price",
    "arrivals_in_qtl",
    "Cluster",
];

/// A user's choice of commodity and clustering axes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub commodity: String,
    #[serde(rename = "x")]
    pub metric_x: Metric,
    #[serde(rename = "y")]
    pub metric_y: Metric,
}

impl Selection {
    pub fn new(commodity: impl Into<String>, metric_x: Metric, metric_y: Metric) -> Self {
        Self {
            commodity: commodity.into(),
            metric_x,
            metric_y,
        }
    }

    /// Session default: first commodity, modal price against arrivals
    pub fn default_for(dataset: &Dataset) -> Self {
        let commodity = dataset
            .available_commodities()
            .into_iter()
            .next()
            .unwrap_or_default();
        Self::new(commodity, Metric::ModalPrice, Metric::ArrivalsInQtl)
    }

    /// e.g. "Modal Price vs Arrivals In Qtl (Onion)"
    pub fn chart_title(&self) -> String {
        format!(
            "{} vs {} ({})",
            self.metric_x.title(),
            self.metric_y.title(),
            self.commodity
        )
    }

    /// e.g. "Modal Price of Onion"
    pub fn legend_name(&self) -> String {
        format!("{} of {}", self.metric_x.title(), self.commodity)
    }
}

/// One marker per district, placed at the boundary centroid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapMarker {
    pub district: String,
    /// `[lon, lat]`
    pub centroid: [f64; 2],
    /// District name followed by one `Field: value` line per present field
    /// of every row in the district
    pub label: String,
}

/// Geospatial projection of a query
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MapData {
    pub legend: String,
    pub markers: Vec<MapMarker>,
    /// metricX per district; the last row wins when a district has several
    pub choropleth: BTreeMap<String, f64>,
}

impl MapData {
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty() && self.choropleth.is_empty()
    }
}

/// One scatter point, with the cluster as a categorical label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub district: String,
    #[serde(rename = "APMC")]
    pub apmc: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub modal_price: Option<f64>,
    pub arrivals_in_qtl: Option<f64>,
    pub x: f64,
    pub y: f64,
    #[serde(rename = "Cluster")]
    pub cluster: String,
}

/// Tabular projection of a query
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartData {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub points: Vec<ChartPoint>,
}

impl ChartData {
    /// Distinct cluster labels with their point counts, in label order
    pub fn cluster_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for point in &self.points {
            *counts.entry(point.cluster.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Both projections of one selection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub selection: Selection,
    pub map: MapData,
    pub chart: ChartData,
    pub summary: Option<ClusterSummary>,
}

/// Answers selections against a dataset loaded once at startup
#[derive(Debug, Clone)]
pub struct Dashboard {
    dataset: Arc<Dataset>,
}

impl Dashboard {
    pub fn new(dataset: Arc<Dataset>) -> Self {
        Self { dataset }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn commodities(&self) -> Vec<String> {
        self.dataset.available_commodities()
    }

    pub fn metrics(&self) -> &'static [Metric] {
        self.dataset.numeric_columns()
    }

    /// Filter to the selected commodity (exact match), cluster, and project.
    pub fn handle_selection(&self, selection: &Selection) -> QueryResponse {
        let filtered: Vec<_> = self
            .dataset
            .rows
            .iter()
            .filter(|row| row.commodity() == Some(selection.commodity.as_str()))
            .cloned()
            .collect();

        let clustering = cluster_rows(&filtered, selection.metric_x, selection.metric_y);
        tracing::debug!(
            commodity = %selection.commodity,
            filtered = filtered.len(),
            clustered = clustering.rows.len(),
            "Handled selection"
        );

        QueryResponse {
            selection: selection.clone(),
            map: build_map_data(&clustering.rows, selection),
            chart: build_chart_data(&clustering.rows, selection),
            summary: clustering.summary(),
        }
    }
}

fn build_map_data(rows: &[ClusteredRow], selection: &Selection) -> MapData {
    if rows.is_empty() {
        return MapData::default();
    }

    let mut choropleth = BTreeMap::new();
    // District order of first appearance
    let mut districts: Vec<(&ClusteredRow, Vec<String>)> = Vec::new();

    for clustered in rows {
        let district = clustered.row.district();
        if let Some(value) = clustered.row.metric(selection.metric_x) {
            choropleth.insert(district.to_string(), value);
        }

        let block = label_block(clustered);
        match districts.iter_mut().find(|(first, _)| first.row.district() == district) {
            Some((_, blocks)) => blocks.push(block),
            None => districts.push((clustered, vec![block])),
        }
    }

    let markers = districts
        .into_iter()
        .filter_map(|(first, blocks)| {
            let centroid = first.row.geometry.boundary.centroid()?;
            Some(MapMarker {
                district: first.row.district().to_string(),
                centroid: [centroid.x(), centroid.y()],
                label: format!("{}\n{}", first.row.district(), blocks.join("\n\n")),
            })
        })
        .collect();

    MapData {
        legend: selection.legend_name(),
        markers,
        choropleth,
    }
}

/// `Field: value` lines for the label fields present on a row
fn label_block(clustered: &ClusteredRow) -> String {
    let row = &clustered.row;
    LABEL_FIELDS
        .iter()
        .filter_map(|&field| {
            let value = match field {
                "district" => Some(row.district().to_string()),
                "APMC" => row.apmc().map(str::to_string),
                "Cluster" => Some(clustered.cluster.to_string()),
                column => column
                    .parse::<Metric>()
                    .ok()
                    .and_then(|metric| row.metric(metric))
                    .map(format_value),
            }?;
            Some(format!("{}: {}", field_title(field), value))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Numbers keep a fractional part: `10.0`, `320.5`
fn format_value(value: f64) -> String {
    format!("{value:?}")
}

fn build_chart_data(rows: &[ClusteredRow], selection: &Selection) -> ChartData {
    if rows.is_empty() {
        return ChartData::default();
    }

    let points = rows
        .iter()
        .filter_map(|clustered| {
            let row = &clustered.row;
            let market = row.market.as_ref()?;
            Some(ChartPoint {
                district: row.district().to_string(),
                apmc: market.apmc.clone(),
                min_price: market.min_price,
                max_price: market.max_price,
                modal_price: market.modal_price,
                arrivals_in_qtl: market.arrivals_in_qtl,
                x: market.metric(selection.metric_x)?,
                y: market.metric(selection.metric_y)?,
                cluster: clustered.cluster.to_string(),
            })
        })
        .collect();

    ChartData {
        title: selection.chart_title(),
        x_label: selection.metric_x.title(),
        y_label: selection.metric_y.title(),
        points,
    }
}
