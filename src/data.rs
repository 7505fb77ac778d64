//! Data loading: district boundaries (GeoJSON) joined with market records (CSV, via Polars)

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use geo::{Coord, LineString, MultiPolygon, Polygon};
use polars::prelude::{CsvReadOptions, CsvReader, DataFrame, DataType, PolarsResult, SerReader};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::DataConfig;
use crate::error::LoadError;

/// Commodity offered to selection controls when no market data was loaded.
pub const PLACEHOLDER_COMMODITY: &str = "Placeholder Commodity";

/// Numeric market columns that can be placed on either clustering axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    MinPrice,
    MaxPrice,
    ModalPrice,
    ArrivalsInQtl,
}

impl Metric {
    /// The fixed numeric column enumeration, in source column order.
    pub const ALL: [Metric; 4] = [
        Metric::MinPrice,
        Metric::MaxPrice,
        Metric::ModalPrice,
        Metric::ArrivalsInQtl,
    ];

    /// Column name in the market CSV
    pub fn column(self) -> &'static str {
        match self {
            Metric::MinPrice => "min_price",
            Metric::MaxPrice => "max_price",
            Metric::ModalPrice => "modal_price",
            Metric::ArrivalsInQtl => "arrivals_in_qtl",
        }
    }

    /// Human-readable axis title, e.g. "Arrivals In Qtl"
    pub fn title(self) -> String {
        field_title(self.column())
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Metric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|m| m.column() == s.trim())
            .ok_or_else(|| anyhow::anyhow!("Unknown metric: {}", s))
    }
}

/// One district boundary from the geometry source
#[derive(Debug, Clone)]
pub struct DistrictGeometry {
    /// Normalized district name (join key)
    pub district: String,
    pub boundary: MultiPolygon<f64>,
}

/// One row of the market table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketRecord {
    /// Normalized district name (join key)
    pub district_name: String,
    pub commodity: Option<String>,
    pub apmc: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub modal_price: Option<f64>,
    pub arrivals_in_qtl: Option<f64>,
}

impl MarketRecord {
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::MinPrice => self.min_price,
            Metric::MaxPrice => self.max_price,
            Metric::ModalPrice => self.modal_price,
            Metric::ArrivalsInQtl => self.arrivals_in_qtl,
        }
    }
}

/// A district joined with at most one of its market records.
///
/// `market` is `None` for districts without any matching record.
#[derive(Debug, Clone)]
pub struct MergedRow {
    pub geometry: Arc<DistrictGeometry>,
    pub market: Option<MarketRecord>,
}

impl MergedRow {
    pub fn district(&self) -> &str {
        &self.geometry.district
    }

    pub fn commodity(&self) -> Option<&str> {
        self.market.as_ref().and_then(|m| m.commodity.as_deref())
    }

    pub fn apmc(&self) -> Option<&str> {
        self.market.as_ref().and_then(|m| m.apmc.as_deref())
    }

    pub fn metric(&self, metric: Metric) -> Option<f64> {
        self.market.as_ref().and_then(|m| m.metric(metric))
    }
}

/// The merged, read-only dataset produced once at startup
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// Every district boundary, in source order
    pub districts: Vec<Arc<DistrictGeometry>>,
    /// Left join of `districts` with the market records
    pub rows: Vec<MergedRow>,
    commodities: Vec<String>,
}

impl Dataset {
    /// Empty dataset with the same shape as a loaded one
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a dataset from already-normalized geometries and records
    pub fn from_parts(districts: Vec<DistrictGeometry>, records: Vec<MarketRecord>) -> Self {
        let commodities = distinct_commodities(&records);
        let districts: Vec<Arc<DistrictGeometry>> = districts.into_iter().map(Arc::new).collect();
        let rows = merge(&districts, records);
        Self {
            districts,
            rows,
            commodities,
        }
    }

    /// Metric columns available for selection; fixed, not derived from the data.
    pub fn numeric_columns(&self) -> &'static [Metric] {
        &Metric::ALL
    }

    /// Distinct commodity names, sorted. Never empty.
    pub fn available_commodities(&self) -> Vec<String> {
        if self.commodities.is_empty() {
            vec![PLACEHOLDER_COMMODITY.to_string()]
        } else {
            self.commodities.clone()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.districts.is_empty() && self.rows.is_empty()
    }
}

/// Trim, then title-case a district name so both sources join on the same key.
pub fn normalize_district(name: &str) -> String {
    title_case(name.trim())
}

/// Uppercase the first letter of every run of letters and lowercase the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_is_letter = false;
    for ch in s.chars() {
        if prev_is_letter {
            out.extend(ch.to_lowercase());
        } else {
            out.extend(ch.to_uppercase());
        }
        prev_is_letter = ch.is_alphabetic();
    }
    out
}

/// "arrivals_in_qtl" -> "Arrivals In Qtl"
pub fn field_title(column: &str) -> String {
    title_case(&column.replace('_', " "))
}

/// Load both sources and merge them.
///
/// Never fails: any load error is logged and an empty dataset is returned, so
/// callers see a consistent (zero-row) shape.
pub fn load(config: &DataConfig) -> Dataset {
    match try_load(config) {
        Ok(dataset) => {
            tracing::info!(
                districts = dataset.districts.len(),
                rows = dataset.rows.len(),
                commodities = dataset.commodities.len(),
                "Loaded market dataset"
            );
            dataset
        }
        Err(err) => {
            tracing::error!(error = %err, "Failed to load data sources; using empty dataset");
            Dataset::empty()
        }
    }
}

/// Load both sources and merge them, reporting the first failure.
pub fn try_load(config: &DataConfig) -> Result<Dataset, LoadError> {
    let districts = read_district_geometries(&config.geometry_path)?;
    let records = read_market_records(&config.market_path)?;
    Ok(Dataset::from_parts(districts, records))
}

/// Read district boundaries from a GeoJSON FeatureCollection file.
pub fn read_district_geometries(path: &Path) -> Result<Vec<DistrictGeometry>, LoadError> {
    let bytes = fs::read(path).map_err(|source| LoadError::SourceUnavailable {
        path: path.to_path_buf(),
        source,
    })?;
    parse_district_geometries(&bytes, path)
}

/// Parse district boundaries from GeoJSON bytes.
///
/// Each feature needs a string `district` property and a Polygon, MultiPolygon
/// or null geometry. Names are normalized and must be unique.
pub fn parse_district_geometries(bytes: &[u8], path: &Path) -> Result<Vec<DistrictGeometry>, LoadError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| LoadError::malformed(path, e))?;
    let features = value["features"]
        .as_array()
        .ok_or_else(|| LoadError::malformed(path, "missing `features` array"))?;

    let mut seen = HashSet::with_capacity(features.len());
    let mut districts = Vec::with_capacity(features.len());
    for (idx, feature) in features.iter().enumerate() {
        let name = feature["properties"]["district"]
            .as_str()
            .ok_or_else(|| LoadError::malformed(path, format!("feature {idx} has no `district` property")))?;
        let district = normalize_district(name);
        if !seen.insert(district.clone()) {
            return Err(LoadError::DuplicateDistrict { district });
        }

        let boundary = parse_geometry(&feature["geometry"])
            .map_err(|reason| LoadError::malformed(path, format!("feature {idx} ({district}): {reason}")))?;
        districts.push(DistrictGeometry { district, boundary });
    }

    Ok(districts)
}

fn parse_geometry(geometry: &Value) -> Result<MultiPolygon<f64>, String> {
    if geometry.is_null() {
        return Ok(MultiPolygon(Vec::new()));
    }
    let coords = geometry["coordinates"]
        .as_array()
        .ok_or("geometry has no coordinates")?;
    match geometry["type"].as_str() {
        Some("Polygon") => Ok(MultiPolygon(vec![parse_polygon(coords)?])),
        Some("MultiPolygon") => coords
            .iter()
            .map(|p| p.as_array().ok_or("polygon must be an array".to_string()).and_then(|p| parse_polygon(p)))
            .collect::<Result<Vec<_>, _>>()
            .map(MultiPolygon),
        Some(other) => Err(format!("unsupported geometry type `{other}`")),
        None => Err("geometry has no type".to_string()),
    }
}

/// Rings are `[exterior, hole, hole, ...]`.
fn parse_polygon(rings: &[Value]) -> Result<Polygon<f64>, String> {
    let mut rings = rings.iter().map(|ring| {
        ring.as_array()
            .ok_or("ring must be an array".to_string())
            .and_then(|r| parse_ring(r))
    });
    let exterior = rings.next().ok_or("polygon has no exterior ring")??;
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn parse_ring(coords: &[Value]) -> Result<LineString<f64>, String> {
    let mut points = Vec::with_capacity(coords.len() + 1);
    for pair in coords {
        let x = pair[0].as_f64().ok_or("coordinate x must be a number")?;
        let y = pair[1].as_f64().ok_or("coordinate y must be a number")?;
        points.push(Coord { x, y });
    }
    if let (Some(&first), Some(&last)) = (points.first(), points.last()) {
        if first != last {
            points.push(first);
        }
    }
    Ok(LineString(points))
}

/// Columns the market CSV must provide.
pub const MARKET_COLUMNS: [&str; 7] = [
    "Commodity",
    "district_name",
    "APMC",
    "min_price",
    "max_price",
    "modal_price",
    "arrivals_in_qtl",
];

/// Read market records from a CSV file.
///
/// Rows without a district name are skipped; they can never join.
pub fn read_market_records(path: &Path) -> Result<Vec<MarketRecord>, LoadError> {
    let file = fs::File::open(path).map_err(|source| LoadError::SourceUnavailable {
        path: path.to_path_buf(),
        source,
    })?;
    let options = CsvReadOptions::default().with_has_header(true);
    let df = CsvReader::new(file)
        .with_options(options)
        .finish()
        .map_err(|e| LoadError::malformed(path, e))?;

    let missing: Vec<&str> = MARKET_COLUMNS
        .iter()
        .copied()
        .filter(|name| df.column(name).is_err())
        .collect();
    if !missing.is_empty() {
        return Err(LoadError::malformed(path, format!("missing columns: {}", missing.join(", "))));
    }

    market_records_from_frame(&df).map_err(|e| LoadError::malformed(path, e))
}

fn market_records_from_frame(df: &DataFrame) -> PolarsResult<Vec<MarketRecord>> {
    let districts = string_column(df, "district_name")?;
    let commodities = string_column(df, "Commodity")?;
    let apmcs = string_column(df, "APMC")?;
    let min_prices = float_column(df, Metric::MinPrice.column())?;
    let max_prices = float_column(df, Metric::MaxPrice.column())?;
    let modal_prices = float_column(df, Metric::ModalPrice.column())?;
    let arrivals = float_column(df, Metric::ArrivalsInQtl.column())?;

    let mut records = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let Some(district) = &districts[i] else {
            continue;
        };
        records.push(MarketRecord {
            district_name: normalize_district(district),
            commodity: commodities[i].clone(),
            apmc: apmcs[i].clone(),
            min_price: min_prices[i],
            max_price: max_prices[i],
            modal_price: modal_prices[i],
            arrivals_in_qtl: arrivals[i],
        });
    }
    Ok(records)
}

fn string_column(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<String>>> {
    let column = df.column(name)?.cast(&DataType::String)?;
    Ok(column.str()?.into_iter().map(|v| v.map(str::to_string)).collect())
}

/// Integer columns are widened; NaN and infinities count as missing.
fn float_column(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<f64>>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

/// Left join: every district appears at least once, followed by one row per
/// matching record in record order. Records for unknown districts are dropped.
pub fn merge(districts: &[Arc<DistrictGeometry>], records: Vec<MarketRecord>) -> Vec<MergedRow> {
    let mut by_district: HashMap<String, Vec<MarketRecord>> = HashMap::new();
    for record in records {
        by_district
            .entry(record.district_name.clone())
            .or_default()
            .push(record);
    }

    let mut rows = Vec::with_capacity(districts.len());
    for geometry in districts {
        match by_district.remove(&geometry.district) {
            Some(matches) => rows.extend(matches.into_iter().map(|market| MergedRow {
                geometry: Arc::clone(geometry),
                market: Some(market),
            })),
            None => rows.push(MergedRow {
                geometry: Arc::clone(geometry),
                market: None,
            }),
        }
    }

    if !by_district.is_empty() {
        tracing::debug!(
            unmatched = ?by_district.keys().collect::<Vec<_>>(),
            "Market records without a district boundary"
        );
    }

    rows
}

/// Distinct non-null commodity names, sorted.
fn distinct_commodities(records: &[MarketRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.commodity.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn square(x: f64, y: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![Polygon::new(
            LineString::from(vec![(x, y), (x + 1.0, y), (x + 1.0, y + 1.0), (x, y + 1.0), (x, y)]),
            vec![],
        )])
    }

    fn record(district: &str, commodity: &str, apmc: &str, modal: f64) -> MarketRecord {
        MarketRecord {
            district_name: normalize_district(district),
            commodity: Some(commodity.to_string()),
            apmc: Some(apmc.to_string()),
            min_price: Some(modal - 5.0),
            max_price: Some(modal + 5.0),
            modal_price: Some(modal),
            arrivals_in_qtl: Some(100.0),
        }
    }

    #[test]
    fn test_normalize_district() {
        assert_eq!(normalize_district("  pune "), "Pune");
        assert_eq!(normalize_district("AHMEDNAGAR"), "Ahmednagar");
        assert_eq!(normalize_district("navi-mumbai"), "Navi-Mumbai");
        assert_eq!(normalize_district("mumbai suburban"), "Mumbai Suburban");
        assert_eq!(normalize_district(""), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for name in ["pune", " NASHIK", "mumbai  suburban ", "o'brien", "district 9x", "Sindhudurg"] {
            let once = normalize_district(name);
            assert_eq!(normalize_district(&once), once);
        }
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(Metric::ArrivalsInQtl.column(), "arrivals_in_qtl");
        assert_eq!(Metric::ArrivalsInQtl.title(), "Arrivals In Qtl");
        assert_eq!("modal_price".parse::<Metric>().unwrap(), Metric::ModalPrice);
        assert!("price".parse::<Metric>().is_err());
        assert_eq!(serde_json::to_string(&Metric::MinPrice).unwrap(), "\"min_price\"");
    }

    #[test]
    fn test_parse_geometries() {
        let geojson = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"district": " pune"},
                 "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1]]]}},
                {"type": "Feature", "properties": {"district": "NASHIK"},
                 "geometry": {"type": "MultiPolygon", "coordinates": [[[[2,2],[3,2],[3,3],[2,2]]], [[[5,5],[6,5],[6,6],[5,5]]]]}},
                {"type": "Feature", "properties": {"district": "Thane"}, "geometry": null}
            ]
        }"#;
        let districts = parse_district_geometries(geojson.as_bytes(), Path::new("test.geojson")).unwrap();

        assert_eq!(districts.len(), 3);
        assert_eq!(districts[0].district, "Pune");
        // Open rings are closed
        assert_eq!(districts[0].boundary.0[0].exterior().0.len(), 5);
        assert_eq!(districts[1].district, "Nashik");
        assert_eq!(districts[1].boundary.0.len(), 2);
        assert!(districts[2].boundary.0.is_empty());
    }

    #[test]
    fn test_parse_geometries_rejects_bad_input() {
        let path = Path::new("bad.geojson");
        assert!(matches!(
            parse_district_geometries(b"not json", path),
            Err(LoadError::MalformedSource { .. })
        ));

        let no_name = r#"{"features": [{"properties": {}, "geometry": null}]}"#;
        assert!(matches!(
            parse_district_geometries(no_name.as_bytes(), path),
            Err(LoadError::MalformedSource { .. })
        ));

        let point = r#"{"features": [{"properties": {"district": "Pune"},
            "geometry": {"type": "Point", "coordinates": [1, 2]}}]}"#;
        assert!(matches!(
            parse_district_geometries(point.as_bytes(), path),
            Err(LoadError::MalformedSource { .. })
        ));
    }

    #[test]
    fn test_duplicate_districts_fail() {
        let geojson = r#"{"features": [
            {"properties": {"district": "Pune"}, "geometry": null},
            {"properties": {"district": " pune "}, "geometry": null}
        ]}"#;
        let result = parse_district_geometries(geojson.as_bytes(), Path::new("dup.geojson"));
        match result {
            Err(LoadError::DuplicateDistrict { district }) => assert_eq!(district, "Pune"),
            other => panic!("expected duplicate error, got {:?}", other),
        }
    }

    #[test]
    fn test_left_join_keeps_every_district() {
        let districts = vec![
            DistrictGeometry { district: "Pune".into(), boundary: square(0.0, 0.0) },
            DistrictGeometry { district: "Nashik".into(), boundary: square(2.0, 2.0) },
        ];
        let records = vec![
            record("pune", "Onion", "A", 15.0),
            record("Pune ", "Onion", "B", 25.0),
            record("Satara", "Onion", "C", 35.0),
        ];
        let dataset = Dataset::from_parts(districts, records);

        assert_eq!(dataset.districts.len(), 2);
        assert_eq!(dataset.rows.len(), 3);
        assert_eq!(dataset.rows[0].district(), "Pune");
        assert_eq!(dataset.rows[0].apmc(), Some("A"));
        assert_eq!(dataset.rows[1].apmc(), Some("B"));
        assert_eq!(dataset.rows[2].district(), "Nashik");
        assert!(dataset.rows[2].market.is_none());
        assert_eq!(dataset.rows[2].metric(Metric::ModalPrice), None);
    }

    #[test]
    fn test_join_cardinality_one_record_each() {
        let districts = vec![
            DistrictGeometry { district: "Pune".into(), boundary: square(0.0, 0.0) },
            DistrictGeometry { district: "Nashik".into(), boundary: square(2.0, 2.0) },
        ];
        let records = vec![record("NASHIK", "Onion", "N", 10.0), record("pune", "Onion", "P", 12.0)];
        let dataset = Dataset::from_parts(districts, records);
        assert_eq!(dataset.rows.len(), dataset.districts.len());
        assert!(dataset.rows.iter().all(|r| r.market.is_some()));
    }

    #[test]
    fn test_available_commodities() {
        let empty = Dataset::empty();
        assert_eq!(empty.available_commodities(), vec![PLACEHOLDER_COMMODITY.to_string()]);
        assert_eq!(empty.numeric_columns().len(), 4);

        let districts = vec![DistrictGeometry { district: "Pune".into(), boundary: square(0.0, 0.0) }];
        let records = vec![
            record("Pune", "Tomato", "A", 1.0),
            record("Pune", "Onion", "A", 1.0),
            record("Pune", "Tomato", "B", 1.0),
        ];
        let dataset = Dataset::from_parts(districts, records);
        assert_eq!(dataset.available_commodities(), vec!["Onion".to_string(), "Tomato".to_string()]);
    }

    #[test]
    fn test_read_market_records() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Commodity,district_name,APMC,min_price,max_price,modal_price,arrivals_in_qtl").unwrap();
        writeln!(file, "Onion, pune ,Pune APMC,1000,2000,1500,320.5").unwrap();
        writeln!(file, "Onion,NASHIK,Lasalgaon,900,1800,,1200").unwrap();
        writeln!(file, "Tomato,,Nowhere,1,2,3,4").unwrap();

        let records = read_market_records(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].district_name, "Pune");
        assert_eq!(records[0].apmc.as_deref(), Some("Pune APMC"));
        assert_eq!(records[0].min_price, Some(1000.0));
        assert_eq!(records[0].arrivals_in_qtl, Some(320.5));
        assert_eq!(records[1].district_name, "Nashik");
        assert_eq!(records[1].modal_price, None);
    }

    #[test]
    fn test_read_market_records_missing_column() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Commodity,district_name,min_price").unwrap();
        writeln!(file, "Onion,Pune,10").unwrap();

        let err = read_market_records(file.path()).unwrap_err();
        match err {
            LoadError::MalformedSource { reason, .. } => assert!(reason.contains("APMC")),
            other => panic!("expected malformed source, got {:?}", other),
        }
    }

    #[test]
    fn test_load_missing_files_degrades_to_empty() {
        let config = DataConfig {
            geometry_path: "does/not/exist.geojson".into(),
            market_path: "does/not/exist.csv".into(),
        };
        assert!(matches!(try_load(&config), Err(LoadError::SourceUnavailable { .. })));

        let dataset = load(&config);
        assert!(dataset.is_empty());
        assert_eq!(dataset.available_commodities(), vec![PLACEHOLDER_COMMODITY.to_string()]);
    }
}
