//! GeoJSON export of the map projection

use anyhow::Context;
use geo::MultiPolygon;
use serde_json::{json, Value};
use std::path::Path;

use crate::data::Dataset;
use crate::query::MapData;

/// Build a FeatureCollection with every district boundary (carrying its
/// choropleth `value`, or null) followed by one Point feature per marker.
pub fn map_to_geojson(dataset: &Dataset, map: &MapData) -> Value {
    let mut features: Vec<Value> = dataset
        .districts
        .iter()
        .map(|district| {
            json!({
                "type": "Feature",
                "geometry": multipolygon_geometry(&district.boundary),
                "properties": {
                    "district": district.district,
                    "value": map.choropleth.get(&district.district),
                }
            })
        })
        .collect();

    features.extend(map.markers.iter().map(|marker| {
        json!({
            "type": "Feature",
            "geometry": {
                "type": "Point",
                "coordinates": marker.centroid,
            },
            "properties": {
                "kind": "marker",
                "district": marker.district,
                "label": marker.label,
            }
        })
    }));

    json!({
        "type": "FeatureCollection",
        "name": map.legend,
        "features": features,
    })
}

/// Write [`map_to_geojson`] to a file.
pub fn write_map_geojson(path: &Path, dataset: &Dataset, map: &MapData) -> crate::Result<()> {
    let bytes = serde_json::to_vec(&map_to_geojson(dataset, map)).context("Failed to serialize GeoJSON")?;
    std::fs::write(path, bytes).with_context(|| format!("Failed to write GeoJSON: {}", path.display()))
}

fn multipolygon_geometry(mp: &MultiPolygon<f64>) -> Value {
    if mp.0.is_empty() {
        return Value::Null;
    }
    let polygons: Vec<Value> = mp
        .0
        .iter()
        .map(|polygon| {
            let rings: Vec<Vec<[f64; 2]>> = std::iter::once(polygon.exterior())
                .chain(polygon.interiors())
                .map(|ring| ring.coords().map(|c| [c.x, c.y]).collect())
                .collect();
            json!(rings)
        })
        .collect();
    json!({
        "type": "MultiPolygon",
        "coordinates": polygons,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{parse_district_geometries, MarketRecord, Metric};
    use crate::query::{Dashboard, Selection};
    use std::sync::Arc;

    const GEOJSON: &str = r#"{"features": [
        {"properties": {"district": "pune"},
         "geometry": {"type": "Polygon", "coordinates": [[[0,0],[2,0],[2,2],[0,2],[0,0]]]}},
        {"properties": {"district": "nashik"},
         "geometry": {"type": "Polygon", "coordinates": [[[5,5],[6,5],[6,6],[5,5]]]}}
    ]}"#;

    fn dataset() -> Dataset {
        let districts = parse_district_geometries(GEOJSON.as_bytes(), Path::new("t.geojson")).unwrap();
        let records = vec![MarketRecord {
            district_name: "Pune".into(),
            commodity: Some("Onion".into()),
            apmc: Some("A".into()),
            min_price: Some(10.0),
            max_price: Some(20.0),
            modal_price: Some(15.0),
            arrivals_in_qtl: Some(100.0),
        }];
        Dataset::from_parts(districts, records)
    }

    #[test]
    fn test_map_to_geojson() {
        let dataset = Arc::new(dataset());
        let dashboard = Dashboard::new(Arc::clone(&dataset));
        let response = dashboard.handle_selection(&Selection::new("Onion", Metric::ModalPrice, Metric::ArrivalsInQtl));

        let value = map_to_geojson(&dataset, &response.map);
        let features = value["features"].as_array().unwrap();
        assert_eq!(features.len(), 3);

        assert_eq!(features[0]["properties"]["district"], "Pune");
        assert_eq!(features[0]["properties"]["value"], 15.0);
        assert_eq!(features[0]["geometry"]["type"], "MultiPolygon");
        assert_eq!(features[1]["properties"]["district"], "Nashik");
        assert!(features[1]["properties"]["value"].is_null());

        assert_eq!(features[2]["geometry"]["type"], "Point");
        assert_eq!(features[2]["geometry"]["coordinates"], json!([1.0, 1.0]));
        assert_eq!(features[2]["properties"]["kind"], "marker");
    }

    #[test]
    fn test_geojson_reparses() {
        let dataset = dataset();
        let value = map_to_geojson(&dataset, &MapData::default());
        let bytes = serde_json::to_vec(&value).unwrap();
        let districts = parse_district_geometries(&bytes, Path::new("out.geojson")).unwrap();
        assert_eq!(districts.len(), 2);
        assert_eq!(districts[1].boundary, dataset.districts[1].boundary);
    }
}
