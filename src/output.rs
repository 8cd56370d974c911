use crate::types::Spatial;
use anyhow::{anyhow, Context, Result};
use geojson::{Feature, FeatureCollection, Geometry};
use serde::Serialize;
use std::io::Write;

/// Turns geometry-carrying rows into GeoJSON features whose properties are
/// the row's serialized fields.
pub fn to_feature_collection<T: Serialize + Spatial>(rows: &[T]) -> Result<FeatureCollection> {
    let mut features = Vec::with_capacity(rows.len());

    for row in rows {
        let properties = match serde_json::to_value(row).context("Failed to serialize row")? {
            serde_json::Value::Object(map) => map,
            other => return Err(anyhow!("Row serialized to a non-object: {}", other)),
        };

        features.push(Feature {
            bbox: None,
            geometry: Some(Geometry::new(geojson::Value::from(row.geometry()))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        });
    }

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

pub fn write_json<T: Serialize, W: Write>(writer: W, value: &T, pretty: bool) -> Result<()> {
    if pretty {
        serde_json::to_writer_pretty(writer, value)
    } else {
        serde_json::to_writer(writer, value)
    }
    .context("Failed to write JSON output")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StateVisits;
    use geo::{polygon, MultiPolygon};

    #[test]
    fn features_carry_properties_and_geometry() {
        let square = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ];
        let rows = vec![StateVisits {
            state: "WA".to_string(),
            visit_days: 12,
            visitors_unq: 5,
            geometry: MultiPolygon::new(vec![square]),
        }];

        let collection = to_feature_collection(&rows).unwrap();
        assert_eq!(collection.features.len(), 1);

        let feature = &collection.features[0];
        let props = feature.properties.as_ref().unwrap();
        assert_eq!(props["state"], serde_json::json!("WA"));
        assert_eq!(props["visit_days"], serde_json::json!(12));
        assert!(!props.contains_key("geometry"));
        assert!(matches!(
            feature.geometry.as_ref().map(|g| &g.value),
            Some(geojson::Value::MultiPolygon(_))
        ));
    }

    #[test]
    fn compact_json_is_single_line() {
        let mut out = Vec::new();
        write_json(&mut out, &serde_json::json!({"a": [1, 2]}), false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), r#"{"a":[1,2]}"#);
    }
}
