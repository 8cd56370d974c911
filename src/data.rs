//! File-backed data source: CSV tables plus Shapefile or GeoJSON boundaries.

use crate::config::{InputConfig, KeyConfig};
use crate::source::{DataSource, Dataset, ProjectDirectory};
use crate::types::{
    CountyBoundary, Demographics, Location, Measures, ProjectSite, SiteId, StateBoundary,
    TractAttributes, TractBoundary, TractVisitRecord, VisitRecord,
};
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use geo::MultiPolygon;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

/// Reads every table from disk on each call.
#[derive(Debug, Clone)]
pub struct FileDataSource {
    input: InputConfig,
}

impl FileDataSource {
    pub fn new(input: InputConfig) -> Self {
        Self { input }
    }

    fn keys(&self) -> &KeyConfig {
        &self.input.keys
    }
}

#[derive(Debug, Deserialize)]
struct HomeLocationRow {
    siteid: SiteId,
    country: String,
    state: Option<String>,
    county: Option<String>,
    visit_days: u64,
    visitors_unq: u64,
}

impl From<HomeLocationRow> for VisitRecord {
    fn from(row: HomeLocationRow) -> Self {
        VisitRecord {
            siteid: row.siteid,
            location: Location::from_parts(row.country, row.state, row.county),
            measures: Measures::new(row.visit_days, row.visitors_unq),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TractRow {
    siteid: SiteId,
    tract: String,
    state: String,
    county: String,
    median_income: Option<f64>,
    population: Option<u64>,
    minority_pct: Option<f64>,
    visit_days: u64,
    visitors_unq: u64,
}

impl From<TractRow> for TractVisitRecord {
    fn from(row: TractRow) -> Self {
        TractVisitRecord {
            siteid: row.siteid,
            attributes: TractAttributes {
                tract: row.tract,
                state: row.state,
                county: row.county,
                demographics: Demographics {
                    median_income: row.median_income,
                    population: row.population,
                    minority_pct: row.minority_pct,
                },
            },
            measures: Measures::new(row.visit_days, row.visitors_unq),
        }
    }
}

impl DataSource for FileDataSource {
    fn home_locations(&self) -> Result<Vec<VisitRecord>> {
        let rows: Vec<HomeLocationRow> = read_csv(&self.input.home_locations)?;
        info!("Loaded {} rows for {}", rows.len(), Dataset::HomeLocations);
        Ok(rows.into_iter().map(VisitRecord::from).collect())
    }

    fn state_boundaries(&self) -> Result<Vec<StateBoundary>> {
        let shapes = load_boundaries(&self.input.state_boundaries, &[self.keys().state.as_str()])?;
        info!("Loaded {} shapes for {}", shapes.len(), Dataset::StateBoundaries);
        Ok(shapes
            .into_iter()
            .map(|(mut keys, geometry)| StateBoundary {
                state: keys.remove(0),
                geometry,
            })
            .collect())
    }

    fn counties(&self) -> Result<Vec<CountyBoundary>> {
        let shapes = load_boundaries(
            &self.input.counties,
            &[self.keys().state.as_str(), self.keys().county.as_str()],
        )?;
        info!("Loaded {} shapes for {}", shapes.len(), Dataset::Counties);
        Ok(shapes
            .into_iter()
            .map(|(keys, geometry)| {
                let mut keys = keys.into_iter();
                CountyBoundary {
                    state: keys.next().unwrap_or_default(),
                    county: keys.next().unwrap_or_default(),
                    geometry,
                }
            })
            .collect())
    }

    fn home_locations_census_tract(&self) -> Result<Vec<TractVisitRecord>> {
        let rows: Vec<TractRow> = read_csv(&self.input.home_locations_census_tract)?;
        info!("Loaded {} rows for {}", rows.len(), Dataset::HomeLocationsCensusTract);
        Ok(rows.into_iter().map(TractVisitRecord::from).collect())
    }

    fn census_tracts(&self) -> Result<Vec<TractBoundary>> {
        let shapes = load_boundaries(&self.input.census_tracts, &[self.keys().tract.as_str()])?;
        info!("Loaded {} shapes for {}", shapes.len(), Dataset::CensusTract);
        Ok(shapes
            .into_iter()
            .map(|(mut keys, geometry)| TractBoundary {
                tract: keys.remove(0),
                geometry,
            })
            .collect())
    }
}

impl ProjectDirectory for FileDataSource {
    fn project_sites(&self, project: &str) -> Result<Vec<ProjectSite>> {
        let rows: Vec<ProjectSite> = read_csv(&self.input.project_sites)?;
        Ok(rows.into_iter().filter(|ps| ps.project == project).collect())
    }
}

fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).with_context(|| format!("Failed to open CSV file: {:?}", path))?;
    let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    let mut rows = Vec::new();
    for (line, result) in rdr.deserialize::<T>().enumerate() {
        let row: T = result
            .with_context(|| format!("Failed to parse record {} of {:?}", line + 1, path))?;
        rows.push(row);
    }
    Ok(rows)
}

/// A boundary shape with its key values, in the order the keys were asked for.
type KeyedShape = (Vec<String>, MultiPolygon<f64>);

/// Loads polygon features and their key attributes. Features missing a key
/// or holding non-polygon geometry are skipped.
fn load_boundaries(path: &Path, key_columns: &[&str]) -> Result<Vec<KeyedShape>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Boundary file has no extension: {:?}", path))?;

    match extension.as_str() {
        "shp" => load_shapefile(path, key_columns),
        "json" | "geojson" => load_geojson(path, key_columns),
        _ => Err(anyhow!("Unsupported geometry format: {}", extension)),
    }
}

fn load_shapefile(path: &Path, key_columns: &[&str]) -> Result<Vec<KeyedShape>> {
    use shapefile::dbase::FieldValue;

    let mut reader = shapefile::Reader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut shapes = Vec::new();
    let mut skipped = 0usize;

    'features: for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let mut keys = Vec::with_capacity(key_columns.len());
        for column in key_columns {
            let value = record
                .get(column)
                .ok_or_else(|| anyhow!("Key column '{}' not found in Shapefile", column))?;
            match value {
                FieldValue::Character(Some(s)) if !s.trim().is_empty() => {
                    keys.push(s.trim().to_string())
                }
                FieldValue::Numeric(Some(n)) => keys.push(format_numeric_key(*n)),
                FieldValue::Character(_) | FieldValue::Numeric(None) => {
                    skipped += 1;
                    continue 'features;
                }
                _ => {
                    return Err(anyhow!(
                        "Shapefile key column '{}' must be text or numeric",
                        column
                    ))
                }
            }
        }

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?,
            shapefile::Shape::PolygonM(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?,
            shapefile::Shape::PolygonZ(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?,
            _ => {
                skipped += 1;
                continue;
            }
        };

        shapes.push((keys, geometry));
    }

    if skipped > 0 {
        debug!("Skipped {} shapes in {:?}", skipped, path);
    }
    Ok(shapes)
}

fn load_geojson(path: &Path, key_columns: &[&str]) -> Result<Vec<KeyedShape>> {
    use geojson::GeoJson;
    use std::io::BufReader;

    let file =
        File::open(path).with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let geojson = GeoJson::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse GeoJSON: {:?}", path))?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection: {:?}", path)),
    };

    let mut shapes = Vec::new();
    let mut skipped = 0usize;

    for feature in collection.features {
        let keys: Option<Vec<String>> = key_columns
            .iter()
            .map(|column| match feature.property(column) {
                Some(serde_json::Value::String(s)) => Some(s.trim().to_string()),
                // leading zeros are already gone, as with dBase numerics
                Some(serde_json::Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
            .collect();

        let Some(keys) = keys else {
            skipped += 1;
            continue;
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let value: geo::Geometry<f64> = geom
                    .value
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;
                match value {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => {
                        skipped += 1;
                        continue;
                    }
                }
            }
            None => {
                skipped += 1;
                continue;
            }
        };

        shapes.push((keys, geometry));
    }

    if skipped > 0 {
        debug!("Skipped {} features in {:?}", skipped, path);
    }
    Ok(shapes)
}

/// dBase numerics come back as floats; integral codes are keyed without
/// a fractional part.
///
/// Leading zeros cannot survive a numeric field (`06001` reads as `6001`),
/// so zero-padded FIPS or tract codes must be stored as text attributes to
/// match the zero-padded codes in the CSV tables.
fn format_numeric_key(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shapefile::dbase;
    use shapefile::record::EsriShape;
    use shapefile::PolygonRing;
    use std::fs;
    use tempfile::TempDir;

    const STATES: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "properties": {"state": "WA"},
     "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}},
    {"type": "Feature", "properties": {"state": "OR"},
     "geometry": {"type": "Point", "coordinates": [0, 0]}},
    {"type": "Feature", "properties": {"name": "no key"},
     "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}}
  ]
}"#;

    const TRACTS: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "properties": {"GEOID": 53033000100},
     "geometry": {"type": "MultiPolygon", "coordinates": [[[[0,0],[1,0],[1,1],[0,0]]]]}}
  ]
}"#;

    fn fixture() -> (TempDir, FileDataSource) {
        let dir = TempDir::new().unwrap();
        let path = |name: &str| dir.path().join(name);

        fs::write(
            path("home.csv"),
            "siteid,country,state,county,visit_days,visitors_unq\n\
             1,US,WA,King,10,4\n\
             1,International,,,3,1\n",
        )
        .unwrap();
        fs::write(
            path("tract.csv"),
            "siteid,tract,state,county,median_income,population,minority_pct,visit_days,visitors_unq\n\
             1,53033000100,WA,King,71000,4200,0.31,5,2\n\
             2,53033000100,WA,King,71000,4200,0.31,1,1\n",
        )
        .unwrap();
        fs::write(path("projects.csv"), "project,siteid\nrivers,1\nrivers,2\nlakes,3\n").unwrap();
        fs::write(path("states.geojson"), STATES).unwrap();
        fs::write(path("tracts.json"), TRACTS).unwrap();

        let input = InputConfig {
            home_locations: path("home.csv"),
            home_locations_census_tract: path("tract.csv"),
            project_sites: path("projects.csv"),
            state_boundaries: path("states.geojson"),
            counties: path("counties.gpkg"),
            census_tracts: path("tracts.json"),
            keys: KeyConfig {
                tract: "GEOID".to_string(),
                ..KeyConfig::default()
            },
        };
        (dir, FileDataSource::new(input))
    }

    #[test]
    fn reads_home_locations_with_country_only_rows() {
        let (_dir, source) = fixture();
        let rows = source.home_locations().unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].location.county(), Some("King"));
        assert_eq!(
            rows[1].location,
            Location::CountryOnly {
                country: "International".to_string()
            }
        );
        assert_eq!(rows[1].measures, Measures::new(3, 1));
    }

    #[test]
    fn reads_tract_rows_and_project_sites() {
        let (_dir, source) = fixture();
        let tracts = source.home_locations_census_tract().unwrap();
        assert_eq!(tracts.len(), 2);
        assert_eq!(tracts[0].attributes.demographics.population, Some(4200));

        let sites = source.project_sites("rivers").unwrap();
        assert_eq!(sites.iter().map(|s| s.siteid).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn geojson_skips_points_and_unkeyed_features() {
        let (_dir, source) = fixture();
        let states = source.state_boundaries().unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].state, "WA");
    }

    #[test]
    fn numeric_geojson_keys_become_text() {
        let (_dir, source) = fixture();
        let tracts = source.census_tracts().unwrap();
        assert_eq!(tracts[0].tract, "53033000100");
    }

    #[test]
    fn unknown_geometry_format_is_rejected() {
        let (_dir, source) = fixture();
        let err = source.counties().unwrap_err();
        assert!(err.to_string().contains("Unsupported geometry format"));
    }

    #[test]
    fn integral_dbase_numbers_drop_the_fraction() {
        assert_eq!(format_numeric_key(53.0), "53");
        assert_eq!(format_numeric_key(1.5), "1.5");
        // zero padding is not recoverable from a number
        assert_eq!(format_numeric_key(6001400100.0), "6001400100");
    }

    fn field(name: &str) -> dbase::FieldName {
        dbase::FieldName::try_from(name).unwrap()
    }

    fn dbase_record(values: Vec<(&str, dbase::FieldValue)>) -> dbase::Record {
        let mut record = dbase::Record::default();
        for (name, value) in values {
            record.insert(name.to_string(), value);
        }
        record
    }

    fn write_shapes<S: EsriShape>(
        path: &Path,
        table: dbase::TableWriterBuilder,
        shapes: Vec<(S, dbase::Record)>,
    ) {
        let mut writer = shapefile::Writer::from_path(path, table).unwrap();
        for (shape, record) in &shapes {
            writer.write_shape_and_record(shape, record).unwrap();
        }
    }

    fn ring(offset: f64) -> Vec<shapefile::Point> {
        [(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0), (0.0, 0.0)]
            .iter()
            .map(|(x, y)| shapefile::Point::new(x + offset, *y))
            .collect()
    }

    fn square(offset: f64) -> shapefile::Polygon {
        shapefile::Polygon::new(PolygonRing::Outer(ring(offset)))
    }

    fn square_z(offset: f64) -> shapefile::PolygonZ {
        let points = ring(offset)
            .into_iter()
            .map(|p| shapefile::PointZ::new(p.x, p.y, 10.0, 0.0))
            .collect();
        shapefile::PolygonZ::new(PolygonRing::Outer(points))
    }

    fn text(value: Option<&str>) -> dbase::FieldValue {
        dbase::FieldValue::Character(value.map(str::to_string))
    }

    /// Writes states.shp (polygons), counties.shp (polygonZ with a numeric
    /// county code) and tracts.shp (points only).
    fn shapefile_fixture(tract_key: &str) -> (TempDir, FileDataSource) {
        let dir = TempDir::new().unwrap();
        let path = |name: &str| dir.path().join(name);

        write_shapes(
            &path("states.shp"),
            dbase::TableWriterBuilder::new().add_character_field(field("state"), 8),
            vec![
                (square(0.0), dbase_record(vec![("state", text(Some("WA")))])),
                (square(2.0), dbase_record(vec![("state", text(None))])),
            ],
        );

        write_shapes(
            &path("counties.shp"),
            dbase::TableWriterBuilder::new()
                .add_character_field(field("state"), 8)
                .add_numeric_field(field("county"), 5, 0),
            vec![
                (
                    square_z(0.0),
                    dbase_record(vec![
                        ("state", text(Some("53"))),
                        ("county", dbase::FieldValue::Numeric(Some(33.0))),
                    ]),
                ),
                (
                    square_z(2.0),
                    dbase_record(vec![
                        ("state", text(Some("53"))),
                        ("county", dbase::FieldValue::Numeric(None)),
                    ]),
                ),
            ],
        );

        write_shapes(
            &path("tracts.shp"),
            dbase::TableWriterBuilder::new().add_character_field(field("tract"), 11),
            vec![(
                shapefile::Point::new(0.5, 0.5),
                dbase_record(vec![("tract", text(Some("53033000100")))]),
            )],
        );

        let input = InputConfig {
            home_locations: path("home.csv"),
            home_locations_census_tract: path("tract.csv"),
            project_sites: path("projects.csv"),
            state_boundaries: path("states.shp"),
            counties: path("counties.shp"),
            census_tracts: path("tracts.shp"),
            keys: KeyConfig {
                tract: tract_key.to_string(),
                ..KeyConfig::default()
            },
        };
        (dir, FileDataSource::new(input))
    }

    #[test]
    fn shapefile_skips_polygons_with_null_keys() {
        let (_dir, source) = shapefile_fixture("tract");
        let states = source.state_boundaries().unwrap();

        assert_eq!(states.len(), 1);
        assert_eq!(states[0].state, "WA");
        assert_eq!(states[0].geometry.0.len(), 1);
    }

    #[test]
    fn shapefile_reads_numeric_keys_and_polygon_z() {
        let (_dir, source) = shapefile_fixture("tract");
        let counties = source.counties().unwrap();

        assert_eq!(counties.len(), 1);
        assert_eq!(counties[0].state, "53");
        assert_eq!(counties[0].county, "33");
        assert_eq!(counties[0].geometry.0.len(), 1);
    }

    #[test]
    fn shapefile_skips_non_polygon_shapes() {
        let (_dir, source) = shapefile_fixture("tract");
        assert!(source.census_tracts().unwrap().is_empty());
    }

    #[test]
    fn shapefile_missing_key_column_is_an_error() {
        let (_dir, source) = shapefile_fixture("GEOID");
        let err = source.census_tracts().unwrap_err();
        assert!(err.to_string().contains("Key column 'GEOID' not found"));
    }
}
