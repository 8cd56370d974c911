use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub home_locations: PathBuf,
    pub home_locations_census_tract: PathBuf,
    pub project_sites: PathBuf,
    pub state_boundaries: PathBuf, // .shp, .json or .geojson
    pub counties: PathBuf,
    pub census_tracts: PathBuf,
    #[serde(default)]
    pub keys: KeyConfig,
}

/// Attribute names holding the join keys in the boundary files.
/// Zero-padded codes only join when these attributes are stored as text.
#[derive(Debug, Deserialize, Clone)]
pub struct KeyConfig {
    #[serde(default = "default_state_key")]
    pub state: String,
    #[serde(default = "default_county_key")]
    pub county: String,
    #[serde(default = "default_tract_key")]
    pub tract: String,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            state: default_state_key(),
            county: default_county_key(),
            tract: default_tract_key(),
        }
    }
}

fn default_state_key() -> String {
    "state".to_string()
}

fn default_county_key() -> String {
    "county".to_string()
}

fn default_tract_key() -> String {
    "tract".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OutputConfig {
    #[serde(default)]
    pub pretty: bool,
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_with_default_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[input]
home_locations = "data/home_locations.csv"
home_locations_census_tract = "data/home_locations_tract.csv"
project_sites = "data/project_sites.csv"
state_boundaries = "data/states.geojson"
counties = "data/counties.shp"
census_tracts = "data/tracts.geojson"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.input.keys.state, "state");
        assert_eq!(config.input.keys.tract, "tract");
        assert_eq!(config.input.counties, PathBuf::from("data/counties.shp"));
        assert!(!config.output.pretty);
    }

    #[test]
    fn key_overrides_and_output_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[input]
home_locations = "a.csv"
home_locations_census_tract = "b.csv"
project_sites = "c.csv"
state_boundaries = "s.json"
counties = "c.json"
census_tracts = "t.json"

[input.keys]
tract = "GEOID"

[output]
pretty = true
"#
        )
        .unwrap();

        let config = AppConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.input.keys.tract, "GEOID");
        assert_eq!(config.input.keys.county, "county");
        assert!(config.output.pretty);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = AppConfig::load_from_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
