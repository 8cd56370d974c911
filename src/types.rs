use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign};

pub type SiteId = u32;

/// Country value used by the source data for visitors from outside the US.
/// These rows never carry a state or county.
pub const INTERNATIONAL: &str = "International";

/// The two summed measures carried by every home-location row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measures {
    pub visit_days: u64,
    pub visitors_unq: u64,
}

impl Measures {
    pub fn new(visit_days: u64, visitors_unq: u64) -> Self {
        Self {
            visit_days,
            visitors_unq,
        }
    }
}

/// Saturates at `u64::MAX` rather than overflowing.
impl Add for Measures {
    type Output = Measures;

    fn add(self, rhs: Measures) -> Measures {
        Measures {
            visit_days: self.visit_days.saturating_add(rhs.visit_days),
            visitors_unq: self.visitors_unq.saturating_add(rhs.visitors_unq),
        }
    }
}

impl AddAssign for Measures {
    fn add_assign(&mut self, rhs: Measures) {
        *self = *self + rhs;
    }
}

impl Sum for Measures {
    fn sum<I: Iterator<Item = Measures>>(iter: I) -> Self {
        iter.fold(Measures::default(), Add::add)
    }
}

impl<'a> Sum<&'a Measures> for Measures {
    fn sum<I: Iterator<Item = &'a Measures>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Where a bucket of visitors lives.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Location {
    Hierarchical {
        country: String,
        state: String,
        county: String,
    },
    /// Known only to country level, e.g. international visitors.
    CountryOnly { country: String },
}

impl Location {
    /// Classifies a raw (country, state, county) triple.
    pub fn from_parts(country: String, state: Option<String>, county: Option<String>) -> Self {
        let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        match (non_empty(state), non_empty(county)) {
            (Some(state), Some(county)) if country != INTERNATIONAL => Location::Hierarchical {
                country,
                state,
                county,
            },
            _ => Location::CountryOnly { country },
        }
    }

    pub fn country(&self) -> &str {
        match self {
            Location::Hierarchical { country, .. } | Location::CountryOnly { country } => country,
        }
    }

    pub fn state(&self) -> Option<&str> {
        match self {
            Location::Hierarchical { state, .. } => Some(state),
            Location::CountryOnly { .. } => None,
        }
    }

    pub fn county(&self) -> Option<&str> {
        match self {
            Location::Hierarchical { county, .. } => Some(county),
            Location::CountryOnly { .. } => None,
        }
    }
}

/// One row of the HOME_LOCATIONS dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitRecord {
    pub siteid: SiteId,
    pub location: Location,
    pub measures: Measures,
}

/// Demographic attributes published per census tract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    pub median_income: Option<f64>,
    pub population: Option<u64>,
    pub minority_pct: Option<f64>,
}

/// Everything about a tract that should be identical across all rows for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TractAttributes {
    pub tract: String,
    pub state: String,
    pub county: String,
    #[serde(flatten)]
    pub demographics: Demographics,
}

/// One row of the HOME_LOCATIONS_CENSUS_TRACT dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct TractVisitRecord {
    pub siteid: SiteId,
    pub attributes: TractAttributes,
    pub measures: Measures,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectSite {
    pub project: String,
    pub siteid: SiteId,
}

#[derive(Debug, Clone)]
pub struct StateBoundary {
    pub state: String,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone)]
pub struct CountyBoundary {
    pub state: String,
    pub county: String,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone)]
pub struct TractBoundary {
    pub tract: String,
    pub geometry: MultiPolygon<f64>,
}

/// What a query is aggregated over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Scope {
    Site(SiteId),
    Project(String),
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Site(id) => write!(f, "site {}", id),
            Scope::Project(name) => write!(f, "project {}", name),
        }
    }
}

// Summary tree. Built per query, serialized as-is.

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryTree {
    pub id: Scope,
    pub visit_days: u64,
    pub visitors_unq: u64,
    pub countries: Vec<CountrySummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountrySummary {
    pub name: String,
    pub visit_days: u64,
    pub visitors_unq: u64,
    pub states: Vec<StateSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSummary {
    pub name: String,
    pub visit_days: u64,
    pub visitors_unq: u64,
    pub counties: Vec<CountySummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountySummary {
    pub name: String,
    pub visit_days: u64,
    pub visitors_unq: u64,
}

// Flat tables joined against boundaries. Geometry is carried alongside
// the properties and never serialized with them.

#[derive(Debug, Clone, Serialize)]
pub struct StateVisits {
    pub state: String,
    pub visit_days: u64,
    pub visitors_unq: u64,
    #[serde(skip)]
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountyVisits {
    pub state: String,
    pub county: String,
    pub visit_days: u64,
    pub visitors_unq: u64,
    #[serde(skip)]
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TractVisits {
    #[serde(flatten)]
    pub attributes: TractAttributes,
    pub visit_days: u64,
    pub visitors_unq: u64,
    #[serde(skip)]
    pub geometry: MultiPolygon<f64>,
}

/// A tract row with the spatial payload stripped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemographicRow {
    #[serde(flatten)]
    pub attributes: TractAttributes,
    pub visit_days: u64,
    pub visitors_unq: u64,
}

impl From<TractVisits> for DemographicRow {
    fn from(row: TractVisits) -> Self {
        DemographicRow {
            attributes: row.attributes,
            visit_days: row.visit_days,
            visitors_unq: row.visitors_unq,
        }
    }
}

/// Rows that carry a boundary shape.
pub trait Spatial {
    fn geometry(&self) -> &MultiPolygon<f64>;
}

impl Spatial for StateVisits {
    fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }
}

impl Spatial for CountyVisits {
    fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }
}

impl Spatial for TractVisits {
    fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }
}
