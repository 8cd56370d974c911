//! Contracts for the data the aggregator reads, plus an in-memory
//! implementation of them.

use crate::types::{
    CountyBoundary, ProjectSite, StateBoundary, TractBoundary, TractVisitRecord, VisitRecord,
};
use anyhow::Result;
use std::fmt;

/// The closed set of tables a data source serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    HomeLocations,
    StateBoundaries,
    Counties,
    HomeLocationsCensusTract,
    CensusTract,
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dataset::HomeLocations => write!(f, "HOME_LOCATIONS"),
            Dataset::StateBoundaries => write!(f, "STATE_BOUNDARIES"),
            Dataset::Counties => write!(f, "COUNTIES"),
            Dataset::HomeLocationsCensusTract => write!(f, "HOME_LOCATIONS_CENSUS_TRACT"),
            Dataset::CensusTract => write!(f, "CENSUS_TRACT"),
        }
    }
}

/// Serves full tables. Called once per table per query; implementations
/// are free to cache.
pub trait DataSource {
    fn home_locations(&self) -> Result<Vec<VisitRecord>>;
    fn state_boundaries(&self) -> Result<Vec<StateBoundary>>;
    fn counties(&self) -> Result<Vec<CountyBoundary>>;
    fn home_locations_census_tract(&self) -> Result<Vec<TractVisitRecord>>;
    fn census_tracts(&self) -> Result<Vec<TractBoundary>>;
}

/// Maps a project to the sites that belong to it.
pub trait ProjectDirectory {
    /// Every (project, site) row for `project`. May contain duplicates.
    fn project_sites(&self, project: &str) -> Result<Vec<ProjectSite>>;
}

/// Tables held in plain vectors.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    pub home_locations: Vec<VisitRecord>,
    pub state_boundaries: Vec<StateBoundary>,
    pub counties: Vec<CountyBoundary>,
    pub home_locations_census_tract: Vec<TractVisitRecord>,
    pub census_tracts: Vec<TractBoundary>,
    pub project_sites: Vec<ProjectSite>,
}

impl DataSource for InMemorySource {
    fn home_locations(&self) -> Result<Vec<VisitRecord>> {
        Ok(self.home_locations.clone())
    }

    fn state_boundaries(&self) -> Result<Vec<StateBoundary>> {
        Ok(self.state_boundaries.clone())
    }

    fn counties(&self) -> Result<Vec<CountyBoundary>> {
        Ok(self.counties.clone())
    }

    fn home_locations_census_tract(&self) -> Result<Vec<TractVisitRecord>> {
        Ok(self.home_locations_census_tract.clone())
    }

    fn census_tracts(&self) -> Result<Vec<TractBoundary>> {
        Ok(self.census_tracts.clone())
    }
}

impl ProjectDirectory for InMemorySource {
    fn project_sites(&self, project: &str) -> Result<Vec<ProjectSite>> {
        Ok(self
            .project_sites
            .iter()
            .filter(|ps| ps.project == project)
            .cloned()
            .collect())
    }
}
