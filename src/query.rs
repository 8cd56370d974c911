//! The query surface: one entry point per result shape, for a single site
//! or for every site of a project.

use crate::aggregate::{build_tree, group_locations, group_sum, inner_join, summarize_tracts};
use crate::error::{QueryError, QueryResult};
use crate::source::{DataSource, Dataset, ProjectDirectory};
use crate::types::{
    CountyVisits, DemographicRow, Measures, Scope, SiteId, StateVisits, SummaryTree,
    TractAttributes, TractVisitRecord, TractVisits, VisitRecord,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Optional narrowing of tract queries by the tract's state and county.
#[derive(Debug, Clone, Copy, Default)]
pub struct TractFilter<'a> {
    pub state: Option<&'a str>,
    pub county: Option<&'a str>,
}

impl TractFilter<'_> {
    fn matches(&self, attributes: &TractAttributes) -> bool {
        self.state.map_or(true, |s| attributes.state == s)
            && self.county.map_or(true, |c| attributes.county == c)
    }
}

pub struct Aggregator<S, P> {
    source: S,
    projects: P,
}

impl<S: DataSource, P: ProjectDirectory> Aggregator<S, P> {
    pub fn new(source: S, projects: P) -> Self {
        Self { source, projects }
    }

    pub fn home_locations(&self, siteid: SiteId) -> QueryResult<SummaryTree> {
        self.summary_tree(&Scope::Site(siteid))
    }

    pub fn project_home_locations(&self, project: &str) -> QueryResult<SummaryTree> {
        self.summary_tree(&Scope::Project(project.to_string()))
    }

    pub fn home_locations_by_state(&self, siteid: SiteId) -> QueryResult<Vec<StateVisits>> {
        self.by_state(&Scope::Site(siteid))
    }

    pub fn project_home_locations_by_state(&self, project: &str) -> QueryResult<Vec<StateVisits>> {
        self.by_state(&Scope::Project(project.to_string()))
    }

    /// County totals for one site, restricted to counties of `state`.
    pub fn home_locations_by_county(
        &self,
        siteid: SiteId,
        state: &str,
    ) -> QueryResult<Vec<CountyVisits>> {
        self.by_county(&Scope::Site(siteid), state)
    }

    pub fn project_home_locations_by_county(
        &self,
        project: &str,
        state: &str,
    ) -> QueryResult<Vec<CountyVisits>> {
        self.by_county(&Scope::Project(project.to_string()), state)
    }

    /// Tract rows for one site joined to tract boundaries. Rows are not
    /// summed: each source row for the site yields one output row.
    pub fn home_locations_by_census_tract(
        &self,
        siteid: SiteId,
        filter: TractFilter<'_>,
    ) -> QueryResult<Vec<TractVisits>> {
        let rows: Vec<(TractAttributes, _)> = self
            .tract_rows(&BTreeSet::from([siteid]), filter)?
            .into_iter()
            .map(|r| (r.attributes, r.measures))
            .collect();
        self.join_tracts(rows)
    }

    /// Tract totals over every site in `project`, joined to tract boundaries.
    ///
    /// Fails with [`QueryError::ConsistencyViolation`] when source rows for
    /// one tract disagree on its demographic attributes.
    pub fn project_home_locations_by_census_tract(
        &self,
        project: &str,
        filter: TractFilter<'_>,
    ) -> QueryResult<Vec<TractVisits>> {
        let sites = self.project_site_ids(project)?;
        let rows = summarize_tracts(self.tract_rows(&sites, filter)?)?;
        self.join_tracts(rows)
    }

    pub fn demographic_summary(&self, siteid: SiteId) -> QueryResult<Vec<DemographicRow>> {
        let rows = self.home_locations_by_census_tract(siteid, TractFilter::default())?;
        Ok(rows.into_iter().map(DemographicRow::from).collect())
    }

    pub fn project_demographic_summary(&self, project: &str) -> QueryResult<Vec<DemographicRow>> {
        let rows = self.project_home_locations_by_census_tract(project, TractFilter::default())?;
        Ok(rows.into_iter().map(DemographicRow::from).collect())
    }

    fn summary_tree(&self, scope: &Scope) -> QueryResult<SummaryTree> {
        let rows = self.visit_rows(scope)?;
        let tree = match scope {
            Scope::Site(_) => build_tree(
                scope.clone(),
                rows.iter().map(|r| (&r.location, r.measures)),
            ),
            Scope::Project(_) => {
                let grouped = group_locations(&rows);
                build_tree(scope.clone(), grouped.iter().map(|(l, m)| (l, *m)))
            }
        };
        info!(
            "Built tree for {}: {} countries, {} visit days",
            scope,
            tree.countries.len(),
            tree.visit_days
        );
        Ok(tree)
    }

    fn by_state(&self, scope: &Scope) -> QueryResult<Vec<StateVisits>> {
        let rows = self.visit_rows(scope)?;
        let grouped = group_sum(rows.iter().filter_map(|r| {
            r.location.state().map(|state| (state.to_string(), r.measures))
        }));

        let boundaries = self
            .source
            .state_boundaries()
            .map_err(|source| fetch_error(Dataset::StateBoundaries, source))?;

        Ok(inner_join(
            &grouped,
            boundaries,
            |b| b.state.clone(),
            |b, m| StateVisits {
                state: b.state,
                visit_days: m.visit_days,
                visitors_unq: m.visitors_unq,
                geometry: b.geometry,
            },
        ))
    }

    fn by_county(&self, scope: &Scope, state: &str) -> QueryResult<Vec<CountyVisits>> {
        let rows = self.visit_rows(scope)?;
        let grouped = group_sum(rows.iter().filter_map(|r| {
            let key = (r.location.state()?.to_string(), r.location.county()?.to_string());
            Some((key, r.measures))
        }));

        let boundaries: Vec<_> = self
            .source
            .counties()
            .map_err(|source| fetch_error(Dataset::Counties, source))?
            .into_iter()
            .filter(|b| b.state == state)
            .collect();

        Ok(inner_join(
            &grouped,
            boundaries,
            |b| (b.state.clone(), b.county.clone()),
            |b, m| CountyVisits {
                state: b.state,
                county: b.county,
                visit_days: m.visit_days,
                visitors_unq: m.visitors_unq,
                geometry: b.geometry,
            },
        ))
    }

    /// HOME_LOCATIONS rows belonging to `scope`.
    fn visit_rows(&self, scope: &Scope) -> QueryResult<Vec<VisitRecord>> {
        let sites = match scope {
            Scope::Site(id) => BTreeSet::from([*id]),
            Scope::Project(project) => self.project_site_ids(project)?,
        };

        let rows: Vec<VisitRecord> = self
            .source
            .home_locations()
            .map_err(|source| fetch_error(Dataset::HomeLocations, source))?
            .into_iter()
            .filter(|r| sites.contains(&r.siteid))
            .collect();
        debug!("{} home location rows for {}", rows.len(), scope);
        Ok(rows)
    }

    fn tract_rows(
        &self,
        sites: &BTreeSet<SiteId>,
        filter: TractFilter<'_>,
    ) -> QueryResult<Vec<TractVisitRecord>> {
        let rows: Vec<TractVisitRecord> = self
            .source
            .home_locations_census_tract()
            .map_err(|source| fetch_error(Dataset::HomeLocationsCensusTract, source))?
            .into_iter()
            .filter(|r| sites.contains(&r.siteid) && filter.matches(&r.attributes))
            .collect();
        debug!("{} tract rows for {} sites", rows.len(), sites.len());
        Ok(rows)
    }

    /// Inner join on tract code, in boundary order.
    fn join_tracts(&self, rows: Vec<(TractAttributes, Measures)>) -> QueryResult<Vec<TractVisits>> {
        let boundaries = self
            .source
            .census_tracts()
            .map_err(|source| fetch_error(Dataset::CensusTract, source))?;

        let mut by_tract: BTreeMap<&str, Vec<&(TractAttributes, Measures)>> = BTreeMap::new();
        for row in &rows {
            by_tract.entry(row.0.tract.as_str()).or_default().push(row);
        }

        let mut joined = Vec::new();
        for boundary in &boundaries {
            let Some(matches) = by_tract.get(boundary.tract.as_str()) else {
                continue;
            };
            for (attributes, measures) in matches.iter().copied() {
                joined.push(TractVisits {
                    attributes: attributes.clone(),
                    visit_days: measures.visit_days,
                    visitors_unq: measures.visitors_unq,
                    geometry: boundary.geometry.clone(),
                });
            }
        }
        debug!("{} of {} tract rows matched a boundary", joined.len(), rows.len());
        Ok(joined)
    }

    /// Distinct site ids of `project`.
    fn project_site_ids(&self, project: &str) -> QueryResult<BTreeSet<SiteId>> {
        let sites: BTreeSet<SiteId> = self
            .projects
            .project_sites(project)
            .map_err(|source| QueryError::ProjectSites {
                project: project.to_string(),
                source,
            })?
            .into_iter()
            .map(|ps| ps.siteid)
            .collect();
        debug!("Project {} has {} sites", project, sites.len());
        Ok(sites)
    }
}

fn fetch_error(dataset: Dataset, source: anyhow::Error) -> QueryError {
    QueryError::Source { dataset, source }
}
