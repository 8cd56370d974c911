//! Grouping, summing and tree building over home-location rows.
//!
//! Every grouping here is keyed through a `BTreeMap`, so children and
//! table rows come out ordered by key regardless of input order.

use crate::error::{QueryError, QueryResult};
use crate::types::{
    CountrySummary, CountySummary, Location, Measures, Scope, StateSummary, SummaryTree,
    TractAttributes, TractVisitRecord, VisitRecord,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Sums measures per key.
pub fn group_sum<K, I>(rows: I) -> BTreeMap<K, Measures>
where
    K: Ord,
    I: IntoIterator<Item = (K, Measures)>,
{
    let mut groups = BTreeMap::new();
    for (key, measures) in rows {
        *groups.entry(key).or_insert_with(Measures::default) += measures;
    }
    groups
}

/// Collapses rows to one per (country, state, county), with country-only
/// rows collapsed per country and listed after the hierarchical ones.
pub fn group_locations(records: &[VisitRecord]) -> Vec<(Location, Measures)> {
    let (hierarchical, country_only): (Vec<_>, Vec<_>) = records
        .iter()
        .partition(|r| matches!(r.location, Location::Hierarchical { .. }));

    let mut grouped: Vec<(Location, Measures)> =
        group_sum(hierarchical.into_iter().map(|r| (r.location.clone(), r.measures)))
            .into_iter()
            .collect();
    grouped.extend(group_sum(
        country_only.into_iter().map(|r| (r.location.clone(), r.measures)),
    ));
    grouped
}

#[derive(Default)]
struct CountryNode<'a> {
    totals: Measures,
    states: BTreeMap<&'a str, StateNode<'a>>,
}

#[derive(Default)]
struct StateNode<'a> {
    totals: Measures,
    counties: BTreeMap<&'a str, Measures>,
}

/// Builds the country > state > county summary for one scope.
///
/// Country-only rows add to their country and the top level but produce no
/// states, so a country made only of such rows has an empty `states` list.
pub fn build_tree<'a, I>(id: Scope, rows: I) -> SummaryTree
where
    I: IntoIterator<Item = (&'a Location, Measures)>,
{
    let mut totals = Measures::default();
    let mut countries: BTreeMap<&'a str, CountryNode<'a>> = BTreeMap::new();

    for (location, measures) in rows {
        totals += measures;
        let country = countries.entry(location.country()).or_default();
        country.totals += measures;

        if let Location::Hierarchical { state, county, .. } = location {
            let state = country.states.entry(state.as_str()).or_default();
            state.totals += measures;
            *state.counties.entry(county.as_str()).or_default() += measures;
        }
    }

    SummaryTree {
        id,
        visit_days: totals.visit_days,
        visitors_unq: totals.visitors_unq,
        countries: countries
            .into_iter()
            .map(|(name, country)| CountrySummary {
                name: name.to_string(),
                visit_days: country.totals.visit_days,
                visitors_unq: country.totals.visitors_unq,
                states: country
                    .states
                    .into_iter()
                    .map(|(name, state)| StateSummary {
                        name: name.to_string(),
                        visit_days: state.totals.visit_days,
                        visitors_unq: state.totals.visitors_unq,
                        counties: state
                            .counties
                            .into_iter()
                            .map(|(name, m)| CountySummary {
                                name: name.to_string(),
                                visit_days: m.visit_days,
                                visitors_unq: m.visitors_unq,
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect(),
    }
}

/// Inner join of grouped measures against boundary rows, in boundary order.
///
/// Grouped keys with no boundary are dropped.
pub fn inner_join<K, B, R>(
    grouped: &BTreeMap<K, Measures>,
    boundaries: Vec<B>,
    key: impl Fn(&B) -> K,
    mut merge: impl FnMut(B, Measures) -> R,
) -> Vec<R>
where
    K: Ord,
{
    let boundary_keys: BTreeSet<K> = boundaries.iter().map(&key).collect();
    let unmatched = grouped.keys().filter(|k| !boundary_keys.contains(*k)).count();
    if unmatched > 0 {
        debug!("{} grouped rows have no matching boundary", unmatched);
    }

    boundaries
        .into_iter()
        .filter_map(|boundary| {
            let measures = grouped.get(&key(&boundary)).copied()?;
            Some(merge(boundary, measures))
        })
        .collect()
}

/// Sums tract rows across sites, keeping the single attribute set each
/// tract carries.
///
/// Fails if any tract appears with more than one attribute set.
pub fn summarize_tracts(
    records: Vec<TractVisitRecord>,
) -> QueryResult<Vec<(TractAttributes, Measures)>> {
    let sums = group_sum(
        records
            .iter()
            .map(|r| (r.attributes.tract.clone(), r.measures)),
    );

    let mut attributes: BTreeMap<String, Vec<TractAttributes>> = BTreeMap::new();
    for record in records {
        let variants = attributes
            .entry(record.attributes.tract.clone())
            .or_default();
        if !variants.contains(&record.attributes) {
            variants.push(record.attributes);
        }
    }

    let distinct: usize = attributes.values().map(Vec::len).sum();
    if distinct != sums.len() {
        let (tract, variants) = attributes
            .iter()
            .find(|(_, v)| v.len() > 1)
            .map(|(tract, v)| (tract.clone(), v.len()))
            .unwrap_or_default();
        return Err(QueryError::ConsistencyViolation { tract, variants });
    }

    Ok(attributes
        .into_iter()
        .filter_map(|(tract, mut variants)| variants.pop().zip(sums.get(&tract).copied()))
        .collect())
}
