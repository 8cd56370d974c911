use crate::source::Dataset;
use thiserror::Error;

/// Failures a query can surface to its caller.
///
/// Unknown sites, projects or states are not errors: they produce empty
/// trees and tables. Rows without a matching boundary are dropped by the
/// join and are not reported either.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("failed to fetch {dataset}")]
    Source {
        dataset: Dataset,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to resolve sites for project {project}")]
    ProjectSites {
        project: String,
        #[source]
        source: anyhow::Error,
    },

    /// Rows for one tract disagree on attributes that must be constant.
    #[error("tract {tract} has {variants} distinct attribute sets across source rows")]
    ConsistencyViolation { tract: String, variants: usize },
}

pub type QueryResult<T> = std::result::Result<T, QueryError>;
