//! Visitor home-location statistics for recreation sites and projects.
//!
//! Home-location rows are grouped and summed into a country/state/county
//! tree, or into flat per-state, per-county and per-tract tables joined to
//! boundary shapes.

pub mod aggregate;
pub mod config;
pub mod data;
pub mod error;
pub mod output;
pub mod query;
pub mod source;
pub mod types;

pub use error::{QueryError, QueryResult};
pub use query::{Aggregator, TractFilter};
pub use source::{DataSource, Dataset, InMemorySource, ProjectDirectory};
