use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use visitor_origins::config::AppConfig;
use visitor_origins::data::FileDataSource;
use visitor_origins::output::{to_feature_collection, write_json};
use visitor_origins::types::SiteId;
use visitor_origins::{Aggregator, TractFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ScopeArgs {
    /// Aggregate a single site
    #[arg(long)]
    site: Option<SiteId>,
    /// Aggregate every site of a project
    #[arg(long)]
    project: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Country > state > county summary tree
    Tree {
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Per-state totals with state boundaries (GeoJSON)
    ByState {
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Per-county totals within one state, with county boundaries (GeoJSON)
    ByCounty {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        state: String,
    },
    /// Per-tract totals and demographics with tract boundaries (GeoJSON)
    Tracts {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        county: Option<String>,
    },
    /// Per-tract totals and demographics without geometry
    Demographics {
        #[command(flatten)]
        scope: ScopeArgs,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "visitor_origins=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let app_config = AppConfig::load_from_file(&cli.config)?;
    let pretty = app_config.output.pretty;

    let source = FileDataSource::new(app_config.input);
    let aggregator = Aggregator::new(source.clone(), source);
    let out = io::stdout().lock();

    match &cli.command {
        Commands::Tree { scope } => {
            let tree = match scope.site {
                Some(siteid) => aggregator.home_locations(siteid)?,
                None => aggregator.project_home_locations(project_name(scope))?,
            };
            write_json(out, &tree, pretty)?;
        }
        Commands::ByState { scope } => {
            let rows = match scope.site {
                Some(siteid) => aggregator.home_locations_by_state(siteid)?,
                None => aggregator.project_home_locations_by_state(project_name(scope))?,
            };
            write_json(out, &to_feature_collection(&rows)?, pretty)?;
        }
        Commands::ByCounty { scope, state } => {
            let rows = match scope.site {
                Some(siteid) => aggregator.home_locations_by_county(siteid, state)?,
                None => aggregator.project_home_locations_by_county(project_name(scope), state)?,
            };
            write_json(out, &to_feature_collection(&rows)?, pretty)?;
        }
        Commands::Tracts { scope, state, county } => {
            let filter = TractFilter {
                state: state.as_deref(),
                county: county.as_deref(),
            };
            let rows = match scope.site {
                Some(siteid) => aggregator.home_locations_by_census_tract(siteid, filter)?,
                None => aggregator
                    .project_home_locations_by_census_tract(project_name(scope), filter)?,
            };
            write_json(out, &to_feature_collection(&rows)?, pretty)?;
        }
        Commands::Demographics { scope } => {
            let rows = match scope.site {
                Some(siteid) => aggregator.demographic_summary(siteid)?,
                None => aggregator.project_demographic_summary(project_name(scope))?,
            };
            write_json(out, &rows, pretty)?;
        }
    }

    Ok(())
}

// clap's group guarantees exactly one of --site / --project.
fn project_name(scope: &ScopeArgs) -> &str {
    scope.project.as_deref().unwrap_or_default()
}
