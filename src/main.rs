use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use sqlx::{Row, SqlitePool};

use resource_authz::authz::{
    CachingOrgUnitResolver, ClaimsResolver, DefaultPolicyEvaluator, InMemoryOrgUnitResolver, OrgChartMemberships,
    OrgUnit, PersonProfile, PolicyEvaluator, Principal, RequestContext, WorkflowAccessTable,
};
use resource_authz::{db, AuthzConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Workflow step authorization tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and validate a workflow access table
    ValidateTable {
        /// Table file; defaults to WORKFLOW_ACCESS_PATH, then the built-in table
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Print the access flags for one (subtype, step) pair
    Lookup {
        #[arg(long)]
        subtype: String,
        #[arg(long)]
        step: String,
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Evaluate a principal against a request; exits with status 2 when denied
    Evaluate {
        /// Principal as inline JSON or a path to a JSON file
        #[arg(long)]
        principal: String,
        /// Request context as inline JSON or a path to a JSON file
        #[arg(long)]
        request: String,
        /// Org-chart memberships as inline JSON or a path to a JSON file
        #[arg(long)]
        org_chart: Option<String>,
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Resolve the ownership claims of a person profile against a list of org units
    Claims {
        /// Person profile as inline JSON or a path to a JSON file
        #[arg(long)]
        profile: String,
        /// Org units (JSON array) inline or as a path to a JSON file
        #[arg(long)]
        org_units: String,
    },
    /// Apply pending migrations to DATABASE_URL
    Migrate,
    /// Show migration status against DATABASE_URL
    MigrateStatus,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();
    let config = AuthzConfig::from_env()?;

    match cli.command {
        Commands::ValidateTable { path } => {
            let table = load_table(&config, path.as_deref())?;
            println!("Workflow access table is valid ({} entries)", table.len());
        }
        Commands::Lookup { subtype, step, path } => {
            let table = load_table(&config, path.as_deref())?;
            let access = table.lookup(&subtype, &step);
            if access.is_default() {
                tracing::warn!(%subtype, %step, "no entry, only the bypass applies");
            }
            println!("{}", serde_json::to_string_pretty(&access)?);
        }
        Commands::Evaluate {
            principal,
            request,
            org_chart,
            path,
        } => {
            let table = load_table(&config, path.as_deref())?;
            let principal: Principal = read_json_arg(&principal).context("invalid principal")?;
            let ctx: RequestContext = read_json_arg(&request).context("invalid request")?;
            let org_chart: OrgChartMemberships = match org_chart {
                Some(raw) => read_json_arg(&raw).context("invalid org chart")?,
                None => OrgChartMemberships::new(),
            };

            let access = table.lookup(&ctx.subtype, &ctx.current_step);
            let outcome = DefaultPolicyEvaluator::new().evaluate(&principal, &ctx, &access, &org_chart);
            println!("{}", serde_json::to_string_pretty(&outcome)?);

            if !outcome.success {
                std::process::exit(2);
            }
        }
        Commands::Claims { profile, org_units } => {
            let profile: PersonProfile = read_json_arg(&profile).context("invalid profile")?;
            let units: Vec<OrgUnit> = read_json_arg(&org_units).context("invalid org units")?;

            let org_units = CachingOrgUnitResolver::new(InMemoryOrgUnitResolver::new(units), config.org_unit_cache_ttl);
            let resolver = ClaimsResolver::new(org_units, config.org_unit_lookup_timeout);
            let claims = resolver.resolve_ownership_claims(&profile).await?;
            println!("{}", serde_json::to_string_pretty(&claims)?);
        }
        Commands::Migrate => {
            let pool = db::init(&config).await?;
            tracing::info!("migrations applied");
            pool.close().await;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = db::connect(db::database_url(&config)?).await?;
            print_status(&pool, &get_migrator().await?).await?;
        }
    }

    Ok(())
}

fn load_table(config: &AuthzConfig, path: Option<&Path>) -> anyhow::Result<WorkflowAccessTable> {
    let table = match path {
        Some(path) => WorkflowAccessTable::from_path(path)?,
        None => config.access_table()?,
    };
    Ok(table)
}

fn read_json_arg<T: DeserializeOwned>(raw: &str) -> anyhow::Result<T> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("failed to parse inline JSON");
    }
    let contents =
        std::fs::read_to_string(trimmed).with_context(|| format!("failed to read {}", trimmed))?;
    serde_json::from_str(&contents).with_context(|| format!("failed to parse {}", trimmed))
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    // If the migrations table doesn't exist, nothing is applied yet
    let db_applied = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
        .fetch_optional(pool)
        .await?;
    let applied_versions: HashSet<i64> = if db_applied.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) { "applied" } else { "pending" };
        let desc = migration.description.as_ref().trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // Prefer ./migrations when running from the repo root, else the crate-local folder.
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let migrator_path_display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", migrator_path_display))
}

fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
