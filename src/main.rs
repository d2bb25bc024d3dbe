mod ui;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cnae_icms::{
    import_csv, load_snapshot, open_database, ApiClient, CachedLookup, Config, Dashboard,
    RangeFilter,
};

#[derive(Parser)]
#[command(name = "cnae-icms", version, about = "ICMS collection analytics by CNAE classification.")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the terminal dashboard (default).
    Dashboard {
        /// API base URL (overrides CNAE_API_URL)
        #[arg(long = "api-url")]
        api_url: Option<String>,
    },
    /// Seed the database from a denormalized collection CSV.
    Import {
        /// Path to the CSV file
        csv: PathBuf,
        /// Database file (overrides CNAE_DATABASE_PATH)
        #[arg(long)]
        database: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("invalid configuration")?;

    match cli.command.unwrap_or(Commands::Dashboard { api_url: None }) {
        Commands::Dashboard { api_url } => {
            init_file_tracing(&config.log_file)?;
            run_dashboard(&config, api_url.as_deref().unwrap_or(config.api_url.as_str()))
        }
        Commands::Import { csv, database } => {
            init_stderr_tracing();
            run_import(&csv, database.as_deref().unwrap_or(config.database_path.as_path()))
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| "cnae_icms=info".into())
}

/// The dashboard owns the terminal, so logs go to a file.
fn init_file_tracing(path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("cannot create log file {}", path.display()))?;

    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .init();
    Ok(())
}

fn init_stderr_tracing() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run_import(csv: &Path, database: &Path) -> Result<()> {
    println!("🗄️  CSV Import → SQLite + WAL");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n🔧 Opening database {}...", database.display());
    let mut conn = open_database(database)
        .with_context(|| format!("cannot open database {}", database.display()))?;

    println!("\n📂 Importing {}...", csv.display());
    let summary = import_csv(&mut conn, csv)
        .with_context(|| format!("import of {} failed", csv.display()))?;

    println!("✓ {} rows read", summary.rows);
    for (entity, created) in &summary.created {
        println!("✓ {} new {}", created, entity);
    }
    println!("✓ {} collection records inserted", summary.collections);

    Ok(())
}

fn run_dashboard(config: &Config, api_url: &str) -> Result<()> {
    println!("🖥️  Loading CNAE-ICMS Analytics...\n");

    let client = ApiClient::new(api_url).context("cannot build HTTP client")?;

    println!("📊 Fetching collection records from {}...", api_url);
    let snapshot = load_snapshot(&client)
        .with_context(|| format!("cannot load collection records from {}", api_url))?;
    println!(
        "✓ Loaded {} records ({} dropped)\n",
        snapshot.records.len(),
        snapshot.report.dropped.len()
    );

    let filter = RangeFilter::new(config.start_date, config.end_date);
    let dashboard = Dashboard::new(snapshot.records, filter);
    let lookup = CachedLookup::new(client);

    let mut app = ui::App::new(
        dashboard,
        Box::new(lookup),
        &config.currency_prefix,
        snapshot.report,
    );
    ui::run_ui(&mut app)?;

    println!("\n✅ Dashboard closed");
    Ok(())
}
