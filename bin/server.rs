// CNAE/ICMS - Web Server
// REST API with Axum over the SQLite store

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cnae_icms::api::{router, AppState};
use cnae_icms::{open_database, Config};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cnae_icms=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    println!("🌐 CNAE-ICMS - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = Config::from_env().context("invalid configuration")?;

    // Open (and create if needed) the database
    let conn = open_database(&config.database_path)
        .with_context(|| format!("cannot open database {}", config.database_path.display()))?;
    info!(path = %config.database_path.display(), "database opened");

    let app = router(AppState::new(conn));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    println!("\n🚀 Server running on http://{}", config.bind_addr);
    println!("   API:    http://{}/api/v1/", config.bind_addr);
    println!("   Health: http://{}/api/health", config.bind_addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}
