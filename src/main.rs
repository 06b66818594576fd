use std::sync::Arc;

use rxportal::api::router::build_router;
use rxportal::app_state::AppState;
use rxportal::config::ServerConfig;
use rxportal::db::sqlite::open_database;
use rxportal::mailer::LogMailer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = ServerConfig::from_env();
    if let Err(err) = run(config).await {
        tracing::error!(%err, "server failed");
        std::process::exit(1);
    }
}

async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.data_dir)?;
    std::fs::create_dir_all(config.upload_dir())?;

    let conn = open_database(&config.db_path())?;
    let state = Arc::new(AppState::new(config.clone(), conn, Arc::new(LogMailer)));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "rxportal listening");
    axum::serve(listener, app).await?;
    Ok(())
}
