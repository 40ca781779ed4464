use anyhow::Context;

use restkit_core::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    restkit_observability::init();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    if config.debug {
        tracing::warn!("debug mode enabled");
    }
    tracing::info!(
        db_engine = %config.db_engine,
        database = %config.database.database.display(),
        "configuration loaded"
    );

    let addr = config.bind_addr;
    let app = restkit_api::app::routes::build_app(config);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
