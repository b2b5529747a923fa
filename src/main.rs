use anyhow::{Context, Result};
use demand_forecast_mcp::config::AppConfig;
use demand_forecast_mcp::data::cache::CachedStore;
use demand_forecast_mcp::engine::context::ForecastContext;
use demand_forecast_mcp::server::ForecastServer;
use rmcp::ServiceExt;
use std::sync::Arc;
use tracing_subscriber::{self, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::from_env()?;
    let cache = Arc::new(CachedStore::from_env(config.data_dir.clone())?);
    tracing::info!(
        data_dir = %config.data_dir.display(),
        remote = cache.has_remote(),
        "Loading sales history and model"
    );
    let context = Arc::new(
        ForecastContext::load(&config, &cache)
            .await
            .context("Startup load failed")?,
    );
    tracing::info!(?context, "Forecast context ready");
    let model_dir = config.model_dir.clone();

    if let Ok(port) = std::env::var("PORT") {
        // HTTP mode
        use rmcp::transport::streamable_http_server::{
            session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
        };

        let service = StreamableHttpService::new(
            move || {
                Ok(ForecastServer::new(
                    context.clone(),
                    cache.clone(),
                    model_dir.clone(),
                ))
            },
            LocalSessionManager::default().into(),
            StreamableHttpServerConfig::default(),
        );

        let app = axum::Router::new()
            .nest_service("/mcp", service)
            .route("/health", axum::routing::get(|| async { "ok" }));

        let addr = format!("0.0.0.0:{port}");
        tracing::info!("Starting demand-forecast-mcp HTTP server on {addr}");

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
    } else {
        // stdio mode, stdout carries the protocol
        tracing::info!("Starting demand-forecast-mcp MCP server (stdio)");

        let server = ForecastServer::new(context, cache, model_dir);
        let service = server.serve(rmcp::transport::stdio()).await?;
        service.waiting().await?;
    }

    Ok(())
}
