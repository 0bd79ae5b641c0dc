use anyhow::Context;
use docqa::{api, config, logging, rag::RagService};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init_config();
    let config = config::get_config();
    logging::init_tracing(config).context("Failed to install tracing subscriber")?;

    let service = Arc::new(
        RagService::from_config(config).context("Failed to initialize document QA service")?,
    );
    service.bootstrap().await;
    let app = api::create_router(service, config.max_upload_bytes);

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.server_port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.server_port))?;
    tracing::info!("Listening on http://0.0.0.0:{}", config.server_port);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
