//! Medical report extraction server.

use medical_report_extractor::config::Config;
use medical_report_extractor::llm::MistralChatClient;
use medical_report_extractor::ocr::MistralOcrProvider;
use medical_report_extractor::server::{build_router, AppState};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    medical_report_extractor::init_tracing(&config.log_filter);
    info!("Loaded configuration: {:?}", config);

    let http = config.http_client()?;
    let ocr = MistralOcrProvider::new(&config, http.clone())?;
    let model = MistralChatClient::new(&config, http)?;
    info!(
        "Mistral clients initialized (ocr={}, chat={})",
        config.ocr_model, config.chat_model
    );

    let bind_addr = config.bind_addr.clone();
    let app = build_router(AppState::new(config, Arc::new(ocr), Arc::new(model)));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
