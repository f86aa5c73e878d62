use std::sync::Arc;

use personal_rag::{
    GeminiGenerationProvider, HuggingFaceEmbeddingProvider, PersonalizedRag, RagConfig,
};
use personal_rag_server::{AppState, ServerConfig, run_server};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = RagConfig::from_env()?;
    let rag = PersonalizedRag::builder()
        .config(config)
        .embedding_provider(Arc::new(HuggingFaceEmbeddingProvider::from_env()?))
        .generation_provider(Arc::new(GeminiGenerationProvider::from_env()?))
        .build()?;

    if !rag.initialize().await? {
        info!("no index yet; POST /reindex to build one");
    }

    run_server(ServerConfig::from_env(), AppState::new(rag)).await
}
