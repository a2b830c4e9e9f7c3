use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use casenote::config::{self, Config};
use casenote::pipeline::batch::{BatchProcessor, DedupCache, JobTracker};
use casenote::pipeline::ingest::DocumentIngestor;
use casenote::providers::{
    AnthropicProvider, GeminiProvider, OpenAiProvider, PerplexityProvider,
};
use casenote::router::ModelRouter;
use casenote::server::{self, AppState};
use casenote::store::InMemoryDocumentStore;

/// Hashes remembered for dedup before the oldest entries roll off.
const DEDUP_CAPACITY: usize = 10_000;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    let config = Config::from_env();
    info!(
        version = config::APP_VERSION,
        addr = %config.bind_addr,
        "starting {}",
        config::APP_NAME
    );
    for (name, key) in [
        ("openai", &config.openai_api_key),
        ("anthropic", &config.anthropic_api_key),
        ("gemini", &config.gemini_api_key),
        ("perplexity", &config.perplexity_api_key),
    ] {
        if key.is_none() {
            warn!(provider = name, "no API key configured, provider will degrade");
        }
    }

    let openai = Arc::new(OpenAiProvider::new(config.openai_api_key.clone()));
    let router = Arc::new(ModelRouter::new(
        openai.clone(),
        Arc::new(AnthropicProvider::new(config.anthropic_api_key.clone())),
        Arc::new(GeminiProvider::new(config.gemini_api_key.clone())),
        Arc::new(PerplexityProvider::new(config.perplexity_api_key.clone())),
    ));
    let ingestor = Arc::new(DocumentIngestor::new(router, openai));

    let batch = BatchProcessor::new(
        ingestor,
        Arc::new(InMemoryDocumentStore::new()),
        Arc::new(JobTracker::new()),
        Arc::new(DedupCache::new(DEDUP_CAPACITY)),
        config.batch_concurrency,
        config.max_retries,
    );

    let state = AppState {
        batch: Arc::new(batch),
    };
    server::serve(&config, state).await
}
