use std::net::SocketAddr;

/// Application-level constants
pub const APP_NAME: &str = "Casenote";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default log filter when RUST_LOG is not set.
pub fn default_log_filter() -> String {
    "casenote=info,tower_http=warn".to_string()
}

/// Maximum files accepted in one batch upload.
pub const MAX_BATCH_FILES: usize = 20;

/// Maximum size of a single uploaded file (50 MB).
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Maximum size of an audio file sent for transcription (25 MB, provider cap).
pub const MAX_AUDIO_SIZE: u64 = 25 * 1024 * 1024;

/// Extracted text above this size is gzip-compressed before persistence (1 MB).
pub const COMPRESS_THRESHOLD: usize = 1024 * 1024;

/// Extracted text is truncated to this many characters in the document record.
pub const STORED_TEXT_LIMIT: usize = 5000;

/// Service configuration, read from the environment at startup.
///
/// A missing provider key does not fail startup; that provider is registered
/// as not-initialized and degrades at call time.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub perplexity_api_key: Option<String>,
    /// Concurrent files processed by the batch worker pool.
    pub batch_concurrency: usize,
    /// Retries per file before it is reported as failed.
    pub max_retries: u32,
}

impl Config {
    pub fn from_env() -> Self {
        let bind_addr = std::env::var("CASENOTE_ADDR")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 5000)));

        Self {
            bind_addr,
            openai_api_key: non_empty_env("OPENAI_API_KEY"),
            anthropic_api_key: non_empty_env("ANTHROPIC_API_KEY"),
            gemini_api_key: non_empty_env("GEMINI_API_KEY"),
            perplexity_api_key: non_empty_env("PERPLEXITY_API_KEY"),
            batch_concurrency: env_usize("CASENOTE_BATCH_CONCURRENCY", 5),
            max_retries: env_usize("CASENOTE_MAX_RETRIES", 2) as u32,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            openai_api_key: None,
            anthropic_api_key: None,
            gemini_api_key: None,
            perplexity_api_key: None,
            batch_concurrency: 5,
            max_retries: 2,
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_local_port_5000() {
        let cfg = Config::default();
        assert_eq!(cfg.bind_addr.port(), 5000);
        assert!(cfg.bind_addr.ip().is_loopback());
    }

    #[test]
    fn default_has_no_provider_keys() {
        let cfg = Config::default();
        assert!(cfg.openai_api_key.is_none());
        assert!(cfg.anthropic_api_key.is_none());
        assert!(cfg.gemini_api_key.is_none());
        assert!(cfg.perplexity_api_key.is_none());
    }

    #[test]
    fn default_worker_pool_is_five_wide() {
        assert_eq!(Config::default().batch_concurrency, 5);
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }
}
