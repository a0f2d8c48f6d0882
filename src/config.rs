#[cfg(feature = "cli")]
use clap::Parser;
use std::time::Duration;
use url::Url;

/// # AI Factory Configuration
///
/// Configuration is read from command-line arguments with environment variable
/// fallbacks, after loading a `.env` file if one is present.
///
/// Only three options reach the chat proxy itself: the upstream base URL, the
/// upstream API key and the request timeout. Everything else configures the
/// server, logging, the embedding backend and the model catalog.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "cli", derive(Parser))]
#[cfg_attr(feature = "cli", command(name = "aifactory"))]
#[cfg_attr(feature = "cli", command(about = "Gateway for chat completion and embedding inference over a unified HTTP API"))]
#[cfg_attr(feature = "cli", command(version))]
pub struct Config {
    // =============================================================================
    // SERVER
    // =============================================================================

    /// Server port to listen on
    #[cfg_attr(feature = "cli", arg(short, long, env = "PORT", default_value = "8000"))]
    pub port: u16,

    /// Server host to bind to
    #[cfg_attr(feature = "cli", arg(long, env = "HOST", default_value = "0.0.0.0"))]
    pub host: String,

    // =============================================================================
    // UPSTREAM PROVIDER
    // =============================================================================

    /// Base URL of the OpenAI-compatible upstream (the `/chat/completions` path is appended)
    #[cfg_attr(feature = "cli", arg(long, env = "OPENROUTER_BASE_URL", default_value = "https://openrouter.ai/api/v1"))]
    pub upstream_base_url: String,

    /// Bearer token sent to the upstream provider
    #[cfg_attr(feature = "cli", arg(long, env = "OPENROUTER_API_KEY", default_value = "", hide_env_values = true))]
    pub upstream_api_key: String,

    /// Timeout in seconds for a buffered call, and for the response headers of a streamed call
    #[cfg_attr(feature = "cli", arg(long, env = "REQUEST_TIMEOUT", default_value = "60"))]
    pub request_timeout: u64,

    /// Maximum idle pooled connections kept per upstream host
    #[cfg_attr(feature = "cli", arg(long, env = "HTTP_CLIENT_MAX_CONNECTIONS_PER_HOST", default_value = "10"))]
    pub http_client_max_connections_per_host: usize,

    // =============================================================================
    // EMBEDDINGS AND CATALOG
    // =============================================================================

    /// Comma separated list of embedding model ids served by the local backend
    #[cfg_attr(feature = "cli", arg(long, env = "EMBEDDING_MODELS", default_value = "all-MiniLM-L6-v2"))]
    pub embedding_models: String,

    /// Dimension of the vectors produced by the local embedding backend
    #[cfg_attr(feature = "cli", arg(long, env = "EMBEDDING_DIMENSION", default_value = "384"))]
    pub embedding_dimension: usize,

    /// Load the sample model records into the catalog on startup
    #[cfg_attr(feature = "cli", arg(long, env = "SEED_CATALOG", default_value = "false"))]
    pub seed_catalog: bool,

    // =============================================================================
    // LOGGING AND LIFECYCLE
    // =============================================================================

    /// Log level (error, warn, info, debug, trace)
    #[cfg_attr(feature = "cli", arg(long, env = "RUST_LOG", default_value = "info"))]
    pub log_level: String,

    /// Environment (development, staging, production)
    #[cfg_attr(feature = "cli", arg(long, env = "ENVIRONMENT", default_value = "development"))]
    pub environment: String,

    /// Seconds to wait for in-flight requests after a shutdown signal
    #[cfg_attr(feature = "cli", arg(long, env = "SHUTDOWN_TIMEOUT", default_value = "30"))]
    pub shutdown_timeout: u64,
}

impl Config {
    /// Parse configuration from command line arguments and environment variables.
    ///
    /// Loads `.env`, parses, installs the log subscriber and validates. Exits the
    /// process with a message if validation fails.
    #[cfg(feature = "cli")]
    pub fn parse_args() -> Self {
        let _ = dotenv::dotenv();

        let config = Self::parse();

        config.setup_logging();

        if let Err(err) = config.validate() {
            eprintln!("Configuration validation failed: {}", err);
            std::process::exit(1);
        }

        config
    }

    /// Create a test configuration with minimal required fields.
    pub fn for_test() -> Self {
        Self {
            port: 8000,
            host: "127.0.0.1".to_string(),
            upstream_base_url: "http://localhost:9000/api/v1".to_string(),
            upstream_api_key: "test-key".to_string(),
            request_timeout: 30,
            http_client_max_connections_per_host: 10,
            embedding_models: "all-MiniLM-L6-v2".to_string(),
            embedding_dimension: 384,
            seed_catalog: false,
            log_level: "info".to_string(),
            environment: "development".to_string(),
            shutdown_timeout: 30,
        }
    }

    /// Request timeout as a `Duration`
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Embedding model ids served locally, trimmed, empties dropped
    pub fn embedding_model_ids(&self) -> Vec<String> {
        self.embedding_models
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Upstream URL reduced to scheme and host, safe to log.
    pub fn safe_upstream_url(&self) -> String {
        match Url::parse(&self.upstream_base_url) {
            Ok(url) => format!("{}://{}", url.scheme(), url.host_str().unwrap_or("unknown")),
            Err(_) => "invalid-url".to_string(),
        }
    }

    #[cfg(feature = "cli")]
    fn setup_logging(&self) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(&self.log_level)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .try_init();
    }

    /// Validate configuration values and provide helpful error messages.
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0. Please specify a valid port number (1-65535).".to_string());
        }

        if self.host.is_empty() {
            return Err("Host cannot be empty. Please specify a valid host (e.g., '0.0.0.0' or '127.0.0.1').".to_string());
        }

        if self.upstream_base_url.is_empty() {
            return Err("Upstream base URL cannot be empty.".to_string());
        }

        match Url::parse(&self.upstream_base_url) {
            Ok(url) => {
                if !["http", "https"].contains(&url.scheme()) {
                    return Err(format!(
                        "Invalid URL scheme '{}'. Only 'http' and 'https' are supported.",
                        url.scheme()
                    ));
                }

                if url.host().is_none() {
                    return Err("Upstream base URL must include a host (e.g., 'https://openrouter.ai/api/v1').".to_string());
                }

                if self.environment == "production" && url.scheme() == "http" {
                    eprintln!(
                        "⚠️  Warning: Using HTTP for the upstream in production is not recommended."
                    );
                }
            }
            Err(err) => {
                return Err(format!(
                    "Invalid upstream base URL '{}': {}. \
                    Please provide a valid URL (e.g., 'https://openrouter.ai/api/v1').",
                    self.upstream_base_url, err
                ));
            }
        }

        if self.upstream_api_key.is_empty() {
            eprintln!(
                "⚠️  Warning: OPENROUTER_API_KEY is not set. Upstream calls will most likely be rejected."
            );
        }

        if self.request_timeout == 0 {
            return Err("Request timeout must be greater than 0 seconds.".to_string());
        }
        if self.request_timeout > 600 {
            eprintln!(
                "⚠️  Warning: Request timeout of {} seconds is very high.",
                self.request_timeout
            );
        }

        if self.http_client_max_connections_per_host == 0 {
            return Err("HTTP client max connections per host must be greater than 0.".to_string());
        }

        if self.embedding_dimension == 0 {
            return Err("Embedding dimension must be greater than 0.".to_string());
        }

        if self.embedding_model_ids().is_empty() {
            return Err("At least one embedding model id must be configured.".to_string());
        }

        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.environment.as_str()) {
            return Err(format!(
                "Invalid environment '{}'. Valid options are: {}",
                self.environment,
                valid_environments.join(", ")
            ));
        }

        // full filter directives ("ai_factory=debug,tower_http=info") are left to EnvFilter
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        let is_directive = self.log_level.contains('=') || self.log_level.contains(',');
        if !is_directive && !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log level '{}'. Valid options are: {}",
                self.log_level,
                valid_log_levels.join(", ")
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_is_valid() {
        assert!(Config::for_test().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_scheme() {
        let mut config = Config::for_test();
        config.upstream_base_url = "ftp://example.com/v1".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.contains("ftp"));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let mut config = Config::for_test();
        config.request_timeout = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let mut config = Config::for_test();
        config.log_level = "verbose".to_string();
        assert!(config.validate().is_err());

        config.log_level = "ai_factory=debug,tower_http=info".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_embedding_model_ids() {
        let mut config = Config::for_test();
        config.embedding_models = " all-MiniLM-L6-v2, ,bge-small ".to_string();
        assert_eq!(config.embedding_model_ids(), vec!["all-MiniLM-L6-v2", "bge-small"]);
    }

    #[test]
    fn test_safe_upstream_url_hides_path() {
        let mut config = Config::for_test();
        config.upstream_base_url = "https://openrouter.ai/api/v1".to_string();
        assert_eq!(config.safe_upstream_url(), "https://openrouter.ai");
    }
}
