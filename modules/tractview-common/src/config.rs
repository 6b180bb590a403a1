use std::env;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the simulator backend API.
    pub api_base_url: String,
    /// Per-request timeout in seconds. The push channel ignores this: its
    /// response stays open for the lifetime of a run.
    pub request_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if a variable is present but malformed.
    pub fn from_env() -> Self {
        Self {
            api_base_url: env::var("TRACTVIEW_API_URL")
                .unwrap_or_else(|_| "http://localhost:8000/api".to_string()),
            request_timeout_secs: env::var("TRACTVIEW_REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .expect("TRACTVIEW_REQUEST_TIMEOUT_SECS must be a number"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api".to_string(),
            request_timeout_secs: 30,
        }
    }
}
