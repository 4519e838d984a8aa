// SPDX-License-Identifier: MIT OR Apache-2.0
//! Environment-driven platform configuration.
//!
//! Both binaries read the same `PRECOG_*` variables; CLI flags (clap `env`
//! feature) override them where a binary exposes one.

/// Runtime settings shared by the API and worker processes.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Durable-store connection string.
    pub database_url: String,
    /// Stream-bus connection string; `None` selects the in-memory bus.
    pub redis_url: Option<String>,
    /// Base URL used when minting entity identifiers in the graph.
    pub graph_base_url: String,
    /// Shared bearer secret; `None` disables the auth gate.
    pub bearer_token: Option<String>,
    /// Allowed CORS origins (comma-separated in the environment).
    pub cors_origins: Vec<String>,
    /// Build identifier surfaced in `/health`.
    pub build_sha: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            redis_url: None,
            graph_base_url: "https://graph.precogs.dev".to_string(),
            bearer_token: None,
            cors_origins: Vec::new(),
            build_sha: "dev".to_string(),
        }
    }
}

impl PlatformConfig {
    /// Load configuration from `PRECOG_*` environment variables, falling
    /// back to defaults for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: env_or("PRECOG_DATABASE_URL", defaults.database_url),
            redis_url: std::env::var("PRECOG_REDIS_URL").ok().filter(|s| !s.is_empty()),
            graph_base_url: env_or("PRECOG_GRAPH_BASE_URL", defaults.graph_base_url),
            bearer_token: std::env::var("PRECOG_BEARER_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
            cors_origins: std::env::var("PRECOG_CORS_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            build_sha: env_or("PRECOG_BUILD_SHA", defaults.build_sha),
        }
    }

    /// Returns `true` when the shared bearer gate is enabled.
    #[must_use]
    pub fn auth_enabled(&self) -> bool {
        self.bearer_token.is_some()
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).ok().filter(|s| !s.is_empty()).unwrap_or(default)
}
