use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

/// Upper bound for `token_leeway_secs`; larger values are clamped
pub const MAX_TOKEN_LEEWAY_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub environment: Environment,
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base origin every request path is joined to
    pub base_url: String,
    /// Tenant used when the caller does not name one
    pub default_tenant: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Fixed bearer token; takes precedence over the refresh flow
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub refresh_path: String,
    pub token_leeway_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub user_agent: String,
    /// Applies to connection setup only; whole-request timeouts are the caller's
    pub connect_timeout_secs: Option<u64>,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        // Load .env if present so local runs pick up STUDIO_API_URL and tokens
        let _ = dotenvy::dotenv();

        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides(|key| env::var(key).ok())
    }

    /// Apply `STUDIO_*` overrides read through `lookup`
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // API overrides
        if let Some(v) = lookup("STUDIO_API_URL") {
            self.api.base_url = v;
        }
        if let Some(v) = lookup("STUDIO_TENANT") {
            self.api.default_tenant = non_empty(v);
        }

        // Auth overrides
        if let Some(v) = lookup("STUDIO_API_TOKEN") {
            self.auth.access_token = non_empty(v);
        }
        if let Some(v) = lookup("STUDIO_REFRESH_TOKEN") {
            self.auth.refresh_token = non_empty(v);
        }
        if let Some(v) = lookup("STUDIO_REFRESH_PATH") {
            self.auth.refresh_path = v;
        }
        if let Some(v) = lookup("STUDIO_TOKEN_LEEWAY_SECS") {
            if let Ok(secs) = v.trim().parse::<i64>() {
                self.auth.token_leeway_secs = secs.clamp(0, MAX_TOKEN_LEEWAY_SECS);
            }
        }

        // Transport overrides
        if let Some(v) = lookup("STUDIO_USER_AGENT") {
            self.transport.user_agent = v;
        }
        if let Some(v) = lookup("STUDIO_CONNECT_TIMEOUT_SECS") {
            self.transport.connect_timeout_secs = v.parse().ok();
        }

        self
    }

    fn base(environment: Environment, base_url: &str) -> Self {
        Self {
            environment,
            api: ApiConfig {
                base_url: base_url.to_string(),
                default_tenant: None,
            },
            auth: AuthConfig {
                access_token: None,
                refresh_token: None,
                refresh_path: "/auth/refresh".to_string(),
                token_leeway_secs: 30,
            },
            transport: TransportConfig {
                user_agent: format!("studio-api-client/{}", env!("CARGO_PKG_VERSION")),
                connect_timeout_secs: Some(10),
            },
        }
    }

    pub fn development() -> Self {
        Self::base(Environment::Development, "http://localhost:8787")
    }

    pub fn staging() -> Self {
        Self::base(Environment::Staging, "https://api.staging.studio.example.com")
    }

    pub fn production() -> Self {
        let mut config = Self::base(Environment::Production, "https://api.studio.example.com");
        config.auth.token_leeway_secs = 60;
        config.transport.connect_timeout_secs = Some(5);
        config
    }

    pub fn connect_timeout(&self) -> Option<std::time::Duration> {
        self.transport
            .connect_timeout_secs
            .map(std::time::Duration::from_secs)
    }
}

impl AuthConfig {
    /// How long before expiry a cached token counts as stale
    pub fn token_leeway(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_leeway_secs.clamp(0, MAX_TOKEN_LEEWAY_SECS))
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// Global singleton config - initialized once on first use
pub static CONFIG: Lazy<ClientConfig> = Lazy::new(ClientConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static ClientConfig {
    &CONFIG
}
