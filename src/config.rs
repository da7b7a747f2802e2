//! Server configuration
//!
//! Configuration is loaded from a YAML file (path in `BEACON_CONFIG`, default
//! `beacon.yaml`), with a couple of env-var overrides for deployment. Missing
//! file or missing sections fall back to defaults so the server can start with
//! no config at all.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    /// Webroot to serve for unmatched GET/HEAD requests. Absent = no static files.
    #[serde(default)]
    pub static_files: Option<StaticFilesConfig>,

    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address, e.g. "127.0.0.1:8080"
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Idle timeout for keep-alive connections, in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StaticFilesConfig {
    pub root: String,

    #[serde(default = "default_index")]
    pub index: String,
}

/// Which challenge is sent when a protected route has no credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStrategy {
    Basic,
    Jwt,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_strategy")]
    pub strategy: AuthStrategy,

    /// Access level granted to any authenticated identity the access
    /// resolver does not know about.
    #[serde(default = "default_access")]
    pub default_access: u32,

    /// Lifetime of issued basic-auth tokens, in seconds
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// JWT issuer settings; required when strategy = jwt
    #[serde(default)]
    pub jwt: Option<JwtConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// External authorization endpoint clients are redirected to
    pub authorize_url: String,

    /// Where the issuer's public key (PEM) is fetched from
    pub key_url: String,

    #[serde(default = "default_refresh")]
    pub refresh_secs: u64,

    /// Leeway applied to nbf/iat/exp checks, in seconds
    #[serde(default = "default_leeway")]
    pub leeway_secs: i64,
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_keep_alive() -> u64 {
    15
}

fn default_index() -> String {
    "index.html".to_string()
}

fn default_strategy() -> AuthStrategy {
    AuthStrategy::Basic
}

fn default_access() -> u32 {
    1
}

fn default_token_ttl() -> u64 {
    300
}

fn default_refresh() -> u64 {
    3600
}

fn default_leeway() -> i64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            keep_alive_secs: default_keep_alive(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            default_access: default_access(),
            token_ttl_secs: default_token_ttl(),
            jwt: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            static_files: None,
            auth: AuthConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration file, then applies env overrides.
    ///
    /// A missing file is not an error; `BEACON_LISTEN` overrides the bind
    /// address either way.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("BEACON_CONFIG").unwrap_or_else(|_| "beacon.yaml".to_string());

        let mut cfg = match std::fs::read_to_string(&path) {
            Ok(text) => Self::from_yaml(&text)?,
            Err(_) => Config::default(),
        };

        if let Ok(listen) = std::env::var("BEACON_LISTEN") {
            cfg.server.listen = listen;
        }

        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let cfg = serde_yaml::from_str(text)?;
        Ok(cfg)
    }
}
