use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const TOKEN_PREFIX: &str = "ocw1_";
pub const TOKEN_TTL_DAYS: i64 = 30;
pub const REFRESH_WINDOW_DAYS: i64 = 7;

/// Top-level config (`proxy.toml` + `PROXY_*` env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub ratelimit: RateLimitConfig,
    pub admin_key: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            store: StoreConfig::default(),
            uploads: UploadsConfig::default(),
            providers: ProvidersConfig::default(),
            identity: IdentityConfig::default(),
            ratelimit: RateLimitConfig::default(),
            admin_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    #[serde(default = "default_uploads_root")]
    pub root: String,
    #[serde(default = "default_exports_root")]
    pub exports_root: String,
    /// Per-MIME-class cap; the ingest-level hard stop is this + 2 MiB (§4.6).
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: u64,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            root: default_uploads_root(),
            exports_root: default_exports_root(),
            max_image_bytes: default_max_image_bytes(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    pub deepseek: Option<OpenAiCompatConfig>,
    pub kimi: Option<OpenAiCompatConfig>,
    pub claude: Option<AnthropicConfig>,
    /// Optional OpenAI-compatible gateway standing in for Claude (§4.5).
    pub claude_gateway: Option<OpenAiCompatConfig>,
    /// When true, providers are never called; replies are
    /// `"[MOCK:{provider}:{tier}] {last_user_message}"`.
    #[serde(default)]
    pub mock_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiCompatConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    pub api_key: String,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_apple_issuer")]
    pub apple_issuer: String,
    #[serde(default)]
    pub apple_client_ids: Vec<String>,
    #[serde(default = "default_apple_jwks_url")]
    pub apple_jwks_url: String,
    #[serde(default = "default_jwks_cache_ttl_secs")]
    pub jwks_cache_ttl_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            apple_issuer: default_apple_issuer(),
            apple_client_ids: Vec::new(),
            apple_jwks_url: default_apple_jwks_url(),
            jwks_cache_ttl_secs: default_jwks_cache_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn bool_true() -> bool {
    true
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.ocproxy/proxy.db", home)
}
fn default_uploads_root() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.ocproxy/uploads", home)
}
fn default_exports_root() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.ocproxy/exports", home)
}
fn default_max_image_bytes() -> u64 {
    10 * 1024 * 1024
}
fn default_max_file_bytes() -> u64 {
    20 * 1024 * 1024
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_apple_issuer() -> String {
    "https://appleid.apple.com".to_string()
}
fn default_apple_jwks_url() -> String {
    "https://appleid.apple.com/auth/keys".to_string()
}
fn default_jwks_cache_ttl_secs() -> u64 {
    3600
}

impl ProxyConfig {
    /// Load config from a TOML file with `PROXY_*` env var overrides.
    ///
    /// Checks in order: explicit path argument, then `~/.ocproxy/proxy.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: ProxyConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("PROXY_").split("__"))
            .extract()
            .map_err(|e| crate::error::ProxyError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.ocproxy/proxy.toml", home)
}
