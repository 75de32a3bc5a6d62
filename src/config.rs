//! Configuration management
//!
//! One explicit [`Config`] value is built at startup from a YAML file plus
//! `TENANT_GATEWAY_`-prefixed environment variables, then passed into every
//! component. Deployments differ along two axes — whether the auxiliary
//! content-expiry claim is issued (`token.content_ttl`) and whether upload
//! forwarding exists at all (`proxy` present) — both expressed in this
//! single structure.

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Server bind configuration
    pub server: ServerConfig,
    /// Signing-key source
    pub key: KeyConfig,
    /// Token issuance parameters
    pub token: TokenConfig,
    /// Upload forwarding policy; omit the section to disable the upload route
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
    /// CORS policy applied to the gateway's own API responses
    pub cors: CorsConfig,
    /// Settings handed to the identity-provider collaborator
    pub idp: IdpConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Signing-key source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Path to the service-account JSON file holding the private key
    pub path: String,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            path: "service-account.json".to_string(),
        }
    }
}

/// Token issuance parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Issuer URL asserted in every token (`iss`)
    pub issuer: String,
    /// Fixed tenant identity asserted in every token (`sub`)
    pub subject: String,
    /// Downstream service URL the tokens are scoped to (`aud`)
    pub audience: String,
    /// Token lifetime; `exp` is always `iat + ttl`
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// When set, each token also carries a `content_exp` claim at
    /// `issuance + content_ttl`. This is the custom-claims deployment axis.
    #[serde(default, with = "humantime_serde::option")]
    pub content_ttl: Option<Duration>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: "http://abc.witheztravel.com".to_string(),
            subject: "CUS000123456".to_string(),
            audience: "https://us-central1-sandbox-289103.cloudfunctions.net/function-1"
                .to_string(),
            ttl: Duration::from_secs(60),
            content_ttl: None,
        }
    }
}

/// Upload forwarding policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Upstream host
    pub host: String,
    /// Upstream port
    pub port: u16,
    /// Connect over TLS
    pub tls: bool,
    /// Fixed outbound path; the inbound path and query string are ignored
    pub path: String,
    /// Connection establishment deadline
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Total response deadline
    #[serde(with = "humantime_serde")]
    pub response_timeout: Duration,
    /// Literal the outbound `Origin` header is forced to, regardless of the
    /// inbound value. A trust assertion toward the upstream, unrelated to
    /// the CORS policy on the gateway's own responses.
    pub origin: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: "us-central1-sandbox-289103.cloudfunctions.net".to_string(),
            port: 443,
            tls: true,
            path: "/function-1".to_string(),
            connect_timeout: Duration::from_millis(2000),
            response_timeout: Duration::from_millis(2000),
            origin: "http://abc.witheztravel.com".to_string(),
        }
    }
}

/// CORS policy for the gateway's own API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origin; `*` allows any
    pub allow_origin: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
        }
    }
}

/// Identity-provider collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdpConfig {
    /// Cookie/session signing secrets for the collaborator.
    /// Each entry supports: literal value, `env:VAR_NAME`, or `auto`
    /// (generates a random secret at startup).
    pub cookie_keys: Vec<String>,
}

impl Default for IdpConfig {
    fn default() -> Self {
        Self {
            cookie_keys: vec!["auto".to_string()],
        }
    }
}

impl IdpConfig {
    /// Resolve the cookie secrets (expand env vars, generate if `auto`)
    #[must_use]
    pub fn resolve_cookie_keys(&self) -> Vec<String> {
        self.cookie_keys
            .iter()
            .map(|key| {
                if key == "auto" {
                    use rand::RngExt;
                    let random_bytes: [u8; 32] = rand::rng().random();
                    base64::Engine::encode(
                        &base64::engine::general_purpose::URL_SAFE_NO_PAD,
                        random_bytes,
                    )
                } else if let Some(var_name) = key.strip_prefix("env:") {
                    env::var(var_name).unwrap_or_else(|_| key.clone())
                } else {
                    key.clone()
                }
            })
            .collect()
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("TENANT_GATEWAY_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Env files go into the process environment before ${VAR} expansion
        config.load_env_files();
        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in secret-bearing values
    fn expand_env_vars(&mut self) {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();

        for key in &mut self.idp.cookie_keys {
            *key = Self::expand_string(&re, key);
        }
        self.key.path = Self::expand_string(&re, &self.key.path);
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }

    /// Reject configurations no deployment variant could run with
    fn validate(&self) -> Result<()> {
        if self.token.ttl.is_zero() {
            return Err(Error::Config("token.ttl must be positive".to_string()));
        }
        Url::parse(&self.token.issuer)
            .map_err(|e| Error::Config(format!("token.issuer is not a URL: {e}")))?;
        Url::parse(&self.token.audience)
            .map_err(|e| Error::Config(format!("token.audience is not a URL: {e}")))?;
        if let Some(proxy) = &self.proxy {
            if proxy.host.is_empty() {
                return Err(Error::Config("proxy.host must not be empty".to_string()));
            }
            if !proxy.path.starts_with('/') {
                return Err(Error::Config(format!(
                    "proxy.path must be absolute, got '{}'",
                    proxy.path
                )));
            }
        }
        Ok(())
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to a human-readable string. Sub-second durations
    /// serialize as milliseconds so proxy deadlines round-trip exactly.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "1d", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse(s: &str) -> Result<Duration, String> {
        let number = |v: &str| {
            v.parse::<u64>()
                .map_err(|e| format!("invalid duration '{s}': {e}"))
        };

        if let Some(ms) = s.strip_suffix("ms") {
            number(ms).map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            number(secs).map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            number(mins).map(|m| Duration::from_secs(m * 60))
        } else if let Some(hours) = s.strip_suffix('h') {
            number(hours).map(|h| Duration::from_secs(h * 3600))
        } else if let Some(days) = s.strip_suffix('d') {
            number(days).map(|d| Duration::from_secs(d * 86_400))
        } else {
            // Assume seconds
            number(s).map(Duration::from_secs)
        }
    }

    /// Same representation for `Option<Duration>` fields
    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        /// Serialize an optional duration, `None` as null
        ///
        /// # Errors
        ///
        /// Returns a serialization error if the serializer fails.
        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        /// Deserialize an optional human-readable duration
        ///
        /// # Errors
        ///
        /// Returns a deserialization error if the string cannot be parsed.
        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let opt = Option::<String>::deserialize(deserializer)?;
            opt.map(|s| super::parse(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
