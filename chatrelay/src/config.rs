use serde::Deserialize;
use std::collections::HashMap;
use std::env;

use crate::citations::{DEFAULT_BUDGET_BYTES, DEFAULT_EXPIRY_DAYS};

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_env_opt<T: std::str::FromStr>(var: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Ignoring.", val, var, e);
                None
            }
        },
        Err(_) => None,
    }
}

/// Parse `UPSTREAM_KNOWLEDGE_BASES` env var.
/// Format: comma-separated `knowledge_base:app_key` pairs, e.g. `hr:app-123,it:app-456`
fn parse_knowledge_base_keys() -> HashMap<String, String> {
    match env::var("UPSTREAM_KNOWLEDGE_BASES") {
        Ok(val) if !val.is_empty() => val
            .split(',')
            .filter_map(|pair| {
                let mut parts = pair.splitn(2, ':');
                let knowledge_base = parts.next()?.trim();
                let api_key = parts.next()?.trim();
                if knowledge_base.is_empty() || api_key.is_empty() {
                    tracing::warn!(
                        "Invalid knowledge base pair '{}' in UPSTREAM_KNOWLEDGE_BASES, skipping",
                        pair
                    );
                    None
                } else {
                    Some((knowledge_base.to_string(), api_key.to_string()))
                }
            })
            .collect(),
        _ => HashMap::new(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub upstream: UpstreamConfig,
    pub relay: RelayConfig,
    pub citation_cache: CitationCacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub api_keys: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub auth_token: Option<String>,
    pub local_path: Option<String>,
    pub busy_timeout_ms: u64,
    pub journal_mode: String,
    pub synchronous: String,
}

impl DatabaseConfig {
    /// Local file database with default pragmas.
    pub fn local(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            local_path: None,
            busy_timeout_ms: 5000,
            journal_mode: "WAL".to_string(),
            synchronous: "NORMAL".to_string(),
        }
    }
}

/// Retrieval-augmented chat API the relay streams from.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: String,
    /// App key used when the request names no knowledge base.
    pub api_key: Option<String>,
    /// Knowledge base id -> app key.
    pub knowledge_bases: HashMap<String, String>,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Frames buffered toward the client before forwarding backpressures.
    pub channel_capacity: usize,
    /// How long one frame may wait for channel space before the client is
    /// treated as gone.
    pub send_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CitationCacheConfig {
    /// Ceiling on one conversation's serialized slot, format overhead included.
    pub budget_bytes: usize,
    pub expiry_days: i64,
    pub max_slots: usize,
    pub purge_interval_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost/v1".to_string(),
            api_key: None,
            knowledge_bases: HashMap::new(),
            timeout_secs: 300,
            connect_timeout_secs: 10,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            send_timeout_ms: 30_000,
        }
    }
}

impl Default for CitationCacheConfig {
    fn default() -> Self {
        Self {
            budget_bytes: DEFAULT_BUDGET_BYTES,
            expiry_days: DEFAULT_EXPIRY_DAYS,
            max_slots: 10_000,
            purge_interval_secs: 3600,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("CHATRELAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_env_or("CHATRELAY_PORT", 3000),
                api_keys: env::var("CHATRELAY_API_KEYS")
                    .map(|keys| keys.split(',').map(|s| s.trim().to_string()).collect())
                    .unwrap_or_default(),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "file:chatrelay.db".to_string()),
                auth_token: env::var("DATABASE_AUTH_TOKEN").ok(),
                local_path: env::var("DATABASE_LOCAL_PATH").ok(),
                busy_timeout_ms: parse_env_or("DATABASE_BUSY_TIMEOUT_MS", 5000),
                journal_mode: env::var("DATABASE_JOURNAL_MODE").unwrap_or_else(|_| "WAL".to_string()),
                synchronous: env::var("DATABASE_SYNCHRONOUS")
                    .unwrap_or_else(|_| "NORMAL".to_string()),
            },
            upstream: UpstreamConfig {
                base_url: env::var("UPSTREAM_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost/v1".to_string()),
                api_key: env::var("UPSTREAM_API_KEY").ok(),
                knowledge_bases: parse_knowledge_base_keys(),
                timeout_secs: parse_env_or("UPSTREAM_TIMEOUT", 300),
                connect_timeout_secs: parse_env_or("UPSTREAM_CONNECT_TIMEOUT", 10),
            },
            relay: RelayConfig {
                channel_capacity: parse_env_opt("RELAY_CHANNEL_CAPACITY")
                    .filter(|capacity: &usize| *capacity > 0)
                    .unwrap_or(64),
                send_timeout_ms: parse_env_or("RELAY_SEND_TIMEOUT_MS", 30_000),
            },
            citation_cache: CitationCacheConfig {
                budget_bytes: parse_env_or("CITATION_CACHE_BUDGET_BYTES", DEFAULT_BUDGET_BYTES),
                expiry_days: parse_env_or("CITATION_CACHE_EXPIRY_DAYS", DEFAULT_EXPIRY_DAYS),
                max_slots: parse_env_opt("CITATION_CACHE_MAX_SLOTS")
                    .filter(|slots: &usize| *slots > 0)
                    .unwrap_or(10_000),
                purge_interval_secs: parse_env_or("CITATION_CACHE_PURGE_INTERVAL", 3600),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}

impl UpstreamConfig {
    /// App key for a knowledge base, or the default key when none is named.
    pub fn api_key_for(&self, knowledge_base_id: Option<&str>) -> Option<&str> {
        match knowledge_base_id {
            Some(id) => self.knowledge_bases.get(id).map(String::as_str),
            None => self.api_key.as_deref(),
        }
    }
}
