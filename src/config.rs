//! Environment-driven configuration (§6 ambient additions).
//!
//! The engine itself only consumes `passphrase`, `db_path`, and
//! `embedder_cache_dir`. Transport-level keys (`port`, `host`, rate limits)
//! are collected here too so a caller has a single place to configure
//! everything, but the engine never reads them — they are inert passthrough
//! fields for the external transport layer.

use crate::{Error, Result};
use secrecy::SecretString;
use std::path::PathBuf;

/// Environment variable holding the store encryption passphrase. Required.
pub const ENV_PASSPHRASE: &str = "HIPPOCAMPUS_PASSPHRASE";
/// Environment variable overriding the store file path.
pub const ENV_DB_PATH: &str = "HIPPOCAMPUS_DB_PATH";
/// Environment variable overriding the embedder model cache directory.
pub const ENV_EMBEDDER_CACHE_DIR: &str = "HIPPOCAMPUS_EMBEDDER_CACHE_DIR";
/// Environment variable overriding the inert transport listen port.
pub const ENV_PORT: &str = "HIPPOCAMPUS_PORT";
/// Environment variable overriding the inert transport listen host.
pub const ENV_HOST: &str = "HIPPOCAMPUS_HOST";
/// Environment variable overriding the inert write rate limit (requests/min).
pub const ENV_WRITE_RATE_LIMIT: &str = "HIPPOCAMPUS_WRITE_RATE_LIMIT";
/// Environment variable overriding the inert read rate limit (requests/min).
pub const ENV_READ_RATE_LIMIT: &str = "HIPPOCAMPUS_READ_RATE_LIMIT";

const DEFAULT_DB_FILE_NAME: &str = "hippocampus.db";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_WRITE_RATE_LIMIT: u32 = 20;
const DEFAULT_READ_RATE_LIMIT: u32 = 60;

/// Transport-facing settings the engine accepts but never acts on. Carried
/// here purely so the whole process has one configuration surface; the
/// external request transport is what actually reads these.
#[derive(Debug, Clone)]
pub struct TransportPassthrough {
    /// Listen port (external transport concern).
    pub port: u16,
    /// Listen host (external transport concern).
    pub host: String,
    /// Write-operation rate limit, requests per minute (external concern).
    pub write_rate_limit_per_min: u32,
    /// Read-operation rate limit, requests per minute (external concern).
    pub read_rate_limit_per_min: u32,
}

impl Default for TransportPassthrough {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: DEFAULT_HOST.to_string(),
            write_rate_limit_per_min: DEFAULT_WRITE_RATE_LIMIT,
            read_rate_limit_per_min: DEFAULT_READ_RATE_LIMIT,
        }
    }
}

/// Full engine configuration, assembled from the process environment.
#[derive(Clone)]
pub struct EngineConfig {
    /// Passphrase keying the encrypted store. Never logged, never written
    /// to disk anywhere except inside the `SQLCipher` key derivation.
    pub passphrase: SecretString,
    /// Path to the encrypted database file.
    pub db_path: PathBuf,
    /// Directory the embedder caches its model and tokenizer files under.
    pub embedder_cache_dir: PathBuf,
    /// Inert transport-layer settings, passed through for convenience.
    pub transport: TransportPassthrough,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("passphrase", &"<redacted>")
            .field("db_path", &self.db_path)
            .field("embedder_cache_dir", &self.embedder_cache_dir)
            .field("transport", &self.transport)
            .finish()
    }
}

impl EngineConfig {
    /// Builds configuration from the process environment, loading a local
    /// `.env` file first if one is present (development convenience only;
    /// production deployments are expected to set real environment
    /// variables).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fatal`] if [`ENV_PASSPHRASE`] is unset or empty, or
    /// if a numeric override (`port`, the rate limits) fails to parse.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let passphrase = std::env::var(ENV_PASSPHRASE)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                Error::Fatal(format!("{ENV_PASSPHRASE} is required and must be non-empty"))
            })?;

        let db_path = std::env::var(ENV_DB_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_db_path());

        let embedder_cache_dir = std::env::var(ENV_EMBEDDER_CACHE_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_cache_dir());

        let transport = TransportPassthrough {
            port: parse_env_or_default(ENV_PORT, DEFAULT_PORT)?,
            host: std::env::var(ENV_HOST).unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            write_rate_limit_per_min: parse_env_or_default(
                ENV_WRITE_RATE_LIMIT,
                DEFAULT_WRITE_RATE_LIMIT,
            )?,
            read_rate_limit_per_min: parse_env_or_default(
                ENV_READ_RATE_LIMIT,
                DEFAULT_READ_RATE_LIMIT,
            )?,
        };

        Ok(Self {
            passphrase: SecretString::from(passphrase),
            db_path,
            embedder_cache_dir,
            transport,
        })
    }
}

fn parse_env_or_default<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Fatal(format!("{key} is not valid: {e}"))),
        Err(_) => Ok(default),
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data").join(DEFAULT_DB_FILE_NAME)
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("hippocampus")
        .join("models")
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            ENV_PASSPHRASE,
            ENV_DB_PATH,
            ENV_EMBEDDER_CACHE_DIR,
            ENV_PORT,
            ENV_HOST,
            ENV_WRITE_RATE_LIMIT,
            ENV_READ_RATE_LIMIT,
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn from_env_requires_passphrase() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        assert!(EngineConfig::from_env().is_err());
    }

    #[test]
    fn from_env_applies_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe { std::env::set_var(ENV_PASSPHRASE, "correct horse battery staple") };
        let config = EngineConfig::from_env().unwrap();
        assert_eq!(
            config.passphrase.expose_secret(),
            "correct horse battery staple"
        );
        assert_eq!(config.transport.port, DEFAULT_PORT);
        assert_eq!(config.transport.host, DEFAULT_HOST);
        clear_env();
    }

    #[test]
    fn from_env_rejects_empty_passphrase() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe { std::env::set_var(ENV_PASSPHRASE, "") };
        assert!(EngineConfig::from_env().is_err());
        clear_env();
    }

    #[test]
    fn debug_redacts_passphrase() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe { std::env::set_var(ENV_PASSPHRASE, "shh") };
        let config = EngineConfig::from_env().unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("shh"));
        clear_env();
    }
}
