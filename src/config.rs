//! Process configuration
//!
//! Loaded once at startup from environment variables (and `.env` files) and
//! passed by reference to the reconciler and the verifier.

use eyre::{Result, WrapErr};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_ENV: &str = "testnet";

/// Runtime configuration
#[derive(Clone)]
pub struct Config {
    /// Deployment environment name (`testnet`, `mainnet`, `devnet`, ...)
    pub env: String,
    /// Root of the configuration tree (`<config_dir>/<env>/chains.json` etc.)
    pub config_dir: PathBuf,
    /// Root of the output tree for audit logs
    pub output_dir: PathBuf,
    /// Private key used to sign update and probe transactions
    pub private_key: String,
    /// Optional operating chain override (takes precedence over chains.json)
    pub operating_chains: Option<Vec<u16>>,
    /// Metrics server bind address
    pub metrics_bind: String,
    /// Metrics server port
    pub metrics_port: u16,
    /// Verifier poll attempts per probe
    pub poll_attempts: u32,
    /// Verifier sleep between polls in milliseconds
    pub poll_interval_ms: u64,
    /// Delay between consecutive probes in milliseconds
    pub send_delay_ms: u64,
    /// Gas limit requested for probe delivery on the target chain
    pub delivery_gas_limit: u64,
}

/// Custom Debug that redacts private_key to prevent accidental log leakage.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("env", &self.env)
            .field("config_dir", &self.config_dir)
            .field("output_dir", &self.output_dir)
            .field("private_key", &"<redacted>")
            .field("operating_chains", &self.operating_chains)
            .field("metrics_bind", &self.metrics_bind)
            .field("metrics_port", &self.metrics_port)
            .field("poll_attempts", &self.poll_attempts)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("send_delay_ms", &self.send_delay_ms)
            .field("delivery_gas_limit", &self.delivery_gas_limit)
            .finish()
    }
}

fn default_poll_attempts() -> u32 {
    20
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_send_delay() -> u64 {
    5000
}

fn default_delivery_gas_limit() -> u64 {
    2_000_000
}

fn default_metrics_port() -> u16 {
    9102
}

impl Config {
    /// Load configuration from `.env` files and the environment.
    ///
    /// `.env` is always tried first; for a non-default `ENV` the file
    /// `.env.<ENV>` is loaded on top of it.
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded .env from {:?}", path);
        }

        let env_name = env::var("ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());
        if env_name != DEFAULT_ENV {
            let path = format!(".env.{}", env_name);
            if Path::new(&path).exists() {
                dotenvy::from_filename(&path)
                    .wrap_err_with(|| format!("Failed to load {}", path))?;
                tracing::debug!("Loaded {}", path);
            }
        }

        Self::load_from_env()
    }

    /// Load configuration from environment variables only
    pub fn load_from_env() -> Result<Self> {
        let config = Config {
            env: env::var("ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string()),
            config_dir: env::var("CONFIG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./config")),
            output_dir: env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./output")),
            private_key: env::var("WALLET_KEY").map_err(|_| ConfigError::MissingEnv("WALLET_KEY"))?,
            operating_chains: env::var("OPERATING_CHAINS")
                .ok()
                .map(|raw| parse_chain_list(&raw))
                .transpose()?,
            metrics_bind: env::var("METRICS_BIND").unwrap_or_else(|_| "0.0.0.0".to_string()),
            metrics_port: parse_or("METRICS_PORT", default_metrics_port())?,
            poll_attempts: parse_or("POLL_ATTEMPTS", default_poll_attempts())?,
            poll_interval_ms: parse_or("POLL_INTERVAL_MS", default_poll_interval())?,
            send_delay_ms: parse_or("SEND_DELAY_MS", default_send_delay())?,
            delivery_gas_limit: parse_or("DELIVERY_GAS_LIMIT", default_delivery_gas_limit())?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Directory holding this environment's JSON configuration
    pub fn env_config_dir(&self) -> PathBuf {
        self.config_dir.join(&self.env)
    }

    /// Directory holding this environment's output files
    pub fn env_output_dir(&self) -> PathBuf {
        self.output_dir.join(&self.env)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }

    fn validate(&self) -> Result<()> {
        let key = self.private_key.trim_start_matches("0x");
        if key.len() != 64 || hex::decode(key).is_err() {
            return Err(ConfigError::InvalidEnv {
                name: "WALLET_KEY",
                reason: "expected 32-byte hex private key".to_string(),
            }
            .into());
        }

        if self.poll_attempts == 0 {
            return Err(ConfigError::InvalidEnv {
                name: "POLL_ATTEMPTS",
                reason: "must be at least 1".to_string(),
            }
            .into());
        }

        if self.env.is_empty() {
            return Err(ConfigError::InvalidEnv {
                name: "ENV",
                reason: "cannot be empty".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Parse a comma-separated list of chain ids
pub fn parse_chain_list(raw: &str) -> Result<Vec<u16>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u16>().map_err(|e| {
                eyre::Report::from(ConfigError::InvalidEnv {
                    name: "OPERATING_CHAINS",
                    reason: format!("{:?} is not a chain id: {}", s, e),
                })
            })
        })
        .collect()
}

fn parse_or<T>(name: &'static str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| {
            eyre::Report::from(ConfigError::InvalidEnv {
                name,
                reason: e.to_string(),
            })
        }),
        Err(_) => Ok(default),
    }
}
