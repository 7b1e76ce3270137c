/*
 * Configuration management for the swapline service
 */

use crate::calls::Deployment;
use crate::models::{Bps, Result, SwaplineError, BPS_DENOMINATOR};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub chain: ChainConfig,
    pub trading: TradingConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub deployment: Deployment,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TradingConfig {
    pub default_slippage_bps: Bps,
    pub deadline_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    pub ttl_ms: u64,
    pub capacity: usize,
}

impl CacheConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_source(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests never touch the process env.
    pub fn from_source<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).ok_or_else(|| SwaplineError::ConfigError(format!("{key} not set")));
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let default_slippage_bps: Bps = parse(&or_default("DEFAULT_SLIPPAGE_BPS", "50"), "DEFAULT_SLIPPAGE_BPS")?;
        if default_slippage_bps > BPS_DENOMINATOR {
            return Err(SwaplineError::ConfigError(format!(
                "DEFAULT_SLIPPAGE_BPS must be at most {BPS_DENOMINATOR}, got {default_slippage_bps}"
            )));
        }

        Ok(Config {
            server: ServerConfig {
                host: or_default("SERVER_HOST", "0.0.0.0"),
                port: parse(&or_default("SERVER_PORT", "8080"), "SERVER_PORT")?,
                log_level: or_default("LOG_LEVEL", "info"),
            },
            chain: ChainConfig {
                rpc_url: required("RPC_URL")?,
                chain_id: parse(&or_default("CHAIN_ID", "1"), "CHAIN_ID")?,
                deployment: Deployment {
                    amm: address(&required("AMM_ADDRESS")?, "AMM_ADDRESS")?,
                    tax_router: address(&required("TAX_ROUTER_ADDRESS")?, "TAX_ROUTER_ADDRESS")?,
                    curve: address(&required("CURVE_ADDRESS")?, "CURVE_ADDRESS")?,
                },
            },
            trading: TradingConfig {
                default_slippage_bps,
                deadline_secs: parse(&or_default("DEADLINE_SECS", "600"), "DEADLINE_SECS")?,
            },
            cache: CacheConfig {
                ttl_ms: parse(&or_default("CURVE_CACHE_TTL_MS", "2000"), "CURVE_CACHE_TTL_MS")?,
                capacity: parse(&or_default("CURVE_CACHE_CAPACITY", "256"), "CURVE_CACHE_CAPACITY")?,
            },
        })
    }
}

fn parse<T>(value: &str, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| SwaplineError::ConfigError(format!("Invalid {key}: {e}")))
}

fn address(value: &str, key: &str) -> Result<Address> {
    Address::from_str(value.trim()).map_err(|e| SwaplineError::ConfigError(format!("Invalid {key}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    fn minimal() -> HashMap<String, String> {
        source(&[
            ("RPC_URL", "http://localhost:8545"),
            ("AMM_ADDRESS", "0x00000000000000000000000000000000000000a1"),
            ("TAX_ROUTER_ADDRESS", "0x00000000000000000000000000000000000000a2"),
            ("CURVE_ADDRESS", "0x00000000000000000000000000000000000000a3"),
        ])
    }

    #[test]
    fn defaults_fill_optional_keys() {
        let env = minimal();
        let config = Config::from_source(|k| env.get(k).cloned()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.chain.chain_id, 1);
        assert_eq!(config.trading.default_slippage_bps, 50);
        assert_eq!(config.cache.ttl(), Duration::from_millis(2000));
        assert_eq!(config.chain.deployment.amm, Address::from_low_u64_be(0xa1));
    }

    #[test]
    fn missing_required_key_is_a_config_error() {
        let mut env = minimal();
        env.remove("CURVE_ADDRESS");
        let err = Config::from_source(|k| env.get(k).cloned()).unwrap_err();
        assert!(matches!(err, SwaplineError::ConfigError(msg) if msg.contains("CURVE_ADDRESS")));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let mut env = minimal();
        env.insert("SERVER_PORT".into(), "eighty".into());
        assert!(Config::from_source(|k| env.get(k).cloned()).is_err());

        let mut env = minimal();
        env.insert("DEFAULT_SLIPPAGE_BPS".into(), "10001".into());
        assert!(Config::from_source(|k| env.get(k).cloned()).is_err());

        let mut env = minimal();
        env.insert("AMM_ADDRESS".into(), "0x1234".into());
        assert!(Config::from_source(|k| env.get(k).cloned()).is_err());
    }
}
