//! Manager configuration: per-chain default provider ordering and
//! per-provider overrides (spec §6 `ManagerConfig`).
//!
//! Layering follows the teacher's `load_config` (`main.rs`): a `.env`
//! file is loaded first via `dotenvy`, then the `config` crate overlays
//! process environment variables on top of built-in defaults. Nested
//! per-chain/per-provider structure doesn't map cleanly onto flat env
//! vars, so [`ManagerConfig::from_env`] only resolves the ambient,
//! chain-independent settings (timeouts, retries, log level); chain and
//! provider structure is built programmatically via
//! [`ManagerConfig::default`] plus [`ChainConfig`] mutation, same as a
//! caller would assemble provider registrations in code.

use std::collections::HashMap;

use config::{Config, ConfigError};
use serde::Deserialize;

use crate::provider::RateLimitPolicy;

/// Process-wide defaults not tied to any one chain or provider.
#[derive(Debug, Clone, Deserialize)]
pub struct AmbientConfig {
    pub rust_log: String,
    pub default_timeout_ms: u64,
    pub default_retries: u32,
}

impl Default for AmbientConfig {
    fn default() -> Self {
        Self {
            rust_log: "info".to_string(),
            default_timeout_ms: 10_000,
            default_retries: 3,
        }
    }
}

/// Per-provider override of its registered defaults (spec §6).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProviderOverride {
    pub enabled: Option<bool>,
    pub priority: Option<i32>,
    pub rate_limit: Option<RateLimitPolicy>,
    pub timeout_ms: Option<u64>,
    pub retries: Option<u32>,
}

/// Per-chain provider selection: the default-enabled set (in preference
/// order) plus any per-provider overrides (spec §6, scenario D).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChainConfig {
    pub default_enabled: Vec<String>,
    pub overrides: HashMap<String, ProviderOverride>,
}

/// Top-level manager configuration: ambient settings plus per-chain
/// provider selection (spec §6).
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub ambient: AmbientConfig,
    pub chains: HashMap<String, ChainConfig>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            ambient: AmbientConfig::default(),
            chains: HashMap::new(),
        }
    }
}

impl ManagerConfig {
    /// Load ambient settings from `.env` plus the process environment,
    /// mirroring the teacher's `load_config` (`main.rs`). Chain/provider
    /// selection is layered on afterward by the caller.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let settings = Config::builder()
            .add_source(config::Environment::default())
            .set_default("rust_log", "info")?
            .set_default("default_timeout_ms", 10_000)?
            .set_default("default_retries", 3)?
            .build()?;

        let ambient: AmbientConfig = settings.try_deserialize()?;
        Ok(Self {
            ambient,
            chains: HashMap::new(),
        })
    }

    pub fn chain(&self, chain: &str) -> Option<&ChainConfig> {
        self.chains.get(chain)
    }

    pub fn provider_override(&self, chain: &str, provider: &str) -> Option<&ProviderOverride> {
        self.chains.get(chain)?.overrides.get(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_chains() {
        let cfg = ManagerConfig::default();
        assert!(cfg.chains.is_empty());
        assert_eq!(cfg.ambient.default_retries, 3);
    }

    #[test]
    fn chain_and_override_lookup() {
        let mut cfg = ManagerConfig::default();
        cfg.chains.insert(
            "bitcoin".to_string(),
            ChainConfig {
                default_enabled: vec!["mempool".to_string()],
                overrides: HashMap::from([(
                    "mempool".to_string(),
                    ProviderOverride {
                        enabled: Some(false),
                        ..ProviderOverride::default()
                    },
                )]),
            },
        );
        assert_eq!(
            cfg.chain("bitcoin").unwrap().default_enabled,
            vec!["mempool".to_string()]
        );
        assert_eq!(
            cfg.provider_override("bitcoin", "mempool").unwrap().enabled,
            Some(false)
        );
        assert!(cfg.provider_override("bitcoin", "quicknode").is_none());
    }
}
