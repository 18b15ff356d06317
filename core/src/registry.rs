//! Provider registry: catalog providers by (chain, name), validate
//! configuration against it (spec §4.1).

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ManagerConfig;
use crate::error::ManagerError;
use crate::provider::{ProviderAdapter, ProviderMetadata};

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// A provider configuration combining registered defaults with the
/// required API-key environment variable (spec §4.1
/// `createDefaultConfig`).
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultProviderConfig {
    pub name: String,
    pub chain: String,
    pub rate_limit: crate::provider::RateLimitPolicy,
    pub timeout_ms: u64,
    pub retries: u32,
    pub api_key_env_var: Option<String>,
    pub api_key_present: bool,
}

/// Catalog of providers by `(chain, name)`. Providers are registered once
/// at process start and never removed (spec §4.1, §9 — no module-level
/// mutable globals; this is an explicit instance passed by reference).
#[derive(Default)]
pub struct ProviderRegistry {
    entries: HashMap<(String, String), (u64, Arc<dyn ProviderAdapter>)>,
    next_index: u64,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent by `(chain, name)`: a later registration for the same
    /// key overwrites the adapter but keeps the original registration
    /// index, so re-registering a provider does not move it in
    /// `get_available`'s ordering.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        let meta = adapter.metadata();
        let key = (meta.chain.clone(), meta.name.clone());
        let index = self.entries.get(&key).map(|(idx, _)| *idx).unwrap_or_else(|| {
            let idx = self.next_index;
            self.next_index += 1;
            idx
        });
        self.entries.insert(key, (index, adapter));
    }

    pub fn get(&self, chain: &str, name: &str) -> Result<Arc<dyn ProviderAdapter>, ManagerError> {
        self.entries
            .get(&(chain.to_string(), name.to_string()))
            .map(|(_, adapter)| adapter.clone())
            .ok_or_else(|| ManagerError::UnknownProvider {
                chain: chain.to_string(),
                provider: name.to_string(),
            })
    }

    pub fn get_metadata(&self, chain: &str, name: &str) -> Result<ProviderMetadata, ManagerError> {
        self.get(chain, name).map(|p| p.metadata().clone())
    }

    /// Providers registered for `chain`, in registration order (insertion
    /// order of a `HashMap` is not preserved, so each entry carries its
    /// own first-registered index and we sort by that).
    pub fn get_available(&self, chain: &str) -> Vec<Arc<dyn ProviderAdapter>> {
        let mut matches: Vec<(u64, &Arc<dyn ProviderAdapter>)> = self
            .entries
            .iter()
            .filter(|((c, _), _)| c == chain)
            .map(|(_, (idx, p))| (*idx, p))
            .collect();
        matches.sort_by_key(|(idx, _)| *idx);
        matches.into_iter().map(|(_, p)| p.clone()).collect()
    }

    /// Validate a configuration's provider names against this registry
    /// (spec §4.1, §6, scenario D).
    pub fn validate_config(&self, cfg: &ManagerConfig) -> ValidationReport {
        let mut errors = Vec::new();
        for (chain, chain_cfg) in &cfg.chains {
            let registered: Vec<String> = self
                .get_available(chain)
                .iter()
                .map(|p| p.metadata().name.clone())
                .collect();

            for name in &chain_cfg.default_enabled {
                if !registered.contains(name) {
                    errors.push(format!(
                        "Preferred provider '{name}' not found for {chain}"
                    ));
                }
            }
            for name in chain_cfg.overrides.keys() {
                if !registered.contains(name) {
                    errors.push(format!(
                        "Configured override for unknown provider '{name}' on chain {chain}"
                    ));
                }
            }
        }
        ValidationReport {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Combine a provider's registered defaults with the environment to
    /// produce a ready-to-use configuration (spec §4.1).
    pub fn create_default_config(
        &self,
        chain: &str,
        name: &str,
    ) -> Result<DefaultProviderConfig, ManagerError> {
        let meta = self.get_metadata(chain, name)?;
        Ok(DefaultProviderConfig {
            name: meta.name.clone(),
            chain: meta.chain.clone(),
            rate_limit: meta.rate_limit,
            timeout_ms: 10_000,
            retries: 3,
            api_key_env_var: meta.api_key_env_var.clone(),
            api_key_present: meta.has_api_key(),
        })
    }
}
