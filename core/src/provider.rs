//! The provider adapter interface (spec §6, inbound) and the immutable
//! metadata handle each provider registers with (spec §3 `Provider`).

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cursor::{Cursor, CursorKind, CursorState, ResolvedCursor};
use crate::error::ManagerError;
use crate::model::{AddressBalance, AddressInfo, Answered, NormalizedItem, StreamingPage};
use crate::operation::{Capability, Operation, StreamType};

/// Backward shift applied to a numeric cursor on cross-provider failover
/// (spec §3 `replayWindow`, glossary "Replay window").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayWindow {
    pub blocks: u64,
    pub seconds: u64,
}

/// Requests/second/minute/hour and burst capacity for one provider
/// (spec §3 `rate-limit policy`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub requests_per_second: f64,
    pub requests_per_minute: Option<u32>,
    pub requests_per_hour: Option<u32>,
    pub burst: u32,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            requests_per_second: 1.0,
            requests_per_minute: None,
            requests_per_hour: None,
            burst: 1,
        }
    }
}

/// Immutable handle describing one provider (spec §3 `Provider`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub name: String,
    pub chain: String,
    pub capabilities: HashSet<Capability>,
    pub stream_types: HashSet<StreamType>,
    pub supported_cursor_types: HashSet<CursorKind>,
    pub preferred_cursor_type: CursorKind,
    pub replay_window: ReplayWindow,
    pub rate_limit: RateLimitPolicy,
    pub requires_api_key: bool,
    pub api_key_env_var: Option<String>,
}

impl ProviderMetadata {
    /// Builder-style helper used heavily by tests and by importers wiring
    /// up static provider catalogs.
    pub fn with_capability(mut self, cap: Capability) -> Self {
        self.capabilities.insert(cap);
        self
    }

    pub fn with_stream_type(mut self, st: StreamType) -> Self {
        self.stream_types.insert(st);
        self
    }

    pub fn supports(&self, op: &Operation) -> bool {
        if !self.capabilities.contains(&op.capability()) {
            return false;
        }
        if op.is_streaming() {
            return self.stream_types.contains(&op.stream_type());
        }
        true
    }

    /// Whether this provider's required API key is present in the
    /// environment (spec §4.1, §6). The literal `"YourApiKeyToken"` is
    /// treated as unset, mirroring a placeholder left in an unconfigured
    /// `.env` file.
    pub fn has_api_key(&self) -> bool {
        if !self.requires_api_key {
            return true;
        }
        let Some(var) = &self.api_key_env_var else {
            return false;
        };
        match std::env::var(var) {
            Ok(value) => !value.is_empty() && value != "YourApiKeyToken",
            Err(_) => false,
        }
    }
}

/// A provider implementation exposes this interface once per data source
/// (spec §6). Object-safe via `async-trait` so the registry can hold
/// `Arc<dyn ProviderAdapter>`.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn metadata(&self) -> &ProviderMetadata;

    /// Chain-aware shift for cross-provider failover. Most adapters should
    /// just call [`crate::cursor::resolve_cursor`] with `crossing_provider
    /// = true`; this hook exists so chain-specific quirks (e.g. a chain
    /// whose replay window is denominated in epochs, not blocks) can
    /// override the generic behavior without the execution core branching
    /// on chain identity (spec §9 — chain-specific branching belongs in
    /// the adapter, never in the core).
    fn apply_replay_window(&self, resolved: ResolvedCursor) -> ResolvedCursor {
        resolved
    }

    /// Ordered list of cursor types minted from the newest emitted item.
    fn extract_cursors(&self, item: &NormalizedItem) -> Vec<Cursor>;

    /// One-shot operations: `getAddressBalances`, `hasAddressTransactions`,
    /// `getAddressInfo`.
    async fn execute_one_shot(&self, operation: &Operation) -> Result<OneShotResponse, ManagerError>;

    /// Fetch a single page for a streaming operation, starting from
    /// `resume_hint` (the resolved cursor for this provider).
    async fn stream_page(
        &self,
        operation: &Operation,
        resume_hint: ResolvedCursor,
    ) -> Result<StreamingPage, ManagerError>;
}

/// The payload returned by a one-shot provider call, before the execution
/// core tags it with the serving provider's name.
#[derive(Debug, Clone)]
pub enum OneShotResponse {
    Balance(AddressBalance),
    HasTransactions(bool),
    Info(AddressInfo),
}

impl OneShotResponse {
    pub fn answered(self, provider_name: impl Into<String>) -> Answered<OneShotResponse> {
        Answered {
            value: self,
            provider_name: provider_name.into(),
        }
    }
}

/// Helper re-exported for adapters that need the durable session-spanning
/// cursor shape (kept here so `provider` consumers don't need to import
/// `crate::cursor` directly for the common case).
pub type Resumption = CursorState;
