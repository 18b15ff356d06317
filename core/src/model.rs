//! Data types shared across the manager: normalized items, streaming
//! batches, and the one-shot response payloads (spec §3).

use serde::{Deserialize, Serialize};

use crate::cursor::CursorState;

/// A stream sub-category a provider can serve for `getAddressTransactions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    Normal,
    Token,
    Internal,
    Staking,
}

impl Default for StreamType {
    fn default() -> Self {
        StreamType::Normal
    }
}

/// A single normalized item produced by a provider-specific mapper.
///
/// `id` is the raw chain identifier (e.g. a transaction hash); `event_id`
/// is computed by the provider's mapper and must be deterministic under
/// replay and unique per on-chain event (not just per transaction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub id: String,
    pub event_id: String,
    /// Provider-specific normalized payload, opaque to the core.
    pub payload: serde_json::Value,
}

/// Output of one page from a streaming operation (spec §3 `StreamingBatch`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingBatch {
    pub items: Vec<BatchItem>,
    pub provider_name: String,
    pub cursor: CursorState,
    pub is_complete: bool,
    pub has_more: Option<bool>,
}

/// One item in a `StreamingBatch`: the raw provider payload alongside its
/// normalized form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub raw: serde_json::Value,
    pub normalized: NormalizedItem,
}

/// Native-asset balance response for `getAddressBalances`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressBalance {
    pub decimal_amount: String,
    pub symbol: String,
    pub decimals: u32,
}

/// Response for `getAddressInfo`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AddressInfo {
    pub is_contract: bool,
}

/// Wraps any one-shot payload with the name of the provider that served it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answered<T> {
    pub value: T,
    pub provider_name: String,
}

/// One page returned by a provider's `stream_page` adapter call
/// (spec §6 `StreamingPage`).
#[derive(Debug, Clone)]
pub struct StreamingPage {
    pub items: Vec<BatchItem>,
    pub next_page_token: Option<String>,
    pub is_complete: bool,
}
