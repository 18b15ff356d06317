//! The operation algebra importers use to address the manager (spec §3).

use serde::{Deserialize, Serialize};

use crate::model::StreamType;

/// A typed request an importer makes against the manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Operation {
    /// Streaming: yields `StreamingBatch`es.
    GetAddressTransactions {
        address: String,
        #[serde(default)]
        stream_type: StreamType,
    },
    /// One-shot: native-asset balance with decimals.
    GetAddressBalances { address: String },
    /// One-shot boolean probe used for xpub gap scanning.
    HasAddressTransactions { address: String },
    /// One-shot: `{ is_contract: bool }`.
    GetAddressInfo { address: String },
}

impl Operation {
    pub fn address(&self) -> &str {
        match self {
            Operation::GetAddressTransactions { address, .. } => address,
            Operation::GetAddressBalances { address } => address,
            Operation::HasAddressTransactions { address } => address,
            Operation::GetAddressInfo { address } => address,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Operation::GetAddressTransactions { .. })
    }

    pub fn stream_type(&self) -> StreamType {
        match self {
            Operation::GetAddressTransactions { stream_type, .. } => *stream_type,
            _ => StreamType::Normal,
        }
    }

    /// The capability this operation requires from a provider (spec §4.4
    /// selector rule 1).
    pub fn capability(&self) -> Capability {
        match self {
            Operation::GetAddressTransactions { .. } => Capability::StreamAddressTransactions,
            Operation::GetAddressBalances { .. } => Capability::GetAddressBalance,
            Operation::HasAddressTransactions { .. } => Capability::HasAnyTransaction,
            Operation::GetAddressInfo { .. } => Capability::GetAddressInfo,
        }
    }
}

/// The set of operations a provider can serve (spec §3 capability set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    StreamAddressTransactions,
    GetAddressBalance,
    HasAnyTransaction,
    GetAddressInfo,
}
