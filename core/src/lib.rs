//! Resilient, streaming, multi-provider blockchain data client runtime.
//!
//! [`manager::BlockchainProviderManager`] is the single entry point:
//! register [`provider::ProviderAdapter`] implementations into a
//! [`registry::ProviderRegistry`], then call `execute` for one-shot
//! lookups or `execute_with_failover` for a resumable, deduplicated
//! stream of [`model::StreamingBatch`]es.

pub mod config;
pub mod cursor;
pub mod dedup;
pub mod error;
pub mod events;
pub mod health;
pub mod http_client;
pub mod idgen;
pub mod manager;
pub mod model;
pub mod operation;
pub mod provider;
pub mod redact;
pub mod registry;
pub mod selector;
pub mod telemetry;

#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

pub use config::{ChainConfig, ManagerConfig, ProviderOverride};
pub use cursor::{Cursor, CursorKind, CursorState};
pub use error::{ManagerError, PartialImportError};
pub use events::{EventSink, ManagerEvent, NoopEventSink, TracingEventSink};
pub use health::{Circuit, ProviderHealth};
pub use manager::BlockchainProviderManager;
pub use model::{AddressBalance, AddressInfo, BatchItem, NormalizedItem, StreamType, StreamingBatch};
pub use operation::{Capability, Operation};
pub use provider::{OneShotResponse, ProviderAdapter, ProviderMetadata, RateLimitPolicy, ReplayWindow};
pub use registry::ProviderRegistry;
