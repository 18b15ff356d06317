//! Typed observability events emitted on every state transition
//! (spec §4.7.3, §6). Emission must never fail the call, so `EventSink`
//! is synchronous and infallible by contract.

use crate::cursor::CursorState;

/// Reserved events may be defined but unemitted; handlers should remain
/// exhaustive over this enum regardless.
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    ProviderSelection {
        chain: String,
        operation: &'static str,
        provider_name: String,
    },
    ProviderResume {
        chain: String,
        provider_name: String,
        cursor: CursorState,
    },
    ProviderFailover {
        chain: String,
        from_provider: String,
        to_provider: String,
        reason: String,
    },
    ProviderCursorAdjusted {
        chain: String,
        provider_name: String,
        before: CursorState,
        after: CursorState,
    },
    ProviderCallSuccess {
        chain: String,
        provider_name: String,
        operation: &'static str,
        latency_ms: f64,
    },
    ProviderCallFailure {
        chain: String,
        provider_name: String,
        operation: &'static str,
        reason: String,
    },
    ProviderStreamBatch {
        chain: String,
        provider_name: String,
        item_count: usize,
    },
    ProviderStreamComplete {
        chain: String,
        provider_name: String,
    },
    /// Reserved: not emitted by the execution core today, kept so
    /// handlers that match exhaustively don't need a wildcard arm when a
    /// future revision starts emitting it (e.g. a consumer-initiated
    /// cancellation).
    ProviderStreamCancelled {
        chain: String,
        provider_name: String,
    },
}

/// Fire-and-forget event sink. Implementations must not panic and must
/// not block on I/O; emission is on the hot path of every state
/// transition.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ManagerEvent);
}

/// Discards every event. Useful for tests and for importers that rely
/// only on the streaming batches' own cursor/error data.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: ManagerEvent) {}
}

/// Routes every event through `tracing`, mirroring the teacher's use of
/// `tracing::{info,warn,debug}!` at each provider state transition
/// (`rpc_provider.rs`).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: ManagerEvent) {
        match event {
            ManagerEvent::ProviderSelection { chain, operation, provider_name } => {
                tracing::info!(chain, operation, provider = %provider_name, "provider.selection");
            }
            ManagerEvent::ProviderResume { chain, provider_name, .. } => {
                tracing::info!(chain, provider = %provider_name, "provider.resume");
            }
            ManagerEvent::ProviderFailover { chain, from_provider, to_provider, reason } => {
                tracing::warn!(
                    chain,
                    from = %from_provider,
                    to = %to_provider,
                    reason = %reason,
                    "provider.failover"
                );
            }
            ManagerEvent::ProviderCursorAdjusted { chain, provider_name, .. } => {
                tracing::debug!(chain, provider = %provider_name, "provider.cursor.adjusted");
            }
            ManagerEvent::ProviderCallSuccess { chain, provider_name, operation, latency_ms } => {
                tracing::debug!(
                    chain,
                    provider = %provider_name,
                    operation,
                    latency_ms,
                    "provider.call.success"
                );
            }
            ManagerEvent::ProviderCallFailure { chain, provider_name, operation, reason } => {
                tracing::warn!(
                    chain,
                    provider = %provider_name,
                    operation,
                    reason = %reason,
                    "provider.call.failure"
                );
            }
            ManagerEvent::ProviderStreamBatch { chain, provider_name, item_count } => {
                tracing::debug!(
                    chain,
                    provider = %provider_name,
                    item_count,
                    "provider.stream.batch"
                );
            }
            ManagerEvent::ProviderStreamComplete { chain, provider_name } => {
                tracing::info!(chain, provider = %provider_name, "provider.stream.complete");
            }
            ManagerEvent::ProviderStreamCancelled { chain, provider_name } => {
                tracing::info!(chain, provider = %provider_name, "provider.stream.cancelled");
            }
        }
    }
}
