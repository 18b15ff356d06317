//! Error taxonomy for the manager (spec §7). Every fallible boundary
//! returns one of these variants; no stringly typed errors.

use thiserror::Error;

/// Why a single candidate provider was rejected during selection, carried
/// by `NoProvidersAvailable` so importers/operators can see the full
/// picture instead of a bare "no providers" message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedCandidate {
    pub provider_name: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no providers available for chain {chain}: {}", rejected_summary(.rejected))]
    NoProvidersAvailable {
        chain: String,
        rejected: Vec<RejectedCandidate>,
    },

    #[error("rate limited by provider {provider}{}", retry_after_suffix(.retry_after_secs))]
    RateLimit {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    #[error("service error from provider {provider}: {reason}")]
    Service { provider: String, reason: String },

    #[error("timeout calling provider {provider} after {elapsed_ms}ms")]
    Timeout { provider: String, elapsed_ms: u64 },

    #[error("http error from provider {provider}: {status} {body_excerpt}")]
    Http {
        provider: String,
        status: u16,
        body_excerpt: String,
    },

    #[error("authentication error from provider {provider}: {reason}")]
    Auth { provider: String, reason: String },

    #[error("validation error from provider {provider} at {path}: {reason}")]
    Validation {
        provider: String,
        path: String,
        reason: String,
    },

    #[error("unknown provider {provider} for chain {chain}")]
    UnknownProvider { chain: String, provider: String },

    #[error("all {} candidate providers failed for chain {chain} ({}); last error: {last}", .attempted.len(), .attempted.join(", "))]
    AllCandidatesFailed {
        chain: String,
        attempted: Vec<String>,
        #[source]
        last: Box<ManagerError>,
    },
}

fn rejected_summary(rejected: &[RejectedCandidate]) -> String {
    if rejected.is_empty() {
        return "no candidates registered".to_string();
    }
    rejected
        .iter()
        .map(|r| format!("{} ({})", r.provider_name, r.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

fn retry_after_suffix(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(", retry after {secs}s"),
        None => String::new(),
    }
}

impl ManagerError {
    /// Whether the execution core should try the next candidate on this
    /// error (spec §4.7.1 step 2, §4.7.2 step 9). `Http` (non-429) and
    /// `Auth` are not retriable across providers; `Configuration`,
    /// `UnknownProvider`, `NoProvidersAvailable`, and `AllCandidatesFailed`
    /// are terminal.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ManagerError::RateLimit { .. } | ManagerError::Service { .. } | ManagerError::Timeout { .. } | ManagerError::Validation { .. }
        )
    }

    pub fn provider_name(&self) -> Option<&str> {
        match self {
            ManagerError::RateLimit { provider, .. }
            | ManagerError::Service { provider, .. }
            | ManagerError::Timeout { provider, .. }
            | ManagerError::Http { provider, .. }
            | ManagerError::Auth { provider, .. }
            | ManagerError::Validation { provider, .. } => Some(provider),
            _ => None,
        }
    }
}

/// Raised by upstream importers (not by this crate) when a streaming call
/// ends in `Err` after some batches already succeeded. The core's
/// contribution is `last_cursor`, present on every batch it emits, so
/// importers have enough to build this without replaying from scratch
/// (spec §7).
#[derive(Debug, Error)]
#[error("partial import: {successful_items} items committed before failure: {cause}")]
pub struct PartialImportError {
    pub successful_items: usize,
    pub last_cursor: crate::cursor::CursorState,
    #[source]
    pub cause: ManagerError,
}
