//! Cursor types and the (pure) cursor resolver (spec §3 `CursorState`,
//! §4.5 Cursor Resolver).

use serde::{Deserialize, Serialize};

use crate::provider::ProviderMetadata;

/// A typed position within a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Cursor {
    PageToken { value: String, provider_name: String },
    BlockNumber { value: u64 },
    Timestamp { value: i64 },
}

/// The kind of a `Cursor`, independent of its value — used to match
/// against a provider's supported cursor types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorKind {
    PageToken,
    BlockNumber,
    Timestamp,
}

impl Cursor {
    pub fn kind(&self) -> CursorKind {
        match self {
            Cursor::PageToken { .. } => CursorKind::PageToken,
            Cursor::BlockNumber { .. } => CursorKind::BlockNumber,
            Cursor::Timestamp { .. } => CursorKind::Timestamp,
        }
    }
}

/// Optional metadata carried alongside a cursor (spec §3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CursorMetadata {
    pub provider_name: Option<String>,
    pub updated_at: Option<i64>,
    pub window_start_time: Option<i64>,
    pub window_end_time: Option<i64>,
    pub last_transaction_id: Option<String>,
    /// Event IDs to pre-seed the dedup window with on resume (spec §4.7.2
    /// step: "seeded by `resumeCursor.metadata.recentIds`").
    #[serde(default)]
    pub recent_ids: Vec<String>,
}

/// Durable resumption token (spec §3 `CursorState`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorState {
    pub primary: Cursor,
    #[serde(default)]
    pub alternatives: Vec<Cursor>,
    #[serde(default)]
    pub metadata: CursorMetadata,
}

impl CursorState {
    pub fn new(primary: Cursor) -> Self {
        Self {
            primary,
            alternatives: Vec::new(),
            metadata: CursorMetadata::default(),
        }
    }

    /// All cursors this state can resolve to, primary first.
    fn candidates(&self) -> impl Iterator<Item = &Cursor> {
        std::iter::once(&self.primary).chain(self.alternatives.iter())
    }
}

/// A resolved starting point for a provider's `stream_page` call.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedCursor {
    PageToken(String),
    FromBlock(u64),
    FromTimestamp(i64),
    /// No compatible cursor was found; start from the beginning.
    Beginning,
}

/// Resolve a `CursorState` against a target provider (spec §4.5).
///
/// `crossing_provider` is true when this is a cross-provider failover or a
/// fresh resume after a persisted session — in that case the replay window
/// is applied. Same-provider resume (same call, same provider as last
/// time) passes `crossing_provider = false` and gets the exact cursor with
/// no shift. Pure: does not mutate `cursor`.
pub fn resolve_cursor(
    cursor: Option<&CursorState>,
    target: &ProviderMetadata,
    crossing_provider: bool,
) -> (ResolvedCursor, bool) {
    let Some(cursor) = cursor else {
        return (ResolvedCursor::Beginning, false);
    };

    // Rule 1: primary is a page token minted by this exact provider.
    if let Cursor::PageToken { value, provider_name } = &cursor.primary {
        if provider_name == &target.name {
            return (ResolvedCursor::PageToken(value.clone()), false);
        }
    }

    // Rule 2: prefer primary if compatible, else search alternatives in order.
    let chosen = cursor
        .candidates()
        .find(|c| target.supported_cursor_types.contains(&c.kind()));

    let Some(chosen) = chosen else {
        return (ResolvedCursor::Beginning, true);
    };

    let resolved = match chosen {
        Cursor::PageToken { value, .. } => ResolvedCursor::PageToken(value.clone()),
        Cursor::BlockNumber { value } => {
            let shifted = if crossing_provider {
                value.saturating_sub(target.replay_window.blocks)
            } else {
                *value
            };
            ResolvedCursor::FromBlock(shifted)
        }
        Cursor::Timestamp { value } => {
            let shifted = if crossing_provider {
                (*value - target.replay_window.seconds as i64).max(0)
            } else {
                *value
            };
            ResolvedCursor::FromTimestamp(shifted)
        }
    };

    (resolved, false)
}
