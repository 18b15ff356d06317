//! In-memory mock provider adapter, for this crate's own integration
//! tests and for downstream crates writing their own harnesses against
//! [`crate::manager::BlockchainProviderManager`] without real network
//! calls.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::cursor::{Cursor, CursorState, ResolvedCursor};
use crate::error::ManagerError;
use crate::idgen::deterministic_event_id;
use crate::model::{AddressBalance, AddressInfo, BatchItem, NormalizedItem, StreamingPage};
use crate::operation::Operation;
use crate::provider::{OneShotResponse, ProviderAdapter, ProviderMetadata};

/// A scripted page of items, keyed by the page token that should be
/// requested to retrieve it. `""` denotes the first page.
#[derive(Debug, Clone)]
pub struct ScriptedPage {
    pub items: Vec<(String, u64)>,
    pub next_page_token: Option<String>,
    pub is_complete: bool,
}

/// Deterministic fake adapter driven by a pre-scripted page sequence.
/// Supports injecting a failure on a given attempt count, for exercising
/// the execution core's failover path without real I/O.
pub struct MockProviderAdapter {
    metadata: ProviderMetadata,
    pages: Vec<ScriptedPage>,
    fail_calls: Mutex<Vec<usize>>,
    call_count: Mutex<usize>,
}

impl MockProviderAdapter {
    pub fn new(metadata: ProviderMetadata, pages: Vec<ScriptedPage>) -> Self {
        Self {
            metadata,
            pages,
            fail_calls: Mutex::new(Vec::new()),
            call_count: Mutex::new(0),
        }
    }

    /// Make the Nth (1-indexed) `stream_page` call fail with a retriable
    /// service error, to exercise failover.
    pub fn fail_on_call(self, n: usize) -> Self {
        self.fail_calls.lock().unwrap().push(n);
        self
    }
}

#[async_trait]
impl ProviderAdapter for MockProviderAdapter {
    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    fn extract_cursors(&self, item: &NormalizedItem) -> Vec<Cursor> {
        let mut cursors = vec![Cursor::PageToken {
            value: item.id.clone(),
            provider_name: self.metadata.name.clone(),
        }];
        if let Some(seq) = item.payload.get("seq").and_then(|v| v.as_u64()) {
            cursors.push(Cursor::BlockNumber { value: seq });
        }
        cursors
    }

    async fn execute_one_shot(&self, operation: &Operation) -> Result<OneShotResponse, ManagerError> {
        match operation {
            Operation::GetAddressBalances { .. } => Ok(OneShotResponse::Balance(AddressBalance {
                decimal_amount: "1.5".to_string(),
                symbol: "BTC".to_string(),
                decimals: 8,
            })),
            Operation::HasAddressTransactions { .. } => {
                Ok(OneShotResponse::HasTransactions(!self.pages.is_empty()))
            }
            Operation::GetAddressInfo { .. } => Ok(OneShotResponse::Info(AddressInfo { is_contract: false })),
            Operation::GetAddressTransactions { .. } => Err(ManagerError::Validation {
                provider: self.metadata.name.clone(),
                path: "one-shot".to_string(),
                reason: "not a one-shot operation".to_string(),
            }),
        }
    }

    async fn stream_page(
        &self,
        _operation: &Operation,
        resume_hint: ResolvedCursor,
    ) -> Result<StreamingPage, ManagerError> {
        let mut count = self.call_count.lock().unwrap();
        *count += 1;
        if self.fail_calls.lock().unwrap().contains(&*count) {
            return Err(ManagerError::Service {
                provider: self.metadata.name.clone(),
                reason: "scripted failure".to_string(),
            });
        }

        let index = match &resume_hint {
            ResolvedCursor::Beginning => 0,
            ResolvedCursor::PageToken(token) => self
                .pages
                .iter()
                .position(|p| p.next_page_token.as_deref() == Some(token.as_str()))
                .map(|i| i + 1)
                .unwrap_or(0),
            // Block/timestamp cursors only ever address the first scripted
            // page in this harness; exact replay-window arithmetic is
            // exercised directly against `resolve_cursor` instead.
            ResolvedCursor::FromBlock(_) => 0,
            ResolvedCursor::FromTimestamp(_) => 0,
        };

        let Some(page) = self.pages.get(index) else {
            return Ok(StreamingPage {
                items: Vec::new(),
                next_page_token: None,
                is_complete: true,
            });
        };

        let items = page
            .items
            .iter()
            .map(|(id, seq)| {
                let event_id = deterministic_event_id(&self.metadata.name, &[id, &seq.to_string()]);
                BatchItem {
                    raw: serde_json::json!({ "id": id, "seq": seq }),
                    normalized: NormalizedItem {
                        id: id.clone(),
                        event_id,
                        payload: serde_json::json!({ "id": id, "seq": seq }),
                    },
                }
            })
            .collect();

        Ok(StreamingPage {
            items,
            next_page_token: page.next_page_token.clone(),
            is_complete: page.is_complete,
        })
    }
}

/// Convenience constructor mirroring what a real adapter module would
/// expose, used by unit and integration tests.
pub fn cursor_from(page_token: impl Into<String>, provider_name: impl Into<String>) -> CursorState {
    CursorState::new(Cursor::PageToken {
        value: page_token.into(),
        provider_name: provider_name.into(),
    })
}
