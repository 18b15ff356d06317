//! Execution Core (spec §4.7): one-shot `execute` and streaming
//! `execute_with_failover`, orchestrating the registry, selector, cursor
//! resolver, dedup window, health/circuit state, and event sink.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::cursor::{resolve_cursor, Cursor, CursorState, ResolvedCursor};
use crate::dedup::DedupWindow;
use crate::error::ManagerError;
use crate::events::{EventSink, ManagerEvent, NoopEventSink};
use crate::health::{Circuit, HealthRegistry};
use crate::model::{Answered, BatchItem, StreamingBatch};
use crate::operation::Operation;
use crate::provider::{OneShotResponse, ProviderAdapter};
use crate::registry::ProviderRegistry;
use crate::selector::{select_candidates, Candidate};

const STREAM_CHANNEL_CAPACITY: usize = 8;

fn operation_label(operation: &Operation) -> &'static str {
    match operation {
        Operation::GetAddressTransactions { .. } => "getAddressTransactions",
        Operation::GetAddressBalances { .. } => "getAddressBalances",
        Operation::HasAddressTransactions { .. } => "hasAddressTransactions",
        Operation::GetAddressInfo { .. } => "getAddressInfo",
    }
}

/// Ties together the provider registry, health/circuit state, and event
/// sink behind the two consumer entry points (spec §6 "Consumer
/// interface"). Cheap to clone: everything inside is `Arc`-backed.
#[derive(Clone)]
pub struct BlockchainProviderManager {
    registry: Arc<ProviderRegistry>,
    health: Arc<HealthRegistry>,
    events: Arc<dyn EventSink>,
}

impl BlockchainProviderManager {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            health: Arc::new(HealthRegistry::new()),
            events: Arc::new(NoopEventSink),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// `getHealth(chain)` (spec §6).
    pub fn get_health(&self, chain: &str) -> HashMap<String, crate::health::ProviderHealth> {
        self.health.health_for_chain(chain)
    }

    /// `getCircuitStates(chain)` (spec §6).
    pub fn get_circuit_states(&self, chain: &str) -> HashMap<String, Circuit> {
        self.health.circuits_for_chain(chain)
    }

    fn candidates_for(&self, chain: &str, operation: &Operation) -> (Vec<Candidate>, Vec<(String, crate::selector::Rejection)>) {
        let providers: Vec<_> = self
            .registry
            .get_available(chain)
            .iter()
            .map(|p| p.metadata().clone())
            .collect();

        let mut health_scores = HashMap::new();
        let mut circuits = HashMap::new();
        for meta in &providers {
            health_scores.insert(meta.name.clone(), self.health.snapshot(chain, &meta.name).score);
            circuits.insert(meta.name.clone(), self.health.circuit_state(chain, &meta.name));
        }

        select_candidates(&providers, operation, &health_scores, &circuits)
    }

    fn adapter_for(&self, chain: &str, name: &str) -> Arc<dyn ProviderAdapter> {
        self.registry
            .get(chain, name)
            .expect("selector returned a provider absent from the registry")
    }

    /// Admit an attempt against `(chain, provider)` right before it is
    /// made (spec §4.3 testable property 5): a `Closed` circuit always
    /// admits; a `HalfOpen` circuit admits exactly one in-flight probe
    /// via [`HealthRegistry::try_begin_probe`] and reports the rest as
    /// unavailable; `Open`/`HalfOpenProbing` never admit. Selection
    /// happens against a snapshot taken moments earlier, so the circuit
    /// can have moved since — this is the authoritative, race-free check.
    fn try_admit(&self, chain: &str, provider_name: &str) -> bool {
        match self.health.circuit_state(chain, provider_name) {
            Circuit::Closed => true,
            Circuit::HalfOpen => self.health.try_begin_probe(chain, provider_name),
            Circuit::Open | Circuit::HalfOpenProbing => false,
        }
    }

    /// One-shot `execute` (spec §4.7.1).
    pub async fn execute(&self, chain: &str, operation: Operation) -> Result<Answered<OneShotResponse>, ManagerError> {
        let (candidates, rejected) = self.candidates_for(chain, &operation);
        if candidates.is_empty() {
            return Err(ManagerError::NoProvidersAvailable {
                chain: chain.to_string(),
                rejected: rejected
                    .into_iter()
                    .map(|(provider_name, reason)| crate::error::RejectedCandidate {
                        provider_name,
                        reason: reason.reason().to_string(),
                    })
                    .collect(),
            });
        }

        let mut attempted = Vec::new();
        let mut skipped: Vec<crate::error::RejectedCandidate> = Vec::new();
        let mut last_error: Option<ManagerError> = None;
        let op_label = operation_label(&operation);

        for candidate in candidates.iter() {
            let provider_name = candidate.metadata.name.clone();
            if !self.try_admit(chain, &provider_name) {
                skipped.push(crate::error::RejectedCandidate {
                    provider_name,
                    reason: "circuit open".to_string(),
                });
                continue;
            }

            if attempted.is_empty() {
                self.events.emit(ManagerEvent::ProviderSelection {
                    chain: chain.to_string(),
                    operation: op_label,
                    provider_name: provider_name.clone(),
                });
            } else {
                self.events.emit(ManagerEvent::ProviderFailover {
                    chain: chain.to_string(),
                    from_provider: attempted.last().cloned().unwrap_or_default(),
                    to_provider: provider_name.clone(),
                    reason: last_error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_default(),
                });
            }
            attempted.push(provider_name.clone());

            let adapter = self.adapter_for(chain, &provider_name);
            let started = Instant::now();
            match adapter.execute_one_shot(&operation).await {
                Ok(response) => {
                    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                    self.health.record_success(chain, &provider_name, latency_ms);
                    self.events.emit(ManagerEvent::ProviderCallSuccess {
                        chain: chain.to_string(),
                        provider_name: provider_name.clone(),
                        operation: op_label,
                        latency_ms,
                    });
                    return Ok(response.answered(provider_name));
                }
                Err(err) => {
                    self.events.emit(ManagerEvent::ProviderCallFailure {
                        chain: chain.to_string(),
                        provider_name: provider_name.clone(),
                        operation: op_label,
                        reason: err.to_string(),
                    });

                    if matches!(&err, ManagerError::Auth { .. }) {
                        self.health.record_auth_failure(chain, &provider_name);
                        return Err(err);
                    }
                    if matches!(&err, ManagerError::Http { .. }) {
                        return Err(err);
                    }

                    self.health.record_failure(chain, &provider_name);
                    last_error = Some(err);
                }
            }
        }

        if attempted.is_empty() {
            return Err(ManagerError::NoProvidersAvailable {
                chain: chain.to_string(),
                rejected: skipped,
            });
        }

        Err(ManagerError::AllCandidatesFailed {
            chain: chain.to_string(),
            attempted,
            last: Box::new(last_error.expect("at least one candidate was attempted")),
        })
    }

    /// Streaming `executeWithFailover` (spec §4.7.2). Spawns one task that
    /// drives the fetch/dedup/cursor/emit loop and forwards results over a
    /// bounded channel; dropping the returned stream closes the channel,
    /// which the task observes at its next suspension point and uses to
    /// stop making further requests (spec §5 "Cancellation").
    pub fn execute_with_failover(
        &self,
        chain: String,
        operation: Operation,
        resume_cursor: Option<CursorState>,
    ) -> ReceiverStream<Result<StreamingBatch, ManagerError>> {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let manager = self.clone();

        tokio::spawn(async move {
            manager.drive_stream(chain, operation, resume_cursor, tx).await;
        });

        ReceiverStream::new(rx)
    }

    async fn drive_stream(
        &self,
        chain: String,
        operation: Operation,
        resume_cursor: Option<CursorState>,
        tx: mpsc::Sender<Result<StreamingBatch, ManagerError>>,
    ) {
        let op_label = operation_label(&operation);
        let (candidates, rejected) = self.candidates_for(&chain, &operation);
        if candidates.is_empty() {
            let _ = tx
                .send(Err(ManagerError::NoProvidersAvailable {
                    chain: chain.clone(),
                    rejected: rejected
                        .into_iter()
                        .map(|(provider_name, reason)| crate::error::RejectedCandidate {
                            provider_name,
                            reason: reason.reason().to_string(),
                        })
                        .collect(),
                }))
                .await;
            return;
        }

        let mut dedup = DedupWindow::seeded(
            1000,
            resume_cursor
                .as_ref()
                .map(|c| c.metadata.recent_ids.clone())
                .unwrap_or_default(),
        );

        let mut remaining = candidates.into_iter();
        let mut current = remaining.next().expect("checked non-empty above");
        let mut skipped: Vec<crate::error::RejectedCandidate> = Vec::new();
        while !self.try_admit(&chain, &current.metadata.name) {
            skipped.push(crate::error::RejectedCandidate {
                provider_name: current.metadata.name.clone(),
                reason: "circuit open".to_string(),
            });
            let Some(next) = remaining.next() else {
                let _ = tx
                    .send(Err(ManagerError::NoProvidersAvailable {
                        chain: chain.clone(),
                        rejected: skipped,
                    }))
                    .await;
                return;
            };
            current = next;
        }
        let mut attempted = vec![current.metadata.name.clone()];

        self.events.emit(ManagerEvent::ProviderSelection {
            chain: chain.clone(),
            operation: op_label,
            provider_name: current.metadata.name.clone(),
        });

        let (mut resolved, mut warned) = resolve_cursor(resume_cursor.as_ref(), &current.metadata, false);
        if resume_cursor.is_some() && !warned {
            self.events.emit(ManagerEvent::ProviderResume {
                chain: chain.clone(),
                provider_name: current.metadata.name.clone(),
                cursor: resume_cursor.clone().expect("resume_cursor is Some"),
            });
        }
        let mut prior_cursor_state = resume_cursor;

        loop {
            if tx.is_closed() {
                self.events.emit(ManagerEvent::ProviderStreamCancelled {
                    chain: chain.clone(),
                    provider_name: current.metadata.name.clone(),
                });
                return;
            }

            let adapter = self.adapter_for(&chain, &current.metadata.name);
            let resolved_for_adapter = adapter.apply_replay_window(resolved.clone());
            let started = Instant::now();

            match adapter.stream_page(&operation, resolved_for_adapter).await {
                Ok(page) => {
                    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                    self.health.record_success(&chain, &current.metadata.name, latency_ms);
                    self.events.emit(ManagerEvent::ProviderCallSuccess {
                        chain: chain.clone(),
                        provider_name: current.metadata.name.clone(),
                        operation: op_label,
                        latency_ms,
                    });

                    let survivors: Vec<BatchItem> = dedup
                        .deduplicate(page.items, |item| item.normalized.event_id.as_str());

                    let mut alt_cursors: Vec<Cursor> = Vec::new();
                    let mut primary_cursor = None;
                    if let Some(last) = survivors.last() {
                        let mut extracted = adapter.extract_cursors(&last.normalized);
                        if !extracted.is_empty() {
                            primary_cursor = Some(extracted.remove(0));
                            alt_cursors = extracted;
                        }
                    }
                    if primary_cursor.is_none() {
                        if let Some(token) = &page.next_page_token {
                            primary_cursor = Some(Cursor::PageToken {
                                value: token.clone(),
                                provider_name: current.metadata.name.clone(),
                            });
                        }
                    }
                    let primary_cursor = primary_cursor.unwrap_or_else(|| match &resolved {
                        ResolvedCursor::FromBlock(n) => Cursor::BlockNumber { value: *n },
                        ResolvedCursor::FromTimestamp(t) => Cursor::Timestamp { value: *t },
                        ResolvedCursor::PageToken(t) => Cursor::PageToken {
                            value: t.clone(),
                            provider_name: current.metadata.name.clone(),
                        },
                        ResolvedCursor::Beginning => Cursor::BlockNumber { value: 0 },
                    });

                    let new_cursor_state = CursorState {
                        primary: primary_cursor,
                        alternatives: alt_cursors,
                        metadata: crate::cursor::CursorMetadata {
                            provider_name: Some(current.metadata.name.clone()),
                            updated_at: Some(chrono_like_now()),
                            recent_ids: survivors.iter().map(|i| i.normalized.event_id.clone()).collect(),
                            ..Default::default()
                        },
                    };

                    let item_count = survivors.len();
                    let is_complete = page.is_complete;
                    let batch = StreamingBatch {
                        items: survivors,
                        provider_name: current.metadata.name.clone(),
                        cursor: new_cursor_state.clone(),
                        is_complete,
                        has_more: Some(!is_complete),
                    };

                    self.events.emit(ManagerEvent::ProviderStreamBatch {
                        chain: chain.clone(),
                        provider_name: current.metadata.name.clone(),
                        item_count,
                    });

                    if tx.send(Ok(batch)).await.is_err() {
                        return;
                    }

                    if is_complete {
                        self.events.emit(ManagerEvent::ProviderStreamComplete {
                            chain: chain.clone(),
                            provider_name: current.metadata.name.clone(),
                        });
                        return;
                    }

                    prior_cursor_state = Some(new_cursor_state);
                    resolved = match &prior_cursor_state {
                        Some(cs) => resolve_cursor(Some(cs), &current.metadata, false).0,
                        None => resolved,
                    };
                }
                Err(err) if err.is_retriable() => {
                    self.events.emit(ManagerEvent::ProviderCallFailure {
                        chain: chain.clone(),
                        provider_name: current.metadata.name.clone(),
                        operation: op_label,
                        reason: err.to_string(),
                    });
                    self.health.record_failure(&chain, &current.metadata.name);

                    let mut next = match remaining.next() {
                        Some(next) => next,
                        None => {
                            let _ = tx
                                .send(Err(ManagerError::AllCandidatesFailed {
                                    chain: chain.clone(),
                                    attempted: attempted.clone(),
                                    last: Box::new(err),
                                }))
                                .await;
                            return;
                        }
                    };
                    while !self.try_admit(&chain, &next.metadata.name) {
                        next = match remaining.next() {
                            Some(n) => n,
                            None => {
                                let _ = tx
                                    .send(Err(ManagerError::AllCandidatesFailed {
                                        chain: chain.clone(),
                                        attempted: attempted.clone(),
                                        last: Box::new(err),
                                    }))
                                    .await;
                                return;
                            }
                        };
                    }

                    self.events.emit(ManagerEvent::ProviderFailover {
                        chain: chain.clone(),
                        from_provider: current.metadata.name.clone(),
                        to_provider: next.metadata.name.clone(),
                        reason: err.to_string(),
                    });

                    let before = prior_cursor_state.clone();
                    let (new_resolved, _warned) =
                        resolve_cursor(prior_cursor_state.as_ref(), &next.metadata, true);

                    if let (Some(before), true) = (&before, cursor_differs(&before.primary, &new_resolved)) {
                        self.events.emit(ManagerEvent::ProviderCursorAdjusted {
                            chain: chain.clone(),
                            provider_name: next.metadata.name.clone(),
                            before: before.clone(),
                            after: CursorState {
                                primary: resolved_to_cursor(&new_resolved, &next.metadata.name),
                                alternatives: Vec::new(),
                                metadata: before.metadata.clone(),
                            },
                        });
                    }

                    attempted.push(next.metadata.name.clone());
                    current = next;
                    resolved = new_resolved;
                }
                Err(err) => {
                    self.events.emit(ManagerEvent::ProviderCallFailure {
                        chain: chain.clone(),
                        provider_name: current.metadata.name.clone(),
                        operation: op_label,
                        reason: err.to_string(),
                    });
                    if matches!(&err, ManagerError::Auth { .. }) {
                        self.health.record_auth_failure(&chain, &current.metadata.name);
                    }
                    let _ = tx.send(Err(err)).await;
                    return;
                }
            }
        }
    }
}

fn cursor_differs(before: &Cursor, after: &ResolvedCursor) -> bool {
    match (before, after) {
        (Cursor::BlockNumber { value }, ResolvedCursor::FromBlock(n)) => value != n,
        (Cursor::Timestamp { value }, ResolvedCursor::FromTimestamp(t)) => value != t,
        (Cursor::PageToken { value, .. }, ResolvedCursor::PageToken(t)) => value != t,
        _ => true,
    }
}

fn resolved_to_cursor(resolved: &ResolvedCursor, provider_name: &str) -> Cursor {
    match resolved {
        ResolvedCursor::FromBlock(n) => Cursor::BlockNumber { value: *n },
        ResolvedCursor::FromTimestamp(t) => Cursor::Timestamp { value: *t },
        ResolvedCursor::PageToken(t) => Cursor::PageToken {
            value: t.clone(),
            provider_name: provider_name.to_string(),
        },
        ResolvedCursor::Beginning => Cursor::BlockNumber { value: 0 },
    }
}

/// Wall-clock seconds since the epoch. Kept as a thin wrapper (rather than
/// calling `SystemTime::now()` inline everywhere) so a future revision can
/// inject a clock for deterministic tests without touching call sites.
fn chrono_like_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
