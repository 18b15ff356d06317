//! Deterministic, side-effect-free provider selection (spec §4.4).

use std::collections::HashMap;

use crate::health::Circuit;
use crate::operation::Operation;
use crate::provider::ProviderMetadata;

/// One scored, ordered candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub metadata: ProviderMetadata,
    pub score: f64,
}

/// Why a provider was excluded from `select_candidates`'s output, used to
/// build `ManagerError::NoProvidersAvailable` when the result is empty.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    UnsupportedOperation,
    UnsupportedStreamType,
    CircuitOpen,
    ApiKeyMissing,
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::UnsupportedOperation => "does not support this operation",
            Rejection::UnsupportedStreamType => "does not support this stream type",
            Rejection::CircuitOpen => "circuit open",
            Rejection::ApiKeyMissing => "required API key missing",
        }
    }
}

fn rate_limit_bonus(rps: f64) -> f64 {
    if rps <= 0.5 {
        -40.0
    } else if rps <= 1.0 {
        -20.0
    } else if rps >= 3.0 {
        10.0
    } else {
        0.0
    }
}

/// Produce an ordered candidate list (spec §4.4 rules 1-5). `registration_order`
/// must reflect the order providers were registered in, for stable tie-break.
pub fn select_candidates(
    providers: &[ProviderMetadata],
    operation: &Operation,
    health_scores: &HashMap<String, f64>,
    circuits: &HashMap<String, Circuit>,
) -> (Vec<Candidate>, Vec<(String, Rejection)>) {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();

    for (idx, meta) in providers.iter().enumerate() {
        if !meta.capabilities.contains(&operation.capability()) {
            rejected.push((meta.name.clone(), Rejection::UnsupportedOperation));
            continue;
        }
        if operation.is_streaming() && !meta.stream_types.contains(&operation.stream_type()) {
            rejected.push((meta.name.clone(), Rejection::UnsupportedStreamType));
            continue;
        }
        let circuit = circuits.get(&meta.name).copied().unwrap_or(Circuit::Closed);
        if !matches!(circuit, Circuit::Closed | Circuit::HalfOpen) {
            rejected.push((meta.name.clone(), Rejection::CircuitOpen));
            continue;
        }
        if !meta.has_api_key() {
            rejected.push((meta.name.clone(), Rejection::ApiKeyMissing));
            continue;
        }

        let health = health_scores.get(&meta.name).copied().unwrap_or(100.0);
        let score = health + rate_limit_bonus(meta.rate_limit.requests_per_second);
        accepted.push((idx, Candidate { metadata: meta.clone(), score }));
    }

    // Stable sort descending by score; ties break by registration order
    // (the original index), which `sort_by` preserves for equal keys only
    // if we include it explicitly since we're sorting a derived tuple.
    accepted.sort_by(|(ia, a), (ib, b)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(ia.cmp(ib))
    });

    (accepted.into_iter().map(|(_, c)| c).collect(), rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::CursorKind;
    use crate::operation::Capability;
    use crate::provider::{RateLimitPolicy, ReplayWindow};
    use std::collections::HashSet;

    fn meta(name: &str, rps: f64) -> ProviderMetadata {
        ProviderMetadata {
            name: name.to_string(),
            chain: "bitcoin".to_string(),
            capabilities: HashSet::from([Capability::StreamAddressTransactions]),
            stream_types: HashSet::from([crate::model::StreamType::Normal]),
            supported_cursor_types: HashSet::from([CursorKind::BlockNumber]),
            preferred_cursor_type: CursorKind::BlockNumber,
            replay_window: ReplayWindow::default(),
            rate_limit: RateLimitPolicy {
                requests_per_second: rps,
                ..RateLimitPolicy::default()
            },
            requires_api_key: false,
            api_key_env_var: None,
        }
    }

    fn op() -> Operation {
        Operation::GetAddressTransactions {
            address: "addr".into(),
            stream_type: crate::model::StreamType::Normal,
        }
    }

    #[test]
    fn sorts_descending_by_score() {
        let providers = vec![meta("a", 3.0), meta("b", 3.0), meta("c", 0.2)];
        let health = HashMap::from([
            ("a".to_string(), 80.0),
            ("b".to_string(), 90.0),
            ("c".to_string(), 100.0),
        ]);
        let (candidates, _) = select_candidates(&providers, &op(), &health, &HashMap::new());
        let names: Vec<_> = candidates.iter().map(|c| c.metadata.name.clone()).collect();
        // b: 90+10=100, a: 80+10=90, c: 100-40=60
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn ties_break_by_registration_order() {
        let providers = vec![meta("first", 3.0), meta("second", 3.0)];
        let health = HashMap::from([
            ("first".to_string(), 50.0),
            ("second".to_string(), 50.0),
        ]);
        let (candidates, _) = select_candidates(&providers, &op(), &health, &HashMap::new());
        assert_eq!(candidates[0].metadata.name, "first");
        assert_eq!(candidates[1].metadata.name, "second");
    }

    #[test]
    fn excludes_open_circuit() {
        let providers = vec![meta("a", 3.0), meta("b", 3.0)];
        let circuits = HashMap::from([("a".to_string(), Circuit::Open)]);
        let (candidates, rejected) =
            select_candidates(&providers, &op(), &HashMap::new(), &circuits);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].metadata.name, "b");
        assert_eq!(rejected, vec![("a".to_string(), Rejection::CircuitOpen)]);
    }

    #[test]
    fn excludes_unsupported_stream_type() {
        let mut providers = vec![meta("a", 3.0)];
        providers[0].stream_types = HashSet::from([crate::model::StreamType::Token]);
        let (candidates, rejected) =
            select_candidates(&providers, &op(), &HashMap::new(), &HashMap::new());
        assert!(candidates.is_empty());
        assert_eq!(
            rejected,
            vec![("a".to_string(), Rejection::UnsupportedStreamType)]
        );
    }

    #[test]
    fn deterministic_across_repeated_calls() {
        let providers = vec![meta("a", 3.0), meta("b", 0.5), meta("c", 1.0)];
        let health = HashMap::new();
        let (first, _) = select_candidates(&providers, &op(), &health, &HashMap::new());
        let (second, _) = select_candidates(&providers, &op(), &health, &HashMap::new());
        assert_eq!(first, second);
    }

    #[test]
    fn selector_never_considers_unsupported_capability() {
        let providers = vec![meta("a", 3.0)];
        let balance_op = Operation::GetAddressBalances { address: "x".into() };
        let (candidates, rejected) =
            select_candidates(&providers, &balance_op, &HashMap::new(), &HashMap::new());
        assert!(candidates.is_empty());
        assert_eq!(
            rejected,
            vec![("a".to_string(), Rejection::UnsupportedOperation)]
        );
    }
}
