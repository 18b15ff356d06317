//! Deterministic event-id derivation, for adapters that don't receive a
//! stable id from the upstream API and for the bundled mock adapter.
//! Grounded in the teacher's `Sha256` use in `auth.rs`, repurposed here
//! from challenge hashing to content-addressed event ids.

use sha2::{Digest, Sha256};

/// Hash `(provider_name, parts...)` into a stable hex id. Two calls with
/// the same inputs always produce the same id, so replays of the same
/// underlying event collapse to one id for the dedup window.
pub fn deterministic_event_id(provider_name: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(provider_name.as_bytes());
    for part in parts {
        hasher.update(b"|");
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_yield_same_id() {
        let a = deterministic_event_id("mempool", &["tx123", "0"]);
        let b = deterministic_event_id("mempool", &["tx123", "0"]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_provider_yields_different_id() {
        let a = deterministic_event_id("mempool", &["tx123"]);
        let b = deterministic_event_id("blockstream", &["tx123"]);
        assert_ne!(a, b);
    }
}
