use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use serde::Serialize;
use tracing::warn;

/// Suffixes tried before falling back to a random one.
pub const MAX_SUFFIX_ATTEMPTS: u32 = 10_000;

/// A domain in which every assigned value must be distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    InboundTag,
    Username,
    CoreConfigName,
}

/// Run-scoped record of assigned values plus the id → value forward map.
#[derive(Debug, Clone, Default)]
pub struct UniquenessLedger {
    assigned: BTreeMap<Namespace, BTreeSet<String>>,
    forward: BTreeMap<(Namespace, i64), String>,
}

impl UniquenessLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, namespace: Namespace, value: &str) -> bool {
        self.assigned
            .get(&namespace)
            .is_some_and(|values| values.contains(value))
    }

    /// Assign `candidate`, or the first free `candidate_N` for N >= 2.
    pub fn resolve(&mut self, namespace: Namespace, candidate: &str) -> String {
        let resolved = self.next_free(namespace, candidate);
        self.assigned
            .entry(namespace)
            .or_default()
            .insert(resolved.clone());
        resolved
    }

    /// Resolve on behalf of a source entity and record the result for later
    /// lookups. An id that was already resolved keeps its first value.
    pub fn resolve_for(&mut self, namespace: Namespace, id: i64, candidate: &str) -> String {
        if let Some(existing) = self.forward.get(&(namespace, id)) {
            return existing.clone();
        }
        let resolved = self.resolve(namespace, candidate);
        self.forward.insert((namespace, id), resolved.clone());
        resolved
    }

    /// Value previously resolved for `id`.
    pub fn lookup(&self, namespace: Namespace, id: i64) -> Option<&str> {
        self.forward.get(&(namespace, id)).map(String::as_str)
    }

    pub fn len(&self, namespace: Namespace) -> usize {
        self.assigned.get(&namespace).map_or(0, BTreeSet::len)
    }

    fn next_free(&self, namespace: Namespace, candidate: &str) -> String {
        if !self.contains(namespace, candidate) {
            return candidate.to_string();
        }
        for counter in 2..=MAX_SUFFIX_ATTEMPTS + 1 {
            let attempt = format!("{candidate}_{counter}");
            if !self.contains(namespace, &attempt) {
                return attempt;
            }
        }

        warn!(
            namespace = ?namespace,
            candidate = %candidate,
            "suffix attempts exhausted, using random suffix"
        );
        let mut rng = rand::rng();
        loop {
            let attempt = format!("{candidate}_{}", rng.random_range(10_000..100_000_000u32));
            if !self.contains(namespace, &attempt) {
                return attempt;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_candidate_stays_unqualified() {
        let mut ledger = UniquenessLedger::new();
        assert_eq!(ledger.resolve(Namespace::InboundTag, "vless-in"), "vless-in");
        assert_eq!(ledger.resolve(Namespace::InboundTag, "vless-in"), "vless-in_2");
        assert_eq!(ledger.resolve(Namespace::InboundTag, "vless-in"), "vless-in_3");
    }

    #[test]
    fn suffix_skips_values_taken_verbatim() {
        let mut ledger = UniquenessLedger::new();
        ledger.resolve(Namespace::Username, "alice_2");
        ledger.resolve(Namespace::Username, "alice");
        assert_eq!(ledger.resolve(Namespace::Username, "alice"), "alice_3");
    }

    #[test]
    fn namespaces_are_independent() {
        let mut ledger = UniquenessLedger::new();
        ledger.resolve(Namespace::InboundTag, "main");
        assert_eq!(ledger.resolve(Namespace::CoreConfigName, "main"), "main");
    }

    #[test]
    fn forward_map_returns_resolved_value() {
        let mut ledger = UniquenessLedger::new();
        ledger.resolve_for(Namespace::InboundTag, 1, "vless-in");
        ledger.resolve_for(Namespace::InboundTag, 2, "vless-in");
        assert_eq!(ledger.lookup(Namespace::InboundTag, 1), Some("vless-in"));
        assert_eq!(ledger.lookup(Namespace::InboundTag, 2), Some("vless-in_2"));
        assert_eq!(ledger.lookup(Namespace::InboundTag, 3), None);
    }

    #[test]
    fn resolving_same_id_twice_is_stable() {
        let mut ledger = UniquenessLedger::new();
        let first = ledger.resolve_for(Namespace::InboundTag, 5, "trojan");
        let second = ledger.resolve_for(Namespace::InboundTag, 5, "trojan");
        assert_eq!(first, second);
        assert_eq!(ledger.len(Namespace::InboundTag), 1);
    }

    #[test]
    fn resolved_values_are_distinct() {
        let mut ledger = UniquenessLedger::new();
        let candidates = ["a", "a", "a_2", "b", "a", "a_2"];
        let resolved: Vec<String> = candidates
            .iter()
            .map(|candidate| ledger.resolve(Namespace::Username, candidate))
            .collect();
        let unique: BTreeSet<&String> = resolved.iter().collect();
        assert_eq!(unique.len(), resolved.len());
        assert_eq!(resolved[0], "a");
    }
}
