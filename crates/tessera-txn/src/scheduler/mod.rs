//! Selection strategies.
//!
//! The engine asks a strategy which enabled transaction moves next, which
//! member of a deadlock cycle to abort, and whether a running SI
//! transaction should abort voluntarily. A strategy must be weakly fair: a
//! transaction that stays enabled is eventually selected.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tessera_common::types::TxnId;

/// Decides scheduling nondeterminism.
pub trait SelectionStrategy: Send {
    /// Picks one of `candidates`. Candidates are sorted and non-empty.
    fn select_txn(&mut self, candidates: &[TxnId]) -> Option<TxnId>;

    /// Picks the member of a deadlock cycle to abort.
    ///
    /// Defaults to the youngest transaction, i.e. the highest identity.
    fn select_victim(&mut self, cycle: &[TxnId]) -> Option<TxnId> {
        cycle.iter().copied().max()
    }

    /// Whether a running SI transaction aborts instead of taking its step.
    fn should_cancel(&mut self, _txn_id: TxnId) -> bool {
        false
    }
}

/// Cycles through transactions in identity order.
#[derive(Debug, Default)]
pub struct RoundRobin {
    last: Option<TxnId>,
}

impl RoundRobin {
    /// Creates a round-robin strategy.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionStrategy for RoundRobin {
    fn select_txn(&mut self, candidates: &[TxnId]) -> Option<TxnId> {
        let next = match self.last {
            Some(last) => candidates
                .iter()
                .copied()
                .find(|c| *c > last)
                .or_else(|| candidates.first().copied()),
            None => candidates.first().copied(),
        };
        if next.is_some() {
            self.last = next;
        }
        next
    }
}

/// Uniform random choices from a seeded generator.
#[derive(Debug)]
pub struct Randomized {
    rng: StdRng,
    cancel_probability: f64,
}

impl Randomized {
    /// Creates a randomized strategy that never cancels.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            cancel_probability: 0.0,
        }
    }

    /// Sets the per-step probability of a voluntary abort.
    pub fn with_cancel_probability(mut self, probability: f64) -> Self {
        self.cancel_probability = probability.clamp(0.0, 1.0);
        self
    }
}

impl SelectionStrategy for Randomized {
    fn select_txn(&mut self, candidates: &[TxnId]) -> Option<TxnId> {
        if candidates.is_empty() {
            return None;
        }
        Some(candidates[self.rng.gen_range(0..candidates.len())])
    }

    fn select_victim(&mut self, cycle: &[TxnId]) -> Option<TxnId> {
        if cycle.is_empty() {
            return None;
        }
        Some(cycle[self.rng.gen_range(0..cycle.len())])
    }

    fn should_cancel(&mut self, _txn_id: TxnId) -> bool {
        self.cancel_probability > 0.0 && self.rng.gen_bool(self.cancel_probability)
    }
}

/// Replays a fixed interleaving.
///
/// Each scripted entry is consumed when it is a candidate. When the head of
/// the queue cannot move, or the queue is exhausted, selection falls back to
/// round-robin without consuming the entry.
#[derive(Debug, Default)]
pub struct Scripted {
    order: VecDeque<TxnId>,
    victims: Vec<TxnId>,
    cancels: Vec<TxnId>,
    fallback: RoundRobin,
}

impl Scripted {
    /// Creates a strategy replaying `order`.
    pub fn new(order: impl IntoIterator<Item = TxnId>) -> Self {
        Self {
            order: order.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Prefers these transactions, in order, as deadlock victims.
    pub fn with_victims(mut self, victims: impl IntoIterator<Item = TxnId>) -> Self {
        self.victims = victims.into_iter().collect();
        self
    }

    /// Transactions that abort voluntarily at their next SI step.
    pub fn with_cancels(mut self, cancels: impl IntoIterator<Item = TxnId>) -> Self {
        self.cancels = cancels.into_iter().collect();
        self
    }

    /// Scripted entries not yet consumed.
    pub fn remaining(&self) -> usize {
        self.order.len()
    }
}

impl SelectionStrategy for Scripted {
    fn select_txn(&mut self, candidates: &[TxnId]) -> Option<TxnId> {
        if let Some(head) = self.order.front().copied() {
            if candidates.contains(&head) {
                self.order.pop_front();
                return Some(head);
            }
            tracing::debug!(txn = %head, "scripted transaction not enabled, falling back");
        }
        self.fallback.select_txn(candidates)
    }

    fn select_victim(&mut self, cycle: &[TxnId]) -> Option<TxnId> {
        self.victims
            .iter()
            .copied()
            .find(|v| cycle.contains(v))
            .or_else(|| cycle.iter().copied().max())
    }

    fn should_cancel(&mut self, txn_id: TxnId) -> bool {
        match self.cancels.iter().position(|c| *c == txn_id) {
            Some(pos) => {
                self.cancels.remove(pos);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(ns: &[u64]) -> Vec<TxnId> {
        ns.iter().map(|n| TxnId::new(*n)).collect()
    }

    #[test]
    fn test_round_robin_cycles() {
        let mut rr = RoundRobin::new();
        let candidates = ids(&[1, 2, 3]);

        let picks: Vec<TxnId> = (0..4).filter_map(|_| rr.select_txn(&candidates)).collect();
        assert_eq!(picks, ids(&[1, 2, 3, 1]));
    }

    #[test]
    fn test_round_robin_skips_missing() {
        let mut rr = RoundRobin::new();
        assert_eq!(rr.select_txn(&ids(&[1, 3])), Some(TxnId::new(1)));
        assert_eq!(rr.select_txn(&ids(&[1, 3])), Some(TxnId::new(3)));
        assert_eq!(rr.select_txn(&ids(&[2])), Some(TxnId::new(2)));
        assert_eq!(rr.select_txn(&[]), None);
    }

    #[test]
    fn test_default_victim_is_youngest() {
        let mut rr = RoundRobin::new();
        assert_eq!(rr.select_victim(&ids(&[2, 5, 3])), Some(TxnId::new(5)));
        assert!(!rr.should_cancel(TxnId::new(1)));
    }

    #[test]
    fn test_randomized_deterministic_per_seed() {
        let candidates = ids(&[1, 2, 3, 4]);
        let mut a = Randomized::new(7);
        let mut b = Randomized::new(7);
        for _ in 0..20 {
            assert_eq!(a.select_txn(&candidates), b.select_txn(&candidates));
        }
    }

    #[test]
    fn test_randomized_cancel_probability() {
        let mut never = Randomized::new(1);
        assert!((0..100).all(|_| !never.should_cancel(TxnId::new(1))));

        let mut always = Randomized::new(1).with_cancel_probability(1.0);
        assert!(always.should_cancel(TxnId::new(1)));
    }

    #[test]
    fn test_scripted_order_and_fallback() {
        let mut s = Scripted::new(ids(&[2, 1]));

        assert_eq!(s.select_txn(&ids(&[1, 2])), Some(TxnId::new(2)));
        // Head (T1) not enabled: fall back without consuming it.
        assert_eq!(s.select_txn(&ids(&[3])), Some(TxnId::new(3)));
        assert_eq!(s.remaining(), 1);
        assert_eq!(s.select_txn(&ids(&[1, 3])), Some(TxnId::new(1)));
        assert_eq!(s.remaining(), 0);
    }

    #[test]
    fn test_scripted_victims_and_cancels() {
        let mut s = Scripted::default().with_victims(ids(&[1])).with_cancels(ids(&[4]));

        assert_eq!(s.select_victim(&ids(&[1, 2])), Some(TxnId::new(1)));
        assert_eq!(s.select_victim(&ids(&[2, 3])), Some(TxnId::new(3)));
        assert!(s.should_cancel(TxnId::new(4)));
        assert!(!s.should_cancel(TxnId::new(4)));
    }
}
