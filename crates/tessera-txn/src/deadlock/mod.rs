//! Deadlock detection.
//!
//! The wait-for graph is derived from the lock table every time it is
//! consulted: an edge `T1 -> T2` means T1's next operation cannot proceed
//! until T2 releases a lock. Nothing is cached between checks, so the graph
//! never outlives the lock state it describes.
//!
//! ```text
//!     ┌────┐  waits for  ┌────┐
//!     │ T1 │────────────▶│ T2 │
//!     └────┘             └────┘
//!        ▲                  │
//!        │    waits for     │
//!        └──────────────────┘
//!        deadlock: T1 ∈ reach(T1)
//! ```
//!
//! Reachability uses an explicit visited set, so it terminates on graphs
//! with cycles that do not pass through the start node.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use tessera_common::error::TesseraResult;
use tessera_common::types::TxnId;

use crate::lock::{LockRequest, LockTable};

/// Wait-for graph.
#[derive(Debug, Clone, Default)]
pub struct WaitForGraph {
    /// Edges: waiter -> transactions it waits for.
    edges: BTreeMap<TxnId, BTreeSet<TxnId>>,
}

impl WaitForGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph for a set of pending lock requests.
    pub fn from_requests<'a>(
        locks: &LockTable,
        requests: impl IntoIterator<Item = &'a LockRequest>,
        writes_wait_for_readers: bool,
    ) -> TesseraResult<Self> {
        let mut graph = Self::new();
        for request in requests {
            for holder in locks.blockers(request, writes_wait_for_readers)? {
                graph.add_wait(request.txn_id, holder);
            }
        }
        Ok(graph)
    }

    /// Adds a wait-for edge.
    pub fn add_wait(&mut self, waiter: TxnId, holder: TxnId) {
        if waiter != holder {
            self.edges.entry(waiter).or_default().insert(holder);
        }
    }

    /// Transactions `txn_id` directly waits for.
    pub fn waits_for(&self, txn_id: TxnId) -> impl Iterator<Item = TxnId> + '_ {
        self.edges.get(&txn_id).into_iter().flatten().copied()
    }

    /// All transactions reachable from `txn_id` by one or more edges.
    pub fn reachable_from(&self, txn_id: TxnId) -> HashSet<TxnId> {
        let mut visited = HashSet::new();
        let mut stack: Vec<TxnId> = self.waits_for(txn_id).collect();
        while let Some(node) = stack.pop() {
            if visited.insert(node) {
                stack.extend(self.waits_for(node));
            }
        }
        visited
    }

    /// Returns true if `txn_id` lies on a wait-for cycle.
    pub fn is_deadlocked(&self, txn_id: TxnId) -> bool {
        self.reachable_from(txn_id).contains(&txn_id)
    }

    /// Finds a cycle through `txn_id`, listed starting from `txn_id`.
    pub fn find_cycle(&self, txn_id: TxnId) -> Option<Vec<TxnId>> {
        let mut visited = HashSet::new();
        let mut path = vec![txn_id];
        if self.dfs_find_cycle(txn_id, txn_id, &mut visited, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn dfs_find_cycle(
        &self,
        node: TxnId,
        target: TxnId,
        visited: &mut HashSet<TxnId>,
        path: &mut Vec<TxnId>,
    ) -> bool {
        for next in self.waits_for(node) {
            if next == target {
                return true;
            }
            if visited.insert(next) {
                path.push(next);
                if self.dfs_find_cycle(next, target, visited, path) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|s| s.len()).sum()
    }
}

/// Information about a detected deadlock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlockInfo {
    /// Transactions on the cycle, starting with the one that was checked.
    pub cycle: Vec<TxnId>,
    /// Aborted transaction, if the protocol resolves deadlocks.
    pub victim: Option<TxnId>,
}

/// Statistics about deadlock detection.
#[derive(Debug, Default)]
pub struct DeadlockStats {
    /// Number of detection runs.
    pub detection_runs: AtomicU64,
    /// Number of deadlocks found.
    pub deadlocks_found: AtomicU64,
    /// Number of deadlocks resolved by aborting a victim.
    pub victims_aborted: AtomicU64,
}

/// Deadlock detector.
#[derive(Debug, Default)]
pub struct DeadlockDetector {
    stats: DeadlockStats,
}

impl DeadlockDetector {
    /// Creates a new detector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks whether `txn_id` is on a cycle of `graph`.
    pub fn detect(&self, graph: &WaitForGraph, txn_id: TxnId) -> Option<DeadlockInfo> {
        self.stats.detection_runs.fetch_add(1, AtomicOrdering::Relaxed);
        let cycle = graph.find_cycle(txn_id)?;
        self.stats.deadlocks_found.fetch_add(1, AtomicOrdering::Relaxed);
        tracing::debug!(
            txn = %txn_id,
            cycle = ?cycle,
            edges = graph.edge_count(),
            "deadlock detected"
        );
        Some(DeadlockInfo {
            cycle,
            victim: None,
        })
    }

    /// Records that a victim was aborted.
    pub fn record_victim(&self, info: &mut DeadlockInfo, victim: TxnId) {
        info.victim = Some(victim);
        self.stats.victims_aborted.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Returns the statistics.
    pub fn stats(&self) -> &DeadlockStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::LockMode;
    use tessera_common::types::ObjectId;

    fn t(n: u64) -> TxnId {
        TxnId::new(n)
    }

    #[test]
    fn test_no_cycle() {
        let mut graph = WaitForGraph::new();
        graph.add_wait(t(1), t(2));
        graph.add_wait(t(2), t(3));

        assert!(!graph.is_deadlocked(t(1)));
        assert!(graph.find_cycle(t(1)).is_none());
        assert_eq!(graph.reachable_from(t(1)).len(), 2);
    }

    #[test]
    fn test_simple_cycle() {
        let mut graph = WaitForGraph::new();
        graph.add_wait(t(1), t(2));
        graph.add_wait(t(2), t(1));

        assert!(graph.is_deadlocked(t(1)));
        assert!(graph.is_deadlocked(t(2)));
        assert_eq!(graph.find_cycle(t(1)), Some(vec![t(1), t(2)]));
    }

    #[test]
    fn test_three_way_cycle() {
        let mut graph = WaitForGraph::new();
        graph.add_wait(t(1), t(2));
        graph.add_wait(t(2), t(3));
        graph.add_wait(t(3), t(1));

        assert_eq!(graph.find_cycle(t(2)), Some(vec![t(2), t(3), t(1)]));
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn test_cycle_not_through_start() {
        // T1 waits on a cycle between T2 and T3 but is not part of it.
        let mut graph = WaitForGraph::new();
        graph.add_wait(t(1), t(2));
        graph.add_wait(t(2), t(3));
        graph.add_wait(t(3), t(2));

        assert!(!graph.is_deadlocked(t(1)));
        assert!(graph.find_cycle(t(1)).is_none());
        assert!(graph.is_deadlocked(t(2)));
    }

    #[test]
    fn test_self_edges_ignored() {
        let mut graph = WaitForGraph::new();
        graph.add_wait(t(1), t(1));
        assert_eq!(graph.edge_count(), 0);
        assert!(!graph.is_deadlocked(t(1)));
    }

    #[test]
    fn test_graph_from_lock_table() {
        let (a, b) = (ObjectId::new(1), ObjectId::new(2));
        let mut locks = LockTable::new(&[a, b]);
        locks.try_read(t(1), a).unwrap();
        locks.try_read(t(2), b).unwrap();
        locks.try_write(t(1), b).unwrap();
        locks.try_write(t(2), a).unwrap();

        let requests = [
            LockRequest::new(t(1), b, LockMode::Write),
            LockRequest::new(t(2), a, LockMode::Write),
        ];
        let graph = WaitForGraph::from_requests(&locks, &requests, true).unwrap();
        assert!(graph.is_deadlocked(t(1)));
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_detector_stats() {
        let detector = DeadlockDetector::new();
        let mut graph = WaitForGraph::new();
        graph.add_wait(t(1), t(2));
        assert!(detector.detect(&graph, t(1)).is_none());

        graph.add_wait(t(2), t(1));
        let mut info = detector.detect(&graph, t(2)).unwrap();
        detector.record_victim(&mut info, t(2));

        assert_eq!(info.victim, Some(t(2)));
        assert_eq!(detector.stats().detection_runs.load(AtomicOrdering::Relaxed), 2);
        assert_eq!(detector.stats().deadlocks_found.load(AtomicOrdering::Relaxed), 1);
        assert_eq!(detector.stats().victims_aborted.load(AtomicOrdering::Relaxed), 1);
    }
}
