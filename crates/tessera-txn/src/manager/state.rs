//! Shared tables and the protocol transitions that mutate them.
//!
//! Everything here runs with the engine's state mutex held, so each
//! transition is one indivisible read-modify-write over the lock table,
//! conflict flags, store, clock, and history.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering as AtomicOrdering;

use tessera_common::config::{EngineConfig, Protocol, ReadLockDuration};
use tessera_common::error::{TesseraError, TesseraResult};
use tessera_common::types::{ObjectId, Timestamp, TxnId, Value};
use tessera_mvcc::{LogicalClock, ScalarStore, Snapshot, StoreSnapshot, VersionStore};

use super::transaction::{AbortReason, Transaction, TransactionState};
use super::{Action, TransactionStats};
use crate::conflict::ConflictTracker;
use crate::deadlock::WaitForGraph;
use crate::history::{Event, HistoryLog};
use crate::lock::{LockMode, LockRequest, LockResult, LockTable};
use crate::script::{NextAction, Operation};

/// Object storage for the active protocol.
pub(crate) enum Storage {
    /// One counter per object (2PL).
    Scalar(ScalarStore),
    /// Version chains (SI/SSI).
    Versioned(VersionStore),
}

impl Storage {
    fn for_config(config: &EngineConfig) -> Self {
        match config.protocol {
            Protocol::TwoPhaseLocking => Storage::Scalar(ScalarStore::new(&config.objects)),
            Protocol::SnapshotIsolation => Storage::Versioned(VersionStore::new(&config.objects)),
        }
    }

    pub(crate) fn snapshot(&self) -> StoreSnapshot {
        match self {
            Storage::Scalar(cells) => StoreSnapshot::Scalar(cells.values()),
            Storage::Versioned(store) => StoreSnapshot::Versioned(store.versions()),
        }
    }
}

pub(crate) struct EngineState {
    pub(crate) config: EngineConfig,
    pub(crate) txns: BTreeMap<TxnId, Transaction>,
    pub(crate) locks: LockTable,
    pub(crate) conflicts: ConflictTracker,
    pub(crate) storage: Storage,
    pub(crate) clock: LogicalClock,
    pub(crate) history: HistoryLog,
    /// Set by the first step; admission closes afterwards.
    pub(crate) started: bool,
    /// Counts SI begins and commits, ordering them.
    seq: u64,
}

impl EngineState {
    pub(crate) fn new(config: EngineConfig) -> Self {
        Self {
            locks: LockTable::new(&config.objects),
            storage: Storage::for_config(&config),
            conflicts: ConflictTracker::new(),
            clock: LogicalClock::new(),
            history: HistoryLog::new(),
            txns: BTreeMap::new(),
            started: false,
            seq: 0,
            config,
        }
    }

    fn is_two_phase(&self) -> bool {
        self.config.protocol == Protocol::TwoPhaseLocking
    }

    pub(crate) fn txn(&self, txn_id: TxnId) -> TesseraResult<&Transaction> {
        self.txns
            .get(&txn_id)
            .ok_or(TesseraError::NotAdmitted { txn_id })
    }

    fn txn_mut(&mut self, txn_id: TxnId) -> TesseraResult<&mut Transaction> {
        self.txns
            .get_mut(&txn_id)
            .ok_or(TesseraError::NotAdmitted { txn_id })
    }

    fn scalars(&mut self) -> TesseraResult<&mut ScalarStore> {
        match &mut self.storage {
            Storage::Scalar(cells) => Ok(cells),
            Storage::Versioned(_) => Err(TesseraError::internal("2PL step on a versioned store")),
        }
    }

    fn versions(&self) -> TesseraResult<&VersionStore> {
        match &self.storage {
            Storage::Versioned(store) => Ok(store),
            Storage::Scalar(_) => Err(TesseraError::internal("SI step on a scalar store")),
        }
    }

    fn versions_mut(&mut self) -> TesseraResult<&mut VersionStore> {
        match &mut self.storage {
            Storage::Versioned(store) => Ok(store),
            Storage::Scalar(_) => Err(TesseraError::internal("SI step on a scalar store")),
        }
    }

    // =========================================================================
    // Enabledness and waiting
    // =========================================================================

    /// Whether the transaction's next action can proceed now.
    pub(crate) fn is_enabled(&self, txn_id: TxnId) -> TesseraResult<bool> {
        let txn = self.txn(txn_id)?;
        if txn.state.is_terminal() {
            return Ok(false);
        }
        if !self.is_two_phase() && txn.state == TransactionState::Init {
            return Ok(true);
        }
        let enabled = match txn.next_action() {
            NextAction::Commit => true,
            NextAction::Op(Operation::Read(object)) => {
                !self.is_two_phase() || self.locks.holders(object)?.writer_is_free_or(txn_id)
            }
            NextAction::Op(Operation::Write(object)) => {
                let holders = self.locks.holders(object)?;
                if self.is_two_phase() {
                    match holders.writer {
                        None => true,
                        Some(w) => w == txn_id && holders.readers_covered_by_writer(),
                    }
                } else {
                    holders.writer_is_free_or(txn_id)
                }
            }
        };
        Ok(enabled)
    }

    /// The lock request a non-enabled transaction is waiting on.
    fn pending_request(&self, txn: &Transaction) -> Option<LockRequest> {
        match txn.next_action() {
            NextAction::Op(Operation::Read(object)) => {
                Some(LockRequest::new(txn.id, object, LockMode::Read))
            }
            NextAction::Op(Operation::Write(object)) => {
                Some(LockRequest::new(txn.id, object, LockMode::Write))
            }
            NextAction::Commit => None,
        }
    }

    /// Live transactions whose next action cannot proceed.
    pub(crate) fn blocked(&self) -> TesseraResult<Vec<TxnId>> {
        let mut blocked = Vec::new();
        for (id, txn) in &self.txns {
            if !txn.state.is_terminal() && !self.is_enabled(*id)? {
                blocked.push(*id);
            }
        }
        Ok(blocked)
    }

    /// Derives the wait-for graph from the current lock table.
    pub(crate) fn wait_for_graph(&self) -> TesseraResult<WaitForGraph> {
        let mut requests = Vec::new();
        for id in self.blocked()? {
            if let Some(request) = self.pending_request(self.txn(id)?) {
                requests.push(request);
            }
        }
        WaitForGraph::from_requests(&self.locks, &requests, self.is_two_phase())
    }

    /// Transactions a scheduler may pick: enabled ones, plus (under SI)
    /// deadlocked ones, whose step aborts a victim.
    pub(crate) fn candidates(&self, graph: &WaitForGraph) -> TesseraResult<Vec<TxnId>> {
        let mut candidates = Vec::new();
        for (id, txn) in &self.txns {
            if txn.state.is_terminal() {
                continue;
            }
            if self.is_enabled(*id)? || (!self.is_two_phase() && graph.is_deadlocked(*id)) {
                candidates.push(*id);
            }
        }
        Ok(candidates)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Applies the next action of an enabled transaction.
    pub(crate) fn apply(&mut self, txn_id: TxnId, stats: &TransactionStats) -> TesseraResult<Action> {
        let txn = self.txn(txn_id)?;
        let (state, next) = (txn.state, txn.next_action());
        if state.is_terminal() {
            return Err(TesseraError::TransactionEnded { txn_id });
        }

        if self.is_two_phase() {
            if state == TransactionState::Init {
                self.txn_mut(txn_id)?.state = TransactionState::Running;
                stats.started.fetch_add(1, AtomicOrdering::Relaxed);
            }
            return match next {
                NextAction::Op(Operation::Read(object)) => self.read_two_phase(txn_id, object),
                NextAction::Op(Operation::Write(object)) => self.write_two_phase(txn_id, object),
                NextAction::Commit => self.commit_two_phase(txn_id, stats),
            };
        }

        if state == TransactionState::Init {
            return self.begin_snapshot(txn_id, stats);
        }
        match next {
            NextAction::Op(Operation::Read(object)) => self.read_snapshot(txn_id, object, stats),
            NextAction::Op(Operation::Write(object)) => self.write_snapshot(txn_id, object, stats),
            NextAction::Commit => self.commit_snapshot(txn_id, stats),
        }
    }

    fn record(&mut self, txn_id: TxnId, event: Event) -> TesseraResult<()> {
        self.history.append(txn_id, event);
        if !event.is_terminal() {
            self.txn_mut(txn_id)?.pc += 1;
        }
        Ok(())
    }

    /// Aborts a live transaction: discards its buffer and releases its locks.
    pub(crate) fn abort(
        &mut self,
        txn_id: TxnId,
        reason: AbortReason,
        stats: &TransactionStats,
    ) -> TesseraResult<Action> {
        let txn = self.txn_mut(txn_id)?;
        if txn.state.is_terminal() {
            return Err(TesseraError::TransactionEnded { txn_id });
        }
        txn.state = TransactionState::Aborted(reason);
        txn.write_buffer.clear();
        self.locks.release_all(txn_id);
        self.record(txn_id, Event::Abort { reason })?;
        stats.record_abort(reason);
        tracing::info!(txn = %txn_id, reason = %reason, "transaction aborted");
        Ok(Action::Abort { reason })
    }

    // -------------------------------------------------------------------------
    // Two-phase locking
    // -------------------------------------------------------------------------

    fn read_two_phase(&mut self, txn_id: TxnId, object: ObjectId) -> TesseraResult<Action> {
        if self.config.read_locks == ReadLockDuration::Long
            && self.locks.try_read(txn_id, object)? == LockResult::Waiting
        {
            return Err(TesseraError::internal("read scheduled while write-locked"));
        }
        let value = Value::Counter(self.scalars()?.get(object)?);
        self.record(txn_id, Event::Read { object, value })?;
        tracing::debug!(txn = %txn_id, object = %object, value = %value, "read");
        Ok(Action::Read { object, value })
    }

    fn write_two_phase(&mut self, txn_id: TxnId, object: ObjectId) -> TesseraResult<Action> {
        if !self.locks.try_write(txn_id, object)?.is_success() {
            return Err(TesseraError::internal("write scheduled while write-locked"));
        }
        if !self.locks.holders(object)?.readers_covered_by_writer() {
            tracing::debug!(txn = %txn_id, object = %object, "write lock taken, waiting for readers");
            return Ok(Action::LockAcquired { object });
        }
        let value = Value::Counter(self.scalars()?.increment(object)?);
        self.record(txn_id, Event::Write { object, value })?;
        tracing::debug!(txn = %txn_id, object = %object, value = %value, "write");
        Ok(Action::Write { object, value })
    }

    fn commit_two_phase(&mut self, txn_id: TxnId, stats: &TransactionStats) -> TesseraResult<Action> {
        self.txn_mut(txn_id)?.state = TransactionState::Committed;
        self.locks.release_all(txn_id);
        self.record(txn_id, Event::Commit { commit_ts: None })?;
        stats.committed.fetch_add(1, AtomicOrdering::Relaxed);
        tracing::info!(txn = %txn_id, "transaction committed");
        Ok(Action::Commit { commit_ts: None })
    }

    // -------------------------------------------------------------------------
    // Snapshot isolation
    // -------------------------------------------------------------------------

    fn begin_snapshot(&mut self, txn_id: TxnId, stats: &TransactionStats) -> TesseraResult<Action> {
        let start_ts = self.clock.now();
        let seq = self.next_seq();
        let txn = self.txn_mut(txn_id)?;
        txn.state = TransactionState::Running;
        txn.start_ts = Some(start_ts);
        txn.begin_seq = Some(seq);
        stats.started.fetch_add(1, AtomicOrdering::Relaxed);
        tracing::debug!(txn = %txn_id, start_ts = %start_ts, "snapshot taken");
        Ok(Action::Begin { start_ts })
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn start_ts(&self, txn_id: TxnId) -> TesseraResult<Timestamp> {
        self.txn(txn_id)?
            .start_ts
            .ok_or_else(|| TesseraError::internal(format!("{} has no snapshot", txn_id)))
    }

    fn read_snapshot(
        &mut self,
        txn_id: TxnId,
        object: ObjectId,
        stats: &TransactionStats,
    ) -> TesseraResult<Action> {
        if let Some(value) = self.txn(txn_id)?.write_buffer.get(&object).copied() {
            self.record(txn_id, Event::Read { object, value })?;
            return Ok(Action::Read { object, value });
        }

        let snapshot = Snapshot::new(self.start_ts(txn_id)?);
        let version = snapshot.read(self.versions()?, object)?;

        if self.config.serialize_mode {
            self.conflicts.register_read(txn_id, object);
            self.conflicts.mark_out(txn_id);
            if let Some(writer) = self.locks.writer(object)?.filter(|w| *w != txn_id) {
                self.conflicts.record_edge(txn_id, writer);
            }
            let newer = snapshot.concurrent_versions(self.versions()?, object)?;
            if newer
                .iter()
                .any(|v| self.conflicts.flags(v.writer).out_conflict)
            {
                return self.abort(txn_id, AbortReason::DangerousStructure, stats);
            }
            for v in newer {
                self.conflicts.record_edge(txn_id, v.writer);
            }
        }

        let value = version.value();
        self.record(txn_id, Event::Read { object, value })?;
        tracing::debug!(txn = %txn_id, object = %object, value = %value, "snapshot read");
        Ok(Action::Read { object, value })
    }

    fn write_snapshot(
        &mut self,
        txn_id: TxnId,
        object: ObjectId,
        stats: &TransactionStats,
    ) -> TesseraResult<Action> {
        if !self.locks.try_write(txn_id, object)?.is_success() {
            return Err(TesseraError::internal("write scheduled while write-locked"));
        }
        let start_ts = self.start_ts(txn_id)?;

        if self.config.serialize_mode {
            let begin_seq = self.txn(txn_id)?.begin_seq.unwrap_or_default();
            let readers: Vec<TxnId> = self
                .conflicts
                .readers_except(object, txn_id)
                .into_iter()
                .filter(|r| self.txns.get(r).map_or(false, |t| t.overlaps(begin_seq)))
                .collect();
            if readers.iter().any(|r| self.conflicts.flags(*r).in_conflict) {
                return self.abort(txn_id, AbortReason::DangerousStructure, stats);
            }
            for reader in readers {
                self.conflicts.record_edge(reader, txn_id);
            }
        }

        if self.versions()?.chain(object)?.has_newer_than(start_ts) {
            return self.abort(txn_id, AbortReason::FirstUpdaterWins, stats);
        }

        let value = Value::Writer(txn_id);
        self.txn_mut(txn_id)?.write_buffer.insert(object, value);
        self.record(txn_id, Event::Write { object, value })?;
        tracing::debug!(txn = %txn_id, object = %object, "write buffered");
        Ok(Action::Write { object, value })
    }

    fn commit_snapshot(&mut self, txn_id: TxnId, stats: &TransactionStats) -> TesseraResult<Action> {
        if self.config.serialize_mode && self.conflicts.is_pivot(txn_id) {
            return self.abort(txn_id, AbortReason::DangerousStructure, stats);
        }

        let writes: Vec<ObjectId> = self.txn(txn_id)?.write_buffer.keys().copied().collect();
        let commit_ts = if writes.is_empty() {
            self.clock.now()
        } else {
            self.clock.tick()
        };
        for object in writes {
            self.versions_mut()?.install(object, commit_ts, txn_id)?;
        }

        let seq = self.next_seq();
        let txn = self.txn_mut(txn_id)?;
        txn.write_buffer.clear();
        txn.commit_ts = Some(commit_ts);
        txn.commit_seq = Some(seq);
        txn.state = TransactionState::Committed;
        self.locks.release_all(txn_id);
        self.record(
            txn_id,
            Event::Commit {
                commit_ts: Some(commit_ts),
            },
        )?;
        stats.committed.fetch_add(1, AtomicOrdering::Relaxed);
        tracing::info!(txn = %txn_id, commit_ts = %commit_ts, "transaction committed");
        Ok(Action::Commit {
            commit_ts: Some(commit_ts),
        })
    }
}
