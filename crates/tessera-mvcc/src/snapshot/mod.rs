//! Snapshot isolation visibility.
//!
//! A transaction's snapshot is fixed when it takes its first action. A
//! committed version V is visible to transaction T if V's timestamp is not
//! greater than T's snapshot timestamp; of the visible versions, a read
//! returns the latest. T always sees its own buffered writes first; the
//! buffer is owned by the transaction, not by this module.

use tessera_common::error::TesseraResult;
use tessera_common::types::{ObjectId, Timestamp};

use crate::version::{Version, VersionStore};

/// A consistent view of the store as of a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    read_ts: Timestamp,
}

impl Snapshot {
    /// Creates a snapshot taken at `read_ts`.
    pub fn new(read_ts: Timestamp) -> Self {
        Self { read_ts }
    }

    /// Reads the visible version of an object.
    pub fn read(&self, store: &VersionStore, object: ObjectId) -> TesseraResult<Version> {
        store.read_at(object, self.read_ts)
    }

    /// Versions of an object committed after this snapshot was taken.
    pub fn concurrent_versions(
        &self,
        store: &VersionStore,
        object: ObjectId,
    ) -> TesseraResult<Vec<Version>> {
        Ok(store
            .chain(object)?
            .newer_than(self.read_ts)
            .copied()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::types::TxnId;

    const A: ObjectId = ObjectId::new(1);

    #[test]
    fn test_read_picks_latest_visible() {
        let mut store = VersionStore::new(&[A]);
        store.install(A, Timestamp::new(1), TxnId::new(1)).unwrap();
        store.install(A, Timestamp::new(2), TxnId::new(3)).unwrap();

        let snapshot = Snapshot::new(Timestamp::new(1));
        assert_eq!(snapshot.read(&store, A).unwrap().writer, TxnId::new(1));

        let concurrent = snapshot.concurrent_versions(&store, A).unwrap();
        assert_eq!(concurrent.len(), 1);
        assert_eq!(concurrent[0].writer, TxnId::new(3));
    }

    #[test]
    fn test_genesis_snapshot() {
        let store = VersionStore::new(&[A]);
        let snapshot = Snapshot::new(Timestamp::ZERO);
        assert_eq!(snapshot.read(&store, A).unwrap(), Version::genesis());
        assert!(snapshot.concurrent_versions(&store, A).unwrap().is_empty());
    }
}
