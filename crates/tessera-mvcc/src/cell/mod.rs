//! Scalar counter cells for two-phase locking.
//!
//! Under two-phase locking each object holds a single counter, starting at
//! zero. Writes are applied eagerly: every successful write increments the
//! counter and the new value is the written value.

use std::collections::BTreeMap;

use tessera_common::error::{TesseraError, TesseraResult};
use tessera_common::types::ObjectId;

/// One counter per configured object.
#[derive(Debug, Clone)]
pub struct ScalarStore {
    cells: BTreeMap<ObjectId, u64>,
}

impl ScalarStore {
    /// Creates a store with every counter at zero.
    pub fn new(objects: &[ObjectId]) -> Self {
        Self {
            cells: objects.iter().map(|o| (*o, 0)).collect(),
        }
    }

    /// Reads an object's current value.
    pub fn get(&self, object: ObjectId) -> TesseraResult<u64> {
        self.cells
            .get(&object)
            .copied()
            .ok_or(TesseraError::UnknownObject { object })
    }

    /// Increments an object's counter and returns the new value.
    pub fn increment(&mut self, object: ObjectId) -> TesseraResult<u64> {
        let cell = self
            .cells
            .get_mut(&object)
            .ok_or(TesseraError::UnknownObject { object })?;
        *cell += 1;
        Ok(*cell)
    }

    /// Copies every counter.
    pub fn values(&self) -> BTreeMap<ObjectId, u64> {
        self.cells.clone()
    }
}
