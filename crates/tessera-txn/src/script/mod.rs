//! Transaction scripts.
//!
//! A script is the fixed, finite list of operations a transaction executes,
//! followed by an implicit commit. Scripts deserialize from a compact form:
//!
//! ```toml
//! ops = [{ read = 1 }, { write = 2 }]
//! ```

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tessera_common::error::{TesseraError, TesseraResult};
use tessera_common::types::{ObjectId, TxnId};

/// A single scripted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Read an object.
    Read(ObjectId),
    /// Write an object.
    Write(ObjectId),
}

impl Operation {
    /// Returns the object the operation touches.
    pub fn object(&self) -> ObjectId {
        match self {
            Operation::Read(o) | Operation::Write(o) => *o,
        }
    }

    /// Returns true for writes.
    pub fn is_write(&self) -> bool {
        matches!(self, Operation::Write(_))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Read(o) => write!(f, "R({})", o),
            Operation::Write(o) => write!(f, "W({})", o),
        }
    }
}

/// What a transaction does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// Execute a scripted operation.
    Op(Operation),
    /// All operations are done: commit.
    Commit,
}

/// An ordered list of operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Script {
    ops: Vec<Operation>,
}

impl Script {
    /// Creates a script from operations.
    pub fn new(ops: Vec<Operation>) -> Self {
        Self { ops }
    }

    /// Generates a random script of 1 to `max_ops` operations.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, objects: &[ObjectId], max_ops: usize) -> Self {
        if objects.is_empty() || max_ops == 0 {
            return Self::default();
        }
        let len = rng.gen_range(1..=max_ops);
        let ops = (0..len)
            .map(|_| {
                let object = objects[rng.gen_range(0..objects.len())];
                if rng.gen_bool(0.5) {
                    Operation::Read(object)
                } else {
                    Operation::Write(object)
                }
            })
            .collect();
        Self { ops }
    }

    /// Returns the operations.
    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    /// Returns the number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if the script has no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns the action at position `pc`.
    pub fn action_at(&self, pc: usize) -> NextAction {
        match self.ops.get(pc) {
            Some(op) => NextAction::Op(*op),
            None => NextAction::Commit,
        }
    }

    /// Checks the script against the configured objects and length bound.
    pub fn validate(&self, txn_id: TxnId, objects: &[ObjectId], max: usize) -> TesseraResult<()> {
        if self.ops.len() > max {
            return Err(TesseraError::ScriptTooLong {
                txn_id,
                len: self.ops.len(),
                max,
            });
        }
        if let Some(op) = self.ops.iter().find(|op| !objects.contains(&op.object())) {
            return Err(TesseraError::UnknownObject {
                object: op.object(),
            });
        }
        Ok(())
    }
}

impl From<Vec<Operation>> for Script {
    fn from(ops: Vec<Operation>) -> Self {
        Self::new(ops)
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.ops.iter().map(|op| op.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const A: ObjectId = ObjectId::new(1);
    const B: ObjectId = ObjectId::new(2);

    #[test]
    fn test_action_at() {
        let script = Script::new(vec![Operation::Read(A), Operation::Write(B)]);
        assert_eq!(script.action_at(0), NextAction::Op(Operation::Read(A)));
        assert_eq!(script.action_at(1), NextAction::Op(Operation::Write(B)));
        assert_eq!(script.action_at(2), NextAction::Commit);
    }

    #[test]
    fn test_validate() {
        let t1 = TxnId::new(1);
        let script = Script::new(vec![Operation::Read(A), Operation::Write(B)]);
        assert!(script.validate(t1, &[A, B], 4).is_ok());

        let err = script.validate(t1, &[A, B], 1).unwrap_err();
        assert!(matches!(err, TesseraError::ScriptTooLong { len: 2, max: 1, .. }));

        let err = script.validate(t1, &[A], 4).unwrap_err();
        assert_eq!(err, TesseraError::UnknownObject { object: B });
    }

    #[test]
    fn test_random_script_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let script = Script::random(&mut rng, &[A, B], 3);
            assert!((1..=3).contains(&script.len()));
            assert!(script.ops().iter().all(|op| op.object() == A || op.object() == B));
        }
        assert!(Script::random(&mut rng, &[], 3).is_empty());
    }

    #[test]
    fn test_display() {
        let script = Script::new(vec![Operation::Read(A), Operation::Write(B)]);
        assert_eq!(script.to_string(), "[R(o1), W(o2)]");
    }

    #[test]
    fn test_serde_form() {
        let script: Script = serde_json::from_str(r#"[{"read":1},{"write":2}]"#).unwrap();
        assert_eq!(script.ops(), &[Operation::Read(A), Operation::Write(B)]);
    }
}
