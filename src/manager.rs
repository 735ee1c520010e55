//! manager
//!
//! Pending/executed bookkeeping for [`Operation`]s.
//!
//! The manager owns operations handed to it via [`add`](OperationManager::add)
//! and tracks them through two collections: a pending list in insertion order
//! and an executed list in commit order. Rollback walks the executed list
//! back to front, so the most recently committed operation is undone first.
//! That reverse-of-commit ordering is the load-bearing guarantee for
//! compensating a partially completed multi-step workflow.
//!
//! # Ordering
//!
//! Both "iterate pending in insertion order" and "evict the last-inserted
//! entry" are defined by an explicit ordered list, never by hash map
//! internals. Membership is tested by key equality alone; operations are
//! never cloned or compared structurally.
//!
//! # Concurrency
//!
//! Single-threaded and synchronous. There is no internal locking; a host
//! that shares a manager across threads must serialize access itself, for
//! example behind a `Mutex`.

use std::collections::HashMap;

use log::debug;
use serde_json::Value;
use thiserror::Error;

use crate::operation::{Operation, OperationError, OperationKey};

/// Errors from manager bookkeeping and batch driving.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// `execute` was called for an operation that is not pending.
    #[error("operation `{0}` is not queued; add it to the manager before executing")]
    NotQueued(OperationKey),

    /// `get` was called with a key that has no pending entry.
    #[error("no pending operation under key `{0}`")]
    NotFound(OperationKey),

    /// An action failed while an operation's queue was draining.
    #[error(transparent)]
    Operation(#[from] OperationError),
}

/// Results of a batch drive, keyed by operation key.
pub type BatchResults = HashMap<OperationKey, Vec<Value>>;

/// Tracks a set of operations, executes them, and rolls them back in
/// reverse order of commitment.
///
/// An operation's key appears in at most one of the two collections at a
/// time: `add` inserts into pending, a successful `execute` moves the entry
/// to executed, and `undo_all` pops executed entries as it compensates them.
///
/// # Example
///
/// ```
/// use opstate::{Action, Operation, OperationManager};
/// use serde_json::json;
///
/// let mut op = Operation::new();
/// op.add_execute(Action::call("create", |_| Ok(json!("created"))))
///     .add_undo(Action::call("destroy", |_| Ok(json!("destroyed"))));
///
/// let mut manager = OperationManager::new();
/// let key = manager.add(op);
///
/// let results = manager.execute_all()?;
/// assert_eq!(results[&key], vec![json!("created")]);
///
/// let undone = manager.undo_all()?.expect("one operation to undo");
/// assert_eq!(undone[&key], vec![json!("destroyed")]);
/// # Ok::<(), opstate::ManagerError>(())
/// ```
#[derive(Debug, Default)]
pub struct OperationManager {
    /// Pending operations in insertion order.
    pending: Vec<(OperationKey, Operation)>,
    /// Executed operations in commit order, consumed LIFO by `undo_all`.
    executed: Vec<Operation>,
}

impl OperationManager {
    /// Create a manager with no tracked operations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `operation` into the pending set, keyed by its identity.
    ///
    /// Returns the key for later lookups. Adding under a key that is
    /// already pending replaces the stored operation in place: last write
    /// wins, original position preserved.
    pub fn add(&mut self, operation: Operation) -> OperationKey {
        let key = operation.key();
        match self.position(&key) {
            Some(idx) => self.pending[idx].1 = operation,
            None => self.pending.push((key, operation)),
        }
        key
    }

    /// Evict the pending entry under `key`, returning the operation.
    ///
    /// Returns `None` when nothing is pending under `key`; the manager is
    /// unchanged in that case.
    pub fn remove(&mut self, key: &OperationKey) -> Option<Operation> {
        let idx = self.position(key)?;
        Some(self.pending.remove(idx).1)
    }

    /// Evict the most recently inserted pending entry.
    pub fn remove_last(&mut self) -> Option<Operation> {
        self.pending.pop().map(|(_, operation)| operation)
    }

    /// Whether `key` has a pending entry.
    pub fn is_queued(&self, key: &OperationKey) -> bool {
        self.position(key).is_some()
    }

    /// The pending operation under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::NotFound`] when `key` has no pending entry.
    pub fn get(&self, key: &OperationKey) -> Result<&Operation, ManagerError> {
        self.position(key)
            .map(|idx| &self.pending[idx].1)
            .ok_or(ManagerError::NotFound(*key))
    }

    /// Execute the pending operation under `key`.
    ///
    /// The operation drains in place and moves to the end of the executed
    /// list only after the drain completes without failure. A failing
    /// operation stays pending with whatever remains of its queue, so the
    /// caller can inspect it, repair it, or remove it.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::NotQueued`] when `key` is not pending, or
    /// the action failure propagated out of the drain.
    pub fn execute(&mut self, key: &OperationKey) -> Result<Vec<Value>, ManagerError> {
        let idx = self.position(key).ok_or(ManagerError::NotQueued(*key))?;
        debug!("executing operation `{key}`");
        let results = self.pending[idx].1.execute()?;
        let (_, operation) = self.pending.remove(idx);
        self.executed.push(operation);
        Ok(results)
    }

    /// Execute every pending operation in insertion order.
    ///
    /// Iterates a snapshot of the pending keys taken at call start, so the
    /// batch is well-defined even though each step mutates the collection.
    /// Results are collected per operation, keyed by its key.
    ///
    /// # Errors
    ///
    /// The first failure propagates immediately: operations already run sit
    /// in the executed list, the failing one stays pending mid-drain, and
    /// unreached ones stay pending untouched.
    pub fn execute_all(&mut self) -> Result<BatchResults, ManagerError> {
        let keys: Vec<OperationKey> = self.pending.iter().map(|(key, _)| *key).collect();
        debug!("executing {} pending operations", keys.len());

        let mut results = BatchResults::with_capacity(keys.len());
        for key in keys {
            let values = self.execute(&key)?;
            results.insert(key, values);
        }
        Ok(results)
    }

    /// Undo a caller-held operation directly.
    ///
    /// No membership check: unlike [`execute`](Self::execute), undo may be
    /// invoked ad hoc on any operation the caller holds, managed or not.
    ///
    /// # Errors
    ///
    /// Propagates the action failure when a compensating callable fails.
    pub fn undo(&self, operation: &mut Operation) -> Result<Vec<Value>, ManagerError> {
        Ok(operation.undo()?)
    }

    /// Undo every executed operation, most recently committed first.
    ///
    /// Returns `Ok(None)` when nothing has been executed, with no side
    /// effects. That signal is distinct from `Ok(Some(map))` with an empty
    /// per-operation result, which means operations were undone but their
    /// undo queues were empty.
    ///
    /// # Errors
    ///
    /// Each operation is popped off the executed list before its undo runs,
    /// so a failure propagates with the failed operation already evicted
    /// and the entries committed before it still listed as executed.
    pub fn undo_all(&mut self) -> Result<Option<BatchResults>, ManagerError> {
        if self.executed.is_empty() {
            return Ok(None);
        }
        debug!("undoing {} executed operations", self.executed.len());

        let mut results = BatchResults::with_capacity(self.executed.len());
        while let Some(mut operation) = self.executed.pop() {
            let key = operation.key();
            let values = self.undo(&mut operation)?;
            results.insert(key, values);
        }
        Ok(Some(results))
    }

    /// Pending operations in insertion order.
    pub fn pending(&self) -> impl Iterator<Item = (&OperationKey, &Operation)> {
        self.pending.iter().map(|(key, operation)| (key, operation))
    }

    /// Executed operations in commit order.
    pub fn executed(&self) -> impl Iterator<Item = &Operation> {
        self.executed.iter()
    }

    /// Number of pending operations.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of executed operations awaiting possible rollback.
    pub fn executed_count(&self) -> usize {
        self.executed.len()
    }

    fn position(&self, key: &OperationKey) -> Option<usize> {
        self.pending.iter().position(|(k, _)| k == key)
    }
}
