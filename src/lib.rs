//! Opstate - reversible operation primitives for multi-step workflows
//!
//! Opstate provides a unit of work, the [`Operation`], that pairs a queue of
//! forward actions with a queue of compensating undo actions, and an
//! [`OperationManager`] that tracks pending operations, executes them, and
//! rolls them back in reverse order of commitment. It is meant to be
//! embedded inside a larger tool, such as a migration or deployment
//! pipeline, so that partial failures can be compensated.
//!
//! # Architecture
//!
//! - [`operation`] - Actions, operations, identity keys, and the drain
//!   protocol that runs queued actions front to back
//! - [`manager`] - Pending/executed bookkeeping, batch execution, and
//!   reverse-of-commit-order rollback
//!
//! # Correctness Invariants
//!
//! Opstate maintains the following invariants:
//!
//! 1. An operation's key never changes after its first read
//! 2. Action queues drain in insertion order and are single-use per drain
//! 3. An operation is pending or executed, never both
//! 4. Rollback compensates the most recently committed operation first
//!
//! # What this crate is not
//!
//! Not a transactional engine: undo is best-effort replay of caller-supplied
//! compensating actions, not a rollback log. Action failures are surfaced
//! unmodified; there is no retry logic, no internal locking, and no
//! cancellation. A hung action blocks the caller.
//!
//! # Example
//!
//! ```
//! use opstate::{Action, Operation, OperationManager};
//! use serde_json::json;
//!
//! let mut provision = Operation::new();
//! provision
//!     .add_execute(Action::with_arg("create-bucket", json!("assets"), |arg| {
//!         let name = arg.and_then(|v| v.as_str().map(str::to_owned)).unwrap_or_default();
//!         Ok(json!(format!("bucket {name} created")))
//!     }))
//!     .add_undo(Action::with_arg("delete-bucket", json!("assets"), |arg| {
//!         let name = arg.and_then(|v| v.as_str().map(str::to_owned)).unwrap_or_default();
//!         Ok(json!(format!("bucket {name} deleted")))
//!     }));
//!
//! let mut manager = OperationManager::new();
//! let key = manager.add(provision);
//!
//! let results = manager.execute_all()?;
//! assert_eq!(results[&key], vec![json!("bucket assets created")]);
//!
//! // Something later in the workflow failed: compensate.
//! let undone = manager.undo_all()?.expect("executed operations to undo");
//! assert_eq!(undone[&key], vec![json!("bucket assets deleted")]);
//! # Ok::<(), opstate::ManagerError>(())
//! ```

pub mod manager;
pub mod operation;

pub use manager::{BatchResults, ManagerError, OperationManager};
pub use operation::{Action, ActionError, ActionFn, Operation, OperationError, OperationKey};
