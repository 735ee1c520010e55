//! operation
//!
//! Reversible units of work.
//!
//! An [`Operation`] bundles two queues of deferred [`Action`]s: forward
//! actions that do the work, and compensating actions that undo it. Each
//! queue drains front to back as it runs, so an operation is single-use
//! unless the caller re-adds actions. Every operation carries a stable
//! [`OperationKey`] that managers use for membership tracking.
//!
//! # Invariants
//!
//! - A key never changes after its first read
//! - `execute` and `undo` invoke actions in insertion order (FIFO)
//! - A failing action aborts the drain; actions behind it stay queued
//!
//! # Example
//!
//! ```
//! use opstate::{Action, Operation};
//! use serde_json::json;
//!
//! let mut op = Operation::new();
//! op.add_execute(Action::with_arg("shout", json!("hello"), |arg| {
//!     let text = arg.and_then(|v| v.as_str().map(str::to_uppercase));
//!     Ok(json!(text.unwrap_or_default()))
//! }));
//!
//! let results = op.execute()?;
//! assert_eq!(results, vec![json!("HELLO")]);
//!
//! // The queue drained: a second run has nothing left to do.
//! assert!(op.execute()?.is_empty());
//! # Ok::<(), opstate::OperationError>(())
//! ```

use std::cell::OnceCell;
use std::collections::VecDeque;
use std::fmt;

use log::trace;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Type-erased failure reported by an action's callable.
///
/// A callable that cannot resolve or invoke its target (unknown function,
/// missing method on a receiver, receiver of the wrong shape) reports the
/// reason through this type; the operation wraps it into
/// [`OperationError::InvalidAction`] together with the action's name.
pub type ActionError = Box<dyn std::error::Error + Send + Sync>;

/// The signature every action callable conforms to.
///
/// The single parameter is the action's stored argument: `None` for an
/// action built with no argument, `Some` for an action carrying exactly one.
pub type ActionFn = Box<dyn FnOnce(Option<Value>) -> Result<Value, ActionError> + Send>;

/// Errors from running an operation's actions.
#[derive(Debug, Error)]
pub enum OperationError {
    /// The callable behind an action could not be resolved or invoked.
    #[error("invalid action `{action}`: {source}")]
    InvalidAction {
        /// Name of the failing action.
        action: String,
        /// The callable's reported failure.
        source: ActionError,
    },
}

/// Unique identity token for an [`Operation`].
///
/// Keys are v4 UUIDs. Uniqueness is probabilistic and never re-checked;
/// managers compare operations by key, not by structure. Keys serialize
/// through serde so hosts can embed them in their own journals or reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationKey(Uuid);

impl OperationKey {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A deferred invocation: a named callable plus its argument payload.
///
/// The argument is modeled as `Option<Value>`, so "no argument" is a
/// distinct case that no payload can collide with. Callables are boxed
/// `FnOnce`: resolving a function or method by name is the caller's concern
/// at construction time, never a runtime lookup here. The name exists for
/// inspection and error reporting.
pub struct Action {
    name: String,
    argument: Option<Value>,
    callable: ActionFn,
}

impl Action {
    /// Build an action invoked with no argument.
    pub fn call<F>(name: impl Into<String>, callable: F) -> Self
    where
        F: FnOnce(Option<Value>) -> Result<Value, ActionError> + Send + 'static,
    {
        Self {
            name: name.into(),
            argument: None,
            callable: Box::new(callable),
        }
    }

    /// Build an action invoked with the single argument `value`.
    pub fn with_arg<F>(name: impl Into<String>, value: Value, callable: F) -> Self
    where
        F: FnOnce(Option<Value>) -> Result<Value, ActionError> + Send + 'static,
    {
        Self {
            name: name.into(),
            argument: Some(value),
            callable: Box::new(callable),
        }
    }

    /// The action's display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The stored argument, if the action carries one.
    pub fn argument(&self) -> Option<&Value> {
        self.argument.as_ref()
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("argument", &self.argument)
            .finish_non_exhaustive()
    }
}

/// A bundle of ordered execute actions and ordered undo actions sharing one
/// stable identity key.
///
/// Both queues are consumable: running removes actions as it goes. Calling
/// [`execute`](Self::execute) twice in a row yields an empty result the
/// second time unless actions were re-added in between. This is intentional
/// one-shot semantics, not an error.
#[derive(Debug, Default)]
pub struct Operation {
    key: OnceCell<OperationKey>,
    execute_actions: VecDeque<Action>,
    undo_actions: VecDeque<Action>,
}

impl Operation {
    /// Create an empty operation. The key is not generated until first read.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stable identity key, generated on first access and fixed thereafter.
    pub fn key(&self) -> OperationKey {
        *self.key.get_or_init(OperationKey::generate)
    }

    /// Append a forward action. Returns `self` for chaining.
    pub fn add_execute(&mut self, action: Action) -> &mut Self {
        self.execute_actions.push_back(action);
        self
    }

    /// Clear the forward queue, then append `action`.
    pub fn set_execute(&mut self, action: Action) -> &mut Self {
        self.execute_actions.clear();
        self.add_execute(action)
    }

    /// Append a compensating action. Returns `self` for chaining.
    pub fn add_undo(&mut self, action: Action) -> &mut Self {
        self.undo_actions.push_back(action);
        self
    }

    /// Clear the undo queue, then append `action`.
    pub fn set_undo(&mut self, action: Action) -> &mut Self {
        self.undo_actions.clear();
        self.add_undo(action)
    }

    /// Queued forward actions, front of the queue first.
    pub fn execute_actions(&self) -> &VecDeque<Action> {
        &self.execute_actions
    }

    /// Queued compensating actions, front of the queue first.
    pub fn undo_actions(&self) -> &VecDeque<Action> {
        &self.undo_actions
    }

    /// Drain the forward queue, invoking each action in insertion order.
    ///
    /// Each action's result is accumulated in invocation order. The undo
    /// queue is untouched. An empty queue yields `Ok(vec![])`.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::InvalidAction`] when a callable reports
    /// failure. The failing action has been consumed; actions behind it
    /// remain queued, and side effects of earlier actions stand.
    pub fn execute(&mut self) -> Result<Vec<Value>, OperationError> {
        let mut results = Vec::with_capacity(self.execute_actions.len());
        while let Some(action) = self.execute_actions.pop_front() {
            results.push(Self::run(action)?);
        }
        Ok(results)
    }

    /// Drain the undo queue; same protocol as [`execute`](Self::execute).
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::InvalidAction`] when a callable reports
    /// failure, aborting the remainder of the drain.
    pub fn undo(&mut self) -> Result<Vec<Value>, OperationError> {
        let mut results = Vec::with_capacity(self.undo_actions.len());
        while let Some(action) = self.undo_actions.pop_front() {
            results.push(Self::run(action)?);
        }
        Ok(results)
    }

    /// Invoke one action with its stored argument.
    fn run(action: Action) -> Result<Value, OperationError> {
        trace!("running action `{}`", action.name);
        let Action {
            name,
            argument,
            callable,
        } = action;
        callable(argument).map_err(|source| OperationError::InvalidAction {
            action: name,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Action that returns a fixed value.
    fn returns(name: &str, value: Value) -> Action {
        Action::call(name, move |_| Ok(value))
    }

    /// Action that fails as if its target could not be resolved.
    fn unresolvable(name: &str) -> Action {
        let message = format!("no function registered under `{name}`");
        Action::call(name, move |_| Err(message.into()))
    }

    mod key {
        use super::*;

        #[test]
        fn stable_across_reads() {
            let op = Operation::new();
            assert_eq!(op.key(), op.key());
        }

        #[test]
        fn distinct_across_instances() {
            let a = Operation::new();
            let b = Operation::new();
            assert_ne!(a.key(), b.key());
        }

        #[test]
        fn survives_execution() {
            let mut op = Operation::new();
            let before = op.key();
            op.add_execute(returns("noop", Value::Null));
            op.execute().unwrap();
            assert_eq!(before, op.key());
        }

        #[test]
        fn serde_roundtrip() {
            let key = Operation::new().key();
            let json = serde_json::to_string(&key).unwrap();
            let parsed: OperationKey = serde_json::from_str(&json).unwrap();
            assert_eq!(key, parsed);
        }
    }

    mod queues {
        use super::*;

        #[test]
        fn new_operation_has_empty_queues() {
            let op = Operation::new();
            assert!(op.execute_actions().is_empty());
            assert!(op.undo_actions().is_empty());
        }

        #[test]
        fn add_execute_appends_in_order() {
            let mut op = Operation::new();
            op.add_execute(returns("first", json!(1)))
                .add_execute(returns("second", json!(2)));

            let names: Vec<&str> = op.execute_actions().iter().map(Action::name).collect();
            assert_eq!(names, vec!["first", "second"]);
        }

        #[test]
        fn set_execute_replaces_queue() {
            let mut op = Operation::new();
            op.add_execute(returns("first", json!(1)))
                .add_execute(returns("second", json!(2)))
                .set_execute(returns("only", json!(3)));

            let names: Vec<&str> = op.execute_actions().iter().map(Action::name).collect();
            assert_eq!(names, vec!["only"]);
        }

        #[test]
        fn add_undo_appends_in_order() {
            let mut op = Operation::new();
            op.add_undo(returns("first", json!(1)))
                .add_undo(returns("second", json!(2)));

            let names: Vec<&str> = op.undo_actions().iter().map(Action::name).collect();
            assert_eq!(names, vec!["first", "second"]);
        }

        #[test]
        fn set_undo_replaces_queue() {
            let mut op = Operation::new();
            op.add_undo(returns("stale", json!(0)))
                .set_undo(returns("fresh", json!(1)));

            let names: Vec<&str> = op.undo_actions().iter().map(Action::name).collect();
            assert_eq!(names, vec!["fresh"]);
        }

        #[test]
        fn action_exposes_name_and_argument() {
            let with = Action::with_arg("lower", json!("WOAH"), |arg| {
                Ok(json!(arg.and_then(|v| v.as_str().map(str::to_lowercase))))
            });
            assert_eq!(with.name(), "lower");
            assert_eq!(with.argument(), Some(&json!("WOAH")));

            let without = Action::call("count", |_| Ok(json!(0)));
            assert_eq!(without.name(), "count");
            assert!(without.argument().is_none());
        }
    }

    mod execute {
        use super::*;

        #[test]
        fn empty_queue_returns_empty_and_is_idempotent() {
            let mut op = Operation::new();
            assert!(op.execute().unwrap().is_empty());
            assert!(op.execute().unwrap().is_empty());
        }

        #[test]
        fn runs_fifo_and_returns_results_in_order() {
            let mut op = Operation::new();
            op.add_execute(returns("first", json!("a")))
                .add_execute(returns("second", json!("b")));

            let results = op.execute().unwrap();
            assert_eq!(results, vec![json!("a"), json!("b")]);
        }

        #[test]
        fn drains_queue_so_second_run_is_empty() {
            let mut op = Operation::new();
            op.add_execute(returns("only", json!(1)));

            assert_eq!(op.execute().unwrap(), vec![json!(1)]);
            assert!(op.execute_actions().is_empty());
            assert!(op.execute().unwrap().is_empty());
        }

        #[test]
        fn leaves_undo_queue_untouched() {
            let mut op = Operation::new();
            op.add_execute(returns("forward", json!(1)))
                .add_undo(returns("backward", json!(2)));

            op.execute().unwrap();
            assert_eq!(op.undo_actions().len(), 1);
        }

        #[test]
        fn no_argument_action_receives_none() {
            let mut op = Operation::new();
            op.add_execute(Action::call("probe", |arg| Ok(json!(arg.is_none()))));

            assert_eq!(op.execute().unwrap(), vec![json!(true)]);
        }

        #[test]
        fn argument_is_passed_through() {
            let mut op = Operation::new();
            op.add_execute(Action::with_arg("echo", json!({"n": 7}), |arg| {
                Ok(arg.expect("argument stored"))
            }));

            assert_eq!(op.execute().unwrap(), vec![json!({"n": 7})]);
        }

        #[test]
        fn re_added_actions_run_on_next_drain() {
            let mut op = Operation::new();
            op.add_execute(returns("first", json!(1)));
            op.execute().unwrap();

            op.add_execute(returns("second", json!(2)));
            assert_eq!(op.execute().unwrap(), vec![json!(2)]);
        }
    }

    mod undo {
        use super::*;

        #[test]
        fn runs_fifo_over_undo_queue() {
            let mut op = Operation::new();
            op.add_undo(returns("first", json!("x")))
                .add_undo(returns("second", json!("y")));

            assert_eq!(op.undo().unwrap(), vec![json!("x"), json!("y")]);
            assert!(op.undo_actions().is_empty());
        }

        #[test]
        fn empty_undo_queue_returns_empty() {
            let mut op = Operation::new();
            assert!(op.undo().unwrap().is_empty());
        }
    }

    mod failures {
        use super::*;

        #[test]
        fn error_names_the_failing_action() {
            let mut op = Operation::new();
            op.add_execute(unresolvable("bogus_method"));

            let err = op.execute().unwrap_err();
            let OperationError::InvalidAction { action, source } = err;
            assert_eq!(action, "bogus_method");
            assert!(source.to_string().contains("bogus_method"));
        }

        #[test]
        fn failure_aborts_drain_and_leaves_rest_queued() {
            let log = Arc::new(Mutex::new(Vec::new()));

            let mut op = Operation::new();
            let seen = Arc::clone(&log);
            op.add_execute(Action::call("first", move |_| {
                seen.lock().unwrap().push("first");
                Ok(json!(1))
            }))
            .add_execute(unresolvable("broken"))
            .add_execute(returns("third", json!(3)));

            assert!(op.execute().is_err());

            // The first action ran and its effects stand; the failing action
            // was consumed; the third never ran and is still queued.
            assert_eq!(*log.lock().unwrap(), vec!["first"]);
            let names: Vec<&str> = op.execute_actions().iter().map(Action::name).collect();
            assert_eq!(names, vec!["third"]);
        }

        #[test]
        fn undo_failure_propagates() {
            let mut op = Operation::new();
            op.add_undo(unresolvable("missing"));

            assert!(op.undo().is_err());
        }
    }
}
