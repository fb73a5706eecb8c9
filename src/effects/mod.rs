//! Async runtime of the engine.
//!
//! This module is the "imperative shell" around [`crate::core`]: it runs user
//! callbacks, supervises state actions and trigger loops, and drives the
//! activate/transition/deactivate protocol.
//!
//! # Key Concepts
//!
//! - **State Machine**: Serializes lifecycle operations and keeps every
//!   transition atomic
//! - **Exception Policy**: Routes callback failures through ordered handlers
//! - **Actions**: Long-running per-state work, coupled or detached
//! - **Triggers**: Background loops that react to signals while active
//!
//! # Cancellation
//!
//! Every operation takes a [`CancellationToken`](tokio_util::sync::CancellationToken).
//! Canceling it aborts the operation at its next await point and is reported
//! as [`MachineError::Canceled`].

mod action;
mod error;
mod machine;
mod mapping;
mod policy;
mod trigger;

pub use action::ActionDiscipline;
pub use error::MachineError;
pub use machine::{Lifecycle, StateMachine, WeakMachine};
pub use policy::{Category, Decision, ExceptionHandler, ExceptionPolicy};
pub use trigger::{Signal, TriggerContext, TriggerMode};

pub(crate) use machine::MachineParts;
pub(crate) use trigger::{Awaited, TriggerDef};
