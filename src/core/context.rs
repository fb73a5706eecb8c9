//! Callback plumbing shared by every layer.
//!
//! User callbacks are async closures returning `Result<_, Fault>`. A
//! [`Fault`] is either a cooperative cancellation or an application error,
//! so cancellation never has to be recognised by inspecting error values.

use super::params::{ParamError, Params};
use super::state::StateId;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Type-erased application error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Owned, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of a failed callback.
#[derive(Debug, Error)]
pub enum Fault {
    #[error("operation canceled")]
    Canceled,

    #[error("{0}")]
    Failed(BoxError),
}

impl Fault {
    pub fn failed(error: impl Into<BoxError>) -> Self {
        Self::Failed(error.into())
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

impl From<ParamError> for Fault {
    fn from(error: ParamError) -> Self {
        Self::Failed(Box::new(error))
    }
}

/// Async callback taking a context value.
pub type Handler<C> = Arc<dyn Fn(C) -> BoxFuture<'static, Result<(), Fault>> + Send + Sync>;

/// Box an async closure into a [`Handler`].
pub fn handler<C, F, Fut>(f: F) -> Handler<C>
where
    C: 'static,
    F: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Fault>> + Send + 'static,
{
    Arc::new(move |ctx: C| -> BoxFuture<'static, Result<(), Fault>> { Box::pin(f(ctx)) })
}

/// Passed to entry, exit, activate, deactivate handlers and to actions.
#[derive(Clone, Debug)]
pub struct StateContext {
    pub state: StateId,
    pub parameters: Params,
    pub token: CancellationToken,
}

/// Passed to the machine-wide state-change handler.
#[derive(Clone, Debug)]
pub struct StateChange {
    /// `None` when the machine is activating.
    pub from: Option<StateId>,
    pub to: StateId,
    /// Transition label, `None` when the machine is activating.
    pub label: Option<String>,
    /// Payload the target state is entered with.
    pub parameters: Params,
    pub token: CancellationToken,
}

/// Passed to transition guards.
#[derive(Clone, Debug)]
pub struct GuardContext {
    pub state: StateId,
    /// Payload of the current state.
    pub parameters: Params,
    /// Values the transition was invoked with.
    pub arguments: Params,
    pub token: CancellationToken,
}

/// Passed to mapping transforms.
#[derive(Clone, Debug)]
pub struct MapInput {
    /// Payload of the state being left.
    pub previous: Params,
    /// Values the transition was invoked with.
    pub arguments: Params,
    pub token: CancellationToken,
}
