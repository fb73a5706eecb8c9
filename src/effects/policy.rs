//! Pluggable exception policy.
//!
//! Every user callback runs through [`ExceptionPolicy`], tagged with the
//! [`Category`] of its call site. Handlers are consulted in order and each
//! returns a [`Decision`]:
//!
//! - `Continue`: ask the next handler
//! - `Throw(error)`: fail with a replacement error
//! - `Rethrow`: fail with the original error
//!
//! When every handler continues, the original error is returned.
//!
//! A cancellation caused by the supplied token actually being canceled skips
//! the handlers. Foreground categories return it; `Action` and `Trigger`
//! swallow it as an expected shutdown.

use super::error::MachineError;
use crate::core::{BoxError, Fault};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Callback site categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Entry,
    Exit,
    StateChange,
    Activate,
    Deactivate,
    Condition,
    Map,
    Action,
    Trigger,
}

impl Category {
    /// Whether a real cancellation is treated as a normal shutdown.
    pub fn suppresses_cancellation(&self) -> bool {
        matches!(self, Self::Action | Self::Trigger)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
            Self::StateChange => "state-change",
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
            Self::Condition => "condition",
            Self::Map => "map",
            Self::Action => "action",
            Self::Trigger => "trigger",
        };
        f.write_str(name)
    }
}

/// What a handler wants done with a failure.
#[derive(Debug)]
pub enum Decision {
    Continue,
    Throw(BoxError),
    Rethrow,
}

/// Inspects callback failures.
pub trait ExceptionHandler: Send + Sync {
    fn handle(&self, category: Category, fault: &Fault) -> Decision;
}

impl<F> ExceptionHandler for F
where
    F: Fn(Category, &Fault) -> Decision + Send + Sync,
{
    fn handle(&self, category: Category, fault: &Fault) -> Decision {
        self(category, fault)
    }
}

/// Ordered list of exception handlers.
///
/// # Example
///
/// ```rust
/// use stagehand::core::Fault;
/// use stagehand::effects::{Category, Decision, ExceptionPolicy};
///
/// let policy = ExceptionPolicy::new().with_handler(|category: Category, _: &Fault| {
///     if category == Category::Map {
///         Decision::Throw("mapping rejected".into())
///     } else {
///         Decision::Continue
///     }
/// });
/// assert_eq!(policy.len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct ExceptionPolicy {
    handlers: Vec<Arc<dyn ExceptionHandler>>,
}

impl ExceptionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler<H: ExceptionHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn push<H: ExceptionHandler + 'static>(&mut self, handler: H) {
        self.handlers.push(Arc::new(handler));
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Decide the fate of a failure. `None` means it was absorbed.
    pub fn intercept(
        &self,
        category: Category,
        token: &CancellationToken,
        fault: Fault,
    ) -> Option<Fault> {
        if fault.is_canceled() && token.is_cancelled() {
            if category.suppresses_cancellation() {
                tracing::debug!(%category, "cancellation absorbed");
                return None;
            }
            return Some(fault);
        }

        for handler in &self.handlers {
            match handler.handle(category, &fault) {
                Decision::Continue => continue,
                Decision::Throw(replacement) => {
                    tracing::debug!(%category, original = %fault, "exception replaced");
                    return Some(Fault::Failed(replacement));
                }
                Decision::Rethrow => return Some(fault),
            }
        }
        Some(fault)
    }

    /// Run a foreground callback.
    pub async fn invoke<T, Fut>(
        &self,
        category: Category,
        token: &CancellationToken,
        callback: Fut,
    ) -> Result<T, MachineError>
    where
        Fut: Future<Output = Result<T, Fault>>,
    {
        match callback.await {
            Ok(value) => Ok(value),
            Err(fault) => Err(match self.intercept(category, token, fault) {
                Some(fault) => MachineError::from_fault(category, fault),
                None => MachineError::Canceled,
            }),
        }
    }

    /// Run a background callback whose cancellation may be absorbed.
    pub async fn supervise<Fut>(
        &self,
        category: Category,
        token: &CancellationToken,
        callback: Fut,
    ) -> Result<(), MachineError>
    where
        Fut: Future<Output = Result<(), Fault>>,
    {
        match callback.await {
            Ok(()) => Ok(()),
            Err(fault) => match self.intercept(category, token, fault) {
                Some(fault) => Err(MachineError::from_fault(category, fault)),
                None => Ok(()),
            },
        }
    }
}

impl fmt::Debug for ExceptionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionPolicy")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
