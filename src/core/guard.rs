//! Guard predicates for controlling state transitions.
//!
//! Guards decide whether a transition may fire. Among transitions sharing a
//! label they are evaluated in declaration order and the first guard that
//! passes wins. A guard may be a plain predicate or an async function that
//! reads ambient data.

use super::context::{BoxFuture, Fault, GuardContext};
use std::future::Future;
use std::sync::Arc;

type Verdict = Result<bool, Fault>;
type Predicate = Arc<dyn Fn(GuardContext) -> BoxFuture<'static, Verdict> + Send + Sync>;

/// Predicate that determines if a transition can execute.
///
/// # Example
///
/// ```rust
/// use stagehand::core::{Guard, GuardContext, ParamTuple, StateId};
/// use tokio_util::sync::CancellationToken;
///
/// let positive = Guard::new(|ctx: &GuardContext| {
///     ctx.arguments.get_as::<i32>(0).map(|n| n > 0).unwrap_or(false)
/// });
///
/// let ctx = GuardContext {
///     state: StateId::new("Idle"),
///     parameters: ().into_params(),
///     arguments: (5,).into_params(),
///     token: CancellationToken::new(),
/// };
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// assert!(positive.check(ctx).await.unwrap());
/// # });
/// ```
#[derive(Clone)]
pub struct Guard {
    predicate: Predicate,
}

impl Guard {
    /// Create a guard from a synchronous predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&GuardContext) -> bool + Send + Sync + 'static,
    {
        Guard {
            predicate: Arc::new(move |ctx: GuardContext| -> BoxFuture<'static, Verdict> {
                let passed = predicate(&ctx);
                Box::pin(async move { Ok(passed) })
            }),
        }
    }

    /// Create a guard from an async function that may fail.
    pub fn from_async<F, Fut>(predicate: F) -> Self
    where
        F: Fn(GuardContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, Fault>> + Send + 'static,
    {
        Guard {
            predicate: Arc::new(move |ctx: GuardContext| -> BoxFuture<'static, Verdict> {
                Box::pin(predicate(ctx))
            }),
        }
    }

    /// Evaluate the guard.
    pub fn check(&self, ctx: GuardContext) -> BoxFuture<'static, Result<bool, Fault>> {
        (self.predicate)(ctx)
    }
}

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Guard")
    }
}
