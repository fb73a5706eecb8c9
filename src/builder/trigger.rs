//! Builder for triggers.

use crate::core::{handler, Fault, Handler};
use crate::effects::{Awaited, Signal, TriggerContext, TriggerDef, TriggerMode};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Declares a background trigger: `once()`/`repeat()`, what to await, and
/// the callback to invoke.
///
/// # Example
///
/// ```rust
/// use stagehand::builder::TriggerSpec;
/// use stagehand::effects::Signal;
///
/// let paid = Signal::new();
/// let trigger = TriggerSpec::once()
///     .await_signal(&paid)
///     .then_invoke(|ctx| async move {
///         ctx.machine.transition("ship", &ctx.token).await?;
///         Ok::<_, stagehand::core::Fault>(())
///     });
/// ```
#[derive(Clone)]
pub struct TriggerSpec {
    mode: TriggerMode,
    awaited: Option<Awaited>,
    callback: Option<Handler<TriggerContext>>,
}

impl TriggerSpec {
    /// Fire at most once per activation.
    pub fn once() -> Self {
        Self::with_mode(TriggerMode::Once)
    }

    /// Fire every time the awaited event happens.
    pub fn repeat() -> Self {
        Self::with_mode(TriggerMode::Repeat)
    }

    fn with_mode(mode: TriggerMode) -> Self {
        Self {
            mode,
            awaited: None,
            callback: None,
        }
    }

    pub fn mode(&self) -> TriggerMode {
        self.mode
    }

    /// Wait for `signal` to be fired.
    pub fn await_signal(mut self, signal: &Signal) -> Self {
        self.awaited = Some(Awaited::Signal(signal.clone()));
        self
    }

    /// Wait for a custom async event. Returning an error stops the trigger.
    pub fn await_fn<F, Fut>(mut self, wait: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Fault>> + Send + 'static,
    {
        self.awaited = Some(Awaited::custom(wait));
        self
    }

    /// Callback invoked each time the trigger fires.
    ///
    /// Pass the context token to machine calls: it is canceled when the
    /// machine deactivates, which releases a callback waiting on the machine.
    pub fn then_invoke<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(TriggerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Fault>> + Send + 'static,
    {
        self.callback = Some(handler(f));
        self
    }

    /// `None` until both the awaited event and the callback are set.
    pub(crate) fn build(self) -> Option<TriggerDef> {
        Some(TriggerDef {
            mode: self.mode,
            awaited: self.awaited?,
            callback: self.callback?,
        })
    }
}

impl std::fmt::Debug for TriggerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerSpec")
            .field("mode", &self.mode)
            .field("awaited", &self.awaited.is_some())
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_triggers_do_not_build() {
        let signal = Signal::new();

        assert!(TriggerSpec::once().build().is_none());
        assert!(TriggerSpec::once().await_signal(&signal).build().is_none());
        assert!(TriggerSpec::repeat()
            .then_invoke(|_| async { Ok(()) })
            .build()
            .is_none());
    }

    #[test]
    fn complete_trigger_keeps_mode() {
        let trigger = TriggerSpec::repeat()
            .await_fn(|token: CancellationToken| async move {
                token.cancelled().await;
                Ok(())
            })
            .then_invoke(|_| async { Ok(()) })
            .build();

        assert_eq!(trigger.map(|def| def.mode), Some(TriggerMode::Repeat));
    }
}
