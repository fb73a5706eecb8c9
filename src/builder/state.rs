//! Builder for state declarations.

use crate::core::{
    handler, Fault, Handler, ParamTuple, ParamType, StateContext, StateHandlers, StateId,
};
use std::future::Future;

/// Declares one state: its identity plus optional lifecycle callbacks.
///
/// # Example
///
/// ```rust
/// use stagehand::builder::StateSpec;
///
/// let busy = StateSpec::of::<(u32,)>("Busy")
///     .on_entry(|ctx| async move {
///         let job: u32 = ctx.parameters.get_as(0)?;
///         assert!(job > 0);
///         Ok::<_, stagehand::core::Fault>(())
///     })
///     .action(|ctx| async move {
///         ctx.token.cancelled().await;
///         Ok(())
///     });
///
/// assert_eq!(busy.id().to_string(), "Busy(u32)");
/// ```
#[derive(Clone)]
pub struct StateSpec {
    pub(crate) id: StateId,
    pub(crate) handlers: StateHandlers,
}

impl StateSpec {
    /// A state without parameters.
    pub fn new(label: impl Into<String>) -> Self {
        Self::from_id(StateId::new(label))
    }

    /// A state whose payload has the shape of the tuple `T`.
    pub fn of<T: ParamTuple>(label: impl Into<String>) -> Self {
        Self::from_id(StateId::of::<T>(label))
    }

    pub fn with_signature(label: impl Into<String>, signature: Vec<ParamType>) -> Self {
        Self::from_id(StateId::with_signature(label, signature))
    }

    fn from_id(id: StateId) -> Self {
        Self {
            id,
            handlers: StateHandlers::default(),
        }
    }

    pub fn id(&self) -> &StateId {
        &self.id
    }

    /// Run when a transition enters this state.
    pub fn on_entry<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(StateContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Fault>> + Send + 'static,
    {
        self.handlers.on_entry = Some(handler(f));
        self
    }

    /// Run when a transition or deactivation leaves this state.
    pub fn on_exit<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(StateContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Fault>> + Send + 'static,
    {
        self.handlers.on_exit = Some(handler(f));
        self
    }

    /// Run when the machine activates into this state.
    pub fn on_activate<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(StateContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Fault>> + Send + 'static,
    {
        self.handlers.on_activate = Some(handler(f));
        self
    }

    /// Run when the machine deactivates while in this state.
    pub fn on_deactivate<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(StateContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Fault>> + Send + 'static,
    {
        self.handlers.on_deactivate = Some(handler(f));
        self
    }

    /// Long-running work owned by this state.
    ///
    /// The action's token is canceled when the state is left.
    pub fn action<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(StateContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Fault>> + Send + 'static,
    {
        self.handlers.action = Some(handler(f));
        self
    }

    /// Install a pre-boxed action.
    pub fn action_handler(mut self, action: Handler<StateContext>) -> Self {
        self.handlers.action = Some(action);
        self
    }
}

impl std::fmt::Debug for StateSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSpec").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_carries_signature() {
        let spec = StateSpec::of::<(i32, String)>("Busy");

        assert_eq!(spec.id().label(), "Busy");
        assert_eq!(
            spec.id().signature(),
            &[ParamType::of::<i32>(), ParamType::of::<String>()]
        );
    }

    #[test]
    fn handlers_are_recorded() {
        let spec = StateSpec::new("Idle")
            .on_entry(|_| async { Ok(()) })
            .on_deactivate(|_| async { Ok(()) });

        assert!(spec.handlers.on_entry.is_some());
        assert!(spec.handlers.on_deactivate.is_some());
        assert!(spec.handlers.on_exit.is_none());
        assert!(spec.handlers.action.is_none());
    }
}
