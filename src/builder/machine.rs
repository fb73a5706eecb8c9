//! Builder for constructing state machines.

use crate::builder::error::BuildError;
use crate::builder::state::StateSpec;
use crate::builder::transition::TransitionSpec;
use crate::builder::trigger::TriggerSpec;
use crate::builder::validate::compile;
use crate::core::{handler, Fault, Handler, ParamTuple, Params, StateChange, StateId};
use crate::effects::{
    ActionDiscipline, ExceptionHandler, ExceptionPolicy, MachineParts, StateMachine,
};
use std::future::Future;

/// Transitions a machine keeps in its history unless configured otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

/// Builder for constructing state machines with a fluent API.
///
/// The builder only collects configuration. [`build`](Self::build) runs the
/// validator and hands the resolved tables to the runtime.
///
/// # Example
///
/// ```rust
/// use stagehand::builder::{MachineBuilder, StateSpec, TransitionSpec};
/// use stagehand::core::StateId;
///
/// let machine = MachineBuilder::new()
///     .initial("Idle", ())
///     .state(StateSpec::new("Idle"))
///     .state(StateSpec::of::<(u32,)>("Busy"))
///     .transition(
///         TransitionSpec::new(StateId::new("Idle"), "start")
///             .with_arguments::<(u32,)>()
///             .to("Busy"),
///     )
///     .transition(TransitionSpec::new(StateId::of::<(u32,)>("Busy"), "finish").to("Idle"))
///     .build()
///     .unwrap();
///
/// assert!(!machine.is_activated());
/// ```
pub struct MachineBuilder {
    initial: Option<(String, Params)>,
    states: Vec<StateSpec>,
    transitions: Vec<TransitionSpec>,
    triggers: Vec<TriggerSpec>,
    on_state_change: Option<Handler<StateChange>>,
    discipline: ActionDiscipline,
    policy: ExceptionPolicy,
    history_limit: Option<usize>,
}

impl MachineBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            initial: None,
            states: Vec::new(),
            transitions: Vec::new(),
            triggers: Vec::new(),
            on_state_change: None,
            discipline: ActionDiscipline::default(),
            policy: ExceptionPolicy::new(),
            history_limit: Some(DEFAULT_HISTORY_LIMIT),
        }
    }

    /// Set the initial state and its payload (required).
    pub fn initial<P: ParamTuple>(self, label: impl Into<String>, parameters: P) -> Self {
        self.initial_params(label, parameters.into_params())
    }

    /// Set the initial state with an already built payload.
    pub fn initial_params(mut self, label: impl Into<String>, parameters: Params) -> Self {
        self.initial = Some((label.into(), parameters));
        self
    }

    pub fn state(mut self, state: StateSpec) -> Self {
        self.states.push(state);
        self
    }

    /// Add multiple states at once.
    pub fn states(mut self, states: impl IntoIterator<Item = StateSpec>) -> Self {
        self.states.extend(states);
        self
    }

    pub fn transition(mut self, transition: TransitionSpec) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Add multiple transitions at once.
    pub fn transitions(mut self, transitions: impl IntoIterator<Item = TransitionSpec>) -> Self {
        self.transitions.extend(transitions);
        self
    }

    pub fn trigger(mut self, trigger: TriggerSpec) -> Self {
        self.triggers.push(trigger);
        self
    }

    /// Observe every state change, including the initial entry.
    pub fn on_state_change<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(StateChange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Fault>> + Send + 'static,
    {
        self.on_state_change = Some(handler(f));
        self
    }

    pub fn discipline(mut self, discipline: ActionDiscipline) -> Self {
        self.discipline = discipline;
        self
    }

    /// Shorthand for `.discipline(ActionDiscipline::Detached)`.
    pub fn detached_actions(self) -> Self {
        self.discipline(ActionDiscipline::Detached)
    }

    /// Append an exception handler. Handlers are consulted in the order added.
    pub fn exception_handler<H: ExceptionHandler + 'static>(mut self, handler: H) -> Self {
        self.policy.push(handler);
        self
    }

    /// Replace the whole exception policy.
    pub fn exception_policy(mut self, policy: ExceptionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Keep at most `limit` transitions in the machine's history.
    pub fn history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit);
        self
    }

    /// Keep every transition in the machine's history.
    pub fn unbounded_history(mut self) -> Self {
        self.history_limit = None;
        self
    }

    /// Validate the configuration and build the machine.
    pub fn build(self) -> Result<StateMachine, BuildError> {
        let (label, initial_parameters) = self.initial.ok_or(BuildError::MissingInitialState)?;

        let triggers = self
            .triggers
            .into_iter()
            .enumerate()
            .map(|(index, spec)| spec.build().ok_or(BuildError::IncompleteTrigger { index }))
            .collect::<Result<Vec<_>, _>>()?;

        let initial = StateId::with_signature(label, initial_parameters.signature());
        let compiled = compile(self.states, self.transitions, &initial)?;

        let machine = StateMachine::new(MachineParts {
            states: compiled.states,
            transitions: compiled.transitions,
            initial: compiled.initial,
            initial_parameters,
            on_state_change: self.on_state_change,
            discipline: self.discipline,
            policy: self.policy,
            triggers,
            history_limit: self.history_limit,
        });
        tracing::debug!(machine = %machine.id(), initial = %initial, "machine built");
        Ok(machine)
    }
}

impl Default for MachineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
