//! The lifecycle orchestrator.
//!
//! [`StateMachine`] is a cheap, cloneable handle. Protocol operations
//! (`activate`, `deactivate` and the transition family) are serialized by
//! one async lock held for the whole operation. Observers read a separate
//! snapshot that is never held across an await, so callbacks and background
//! tasks can inspect the machine while a transition is in flight.

use super::action::{ActionDiscipline, ActionStatus, ActionSupervisor};
use super::error::MachineError;
use super::mapping::next_parameters;
use super::policy::{Category, ExceptionPolicy};
use super::trigger::{TriggerDef, TriggerSet};
use crate::core::{
    GuardContext, Handler, ParamTuple, ParameterSlots, Params, StateChange, StateContext, StateDef,
    StateHistory, StateId, StateTable, StateTransition, TransitionDef, TransitionTable,
};
use chrono::Utc;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Internal lifecycle of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Inactive,
    Entering,
    Active,
    /// Transient, while a failed transition is rolled back.
    Recovery,
}

impl Lifecycle {
    pub fn is_activated(&self) -> bool {
        !matches!(self, Self::Inactive)
    }

    pub fn can_accept_transition(&self) -> bool {
        matches!(self, Self::Active | Self::Recovery | Self::Entering)
    }
}

/// Everything a machine is assembled from, after validation.
pub(crate) struct MachineParts {
    pub(crate) states: StateTable,
    pub(crate) transitions: TransitionTable,
    pub(crate) initial: usize,
    pub(crate) initial_parameters: Params,
    pub(crate) on_state_change: Option<Handler<StateChange>>,
    pub(crate) discipline: ActionDiscipline,
    pub(crate) policy: ExceptionPolicy,
    pub(crate) triggers: Vec<TriggerDef>,
    pub(crate) history_limit: Option<usize>,
}

struct Runtime {
    scope: CancellationToken,
    actions: ActionSupervisor,
    triggers: TriggerSet,
}

struct Snapshot {
    lifecycle: Lifecycle,
    current: Option<usize>,
    previous: Option<usize>,
    next: Option<usize>,
    slots: ParameterSlots,
    history: StateHistory,
}

struct Inner {
    id: Uuid,
    states: StateTable,
    transitions: TransitionTable,
    initial: usize,
    initial_parameters: Params,
    on_state_change: Option<Handler<StateChange>>,
    policy: Arc<ExceptionPolicy>,
    fires: Vec<Arc<AtomicUsize>>,
    action: ActionStatus,
    protocol: tokio::sync::Mutex<Runtime>,
    snapshot: Mutex<Snapshot>,
}

/// How a transition request reacts to "nothing matches".
#[derive(Clone, Copy, PartialEq, Eq)]
enum Attempt {
    /// Fail with `NoMatchingTransition`.
    Strict,
    /// Report `false`.
    Try,
    /// Resolve only, never apply.
    Probe,
}

/// A running hierarchical state machine.
///
/// Built with [`MachineBuilder`](crate::builder::MachineBuilder).
#[derive(Clone)]
pub struct StateMachine {
    inner: Arc<Inner>,
}

/// Non-owning handle held by background triggers.
#[derive(Clone)]
pub struct WeakMachine(Weak<Inner>);

impl WeakMachine {
    pub fn upgrade(&self) -> Option<StateMachine> {
        self.0.upgrade().map(|inner| StateMachine { inner })
    }
}

impl StateMachine {
    pub(crate) fn new(parts: MachineParts) -> Self {
        let id = Uuid::new_v4();
        let policy = Arc::new(parts.policy);
        let fires: Vec<Arc<AtomicUsize>> = parts
            .triggers
            .iter()
            .map(|_| Arc::new(AtomicUsize::new(0)))
            .collect();

        let actions = ActionSupervisor::new(id, parts.discipline, Arc::clone(&policy));
        let action = actions.status();
        let runtime = Runtime {
            scope: CancellationToken::new(),
            actions,
            triggers: TriggerSet::new(id, parts.triggers, fires.clone()),
        };
        let history = match parts.history_limit {
            Some(limit) => StateHistory::with_limit(limit),
            None => StateHistory::new(),
        };

        Self {
            inner: Arc::new(Inner {
                id,
                states: parts.states,
                transitions: parts.transitions,
                initial: parts.initial,
                initial_parameters: parts.initial_parameters,
                on_state_change: parts.on_state_change,
                policy,
                fires,
                action,
                protocol: tokio::sync::Mutex::new(runtime),
                snapshot: Mutex::new(Snapshot {
                    lifecycle: Lifecycle::Inactive,
                    current: None,
                    previous: None,
                    next: None,
                    slots: ParameterSlots::new(),
                    history,
                }),
            }),
        }
    }

    /// Instance id, included in every log event.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn downgrade(&self) -> WeakMachine {
        WeakMachine(Arc::downgrade(&self.inner))
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.snapshot().lifecycle
    }

    pub fn is_activated(&self) -> bool {
        self.lifecycle().is_activated()
    }

    pub fn can_accept_transition(&self) -> bool {
        self.lifecycle().can_accept_transition()
    }

    pub fn current_state(&self) -> Option<StateId> {
        let current = self.snapshot().current;
        current.map(|index| self.state(index).id.clone())
    }

    pub fn previous_state(&self) -> Option<StateId> {
        let previous = self.snapshot().previous;
        previous.map(|index| self.state(index).id.clone())
    }

    /// Target of the transition in flight, if any.
    pub fn next_state(&self) -> Option<StateId> {
        let next = self.snapshot().next;
        next.map(|index| self.state(index).id.clone())
    }

    /// Payload of the current state.
    pub fn current_parameters(&self) -> Result<Params, MachineError> {
        Ok(self.snapshot().slots.current()?.clone())
    }

    /// First value of the current payload.
    pub fn current_parameter<T: Any + Clone>(&self) -> Result<T, MachineError> {
        Ok(self.snapshot().slots.current()?.get_as(0)?)
    }

    /// Payload of the state being left. Only set while a transition is in flight.
    pub fn previous_parameters(&self) -> Result<Params, MachineError> {
        Ok(self.snapshot().slots.previous()?.clone())
    }

    pub fn previous_parameter<T: Any + Clone>(&self) -> Result<T, MachineError> {
        Ok(self.snapshot().slots.previous()?.get_as(0)?)
    }

    pub fn history(&self) -> StateHistory {
        self.snapshot().history.clone()
    }

    /// Fire counts of the configured triggers, in declaration order.
    pub fn trigger_fire_counts(&self) -> Vec<usize> {
        self.inner
            .fires
            .iter()
            .map(|fires| fires.load(Ordering::SeqCst))
            .collect()
    }

    /// Enter the initial state and start triggers.
    ///
    /// A failing coupled action of the initial state is returned as an error,
    /// but like a failing action after a committed transition it does not
    /// undo anything: the machine stays active with triggers running, and
    /// [`deactivate`](Self::deactivate) is the way back to `Inactive`.
    pub async fn activate(&self, token: &CancellationToken) -> Result<(), MachineError> {
        let mut runtime = self.lock_protocol(token).await?;
        let runtime = &mut *runtime;
        {
            let mut snapshot = self.snapshot();
            if snapshot.lifecycle.is_activated() {
                return Err(MachineError::AlreadyActivated);
            }
            snapshot.lifecycle = Lifecycle::Entering;
            snapshot.slots.clear();
            snapshot.slots.begin_transition();
            snapshot.slots.set_next(self.inner.initial_parameters.clone());
            snapshot.next = Some(self.inner.initial);
        }
        runtime.scope = CancellationToken::new();

        let state = self.state(self.inner.initial);
        let parameters = self.inner.initial_parameters.clone();
        if let Err(error) = self.enter_initial(state, &parameters, token).await {
            {
                let mut snapshot = self.snapshot();
                snapshot.slots.clear();
                snapshot.next = None;
                snapshot.lifecycle = Lifecycle::Inactive;
            }
            runtime.scope.cancel();
            tracing::warn!(
                machine = %self.inner.id,
                state = %state.id,
                %error,
                "activation failed"
            );
            return Err(error);
        }

        {
            let mut snapshot = self.snapshot();
            snapshot.slots.commit_transition();
            snapshot.current = Some(self.inner.initial);
            snapshot.previous = None;
            snapshot.next = None;
            snapshot.history.push(StateTransition {
                from: None,
                to: (&state.id).into(),
                label: None,
                timestamp: Utc::now(),
            });
        }

        let action = runtime
            .actions
            .start(
                state.handlers.action.as_ref(),
                &state.id,
                parameters,
                &runtime.scope,
                token,
            )
            .await;

        self.snapshot().lifecycle = Lifecycle::Active;
        runtime
            .triggers
            .start(self.downgrade(), &runtime.scope, &self.inner.policy);
        tracing::info!(machine = %self.inner.id, state = %state.id, "machine activated");
        action
    }

    /// Stop triggers and the current action, leave the current state.
    pub async fn deactivate(&self, token: &CancellationToken) -> Result<(), MachineError> {
        let mut runtime = self.lock_protocol(token).await?;
        let runtime = &mut *runtime;
        let (current, parameters) = {
            let snapshot = self.snapshot();
            if !snapshot.lifecycle.is_activated() {
                return Err(MachineError::NotActivated);
            }
            (
                snapshot.current,
                snapshot.slots.current().cloned().unwrap_or_default(),
            )
        };

        runtime.triggers.stop().await;
        runtime.actions.stop(true).await;

        let mut outcome = Ok(());
        if let Some(index) = current {
            let state = self.state(index);
            let ctx = StateContext {
                state: state.id.clone(),
                parameters,
                token: token.clone(),
            };
            let exit = self
                .run_handler(Category::Exit, state.handlers.on_exit.as_ref(), ctx.clone(), token)
                .await;
            let deactivate = self
                .run_handler(
                    Category::Deactivate,
                    state.handlers.on_deactivate.as_ref(),
                    ctx,
                    token,
                )
                .await;
            outcome = exit.and(deactivate);
        }

        runtime.scope.cancel();
        {
            let mut snapshot = self.snapshot();
            snapshot.slots.clear();
            snapshot.current = None;
            snapshot.previous = None;
            snapshot.next = None;
            snapshot.lifecycle = Lifecycle::Inactive;
        }
        tracing::info!(machine = %self.inner.id, "machine deactivated");
        outcome
    }

    /// Fire the transition `label` without arguments.
    pub async fn transition(
        &self,
        label: &str,
        token: &CancellationToken,
    ) -> Result<(), MachineError> {
        self.execute(label, Params::new(), token, Attempt::Strict)
            .await
            .map(|_| ())
    }

    /// Fire the transition `label` with arguments.
    pub async fn transition_with<A: ParamTuple>(
        &self,
        label: &str,
        arguments: A,
        token: &CancellationToken,
    ) -> Result<(), MachineError> {
        self.execute(label, arguments.into_params(), token, Attempt::Strict)
            .await
            .map(|_| ())
    }

    /// Like [`transition`](Self::transition), returning `false` when nothing matches.
    pub async fn try_transition(
        &self,
        label: &str,
        token: &CancellationToken,
    ) -> Result<bool, MachineError> {
        self.execute(label, Params::new(), token, Attempt::Try).await
    }

    pub async fn try_transition_with<A: ParamTuple>(
        &self,
        label: &str,
        arguments: A,
        token: &CancellationToken,
    ) -> Result<bool, MachineError> {
        self.execute(label, arguments.into_params(), token, Attempt::Try)
            .await
    }

    /// Whether `label` would fire now. Guards run; nothing else does.
    pub async fn can_transition(
        &self,
        label: &str,
        token: &CancellationToken,
    ) -> Result<bool, MachineError> {
        self.execute(label, Params::new(), token, Attempt::Probe).await
    }

    pub async fn can_transition_with<A: ParamTuple>(
        &self,
        label: &str,
        arguments: A,
        token: &CancellationToken,
    ) -> Result<bool, MachineError> {
        self.execute(label, arguments.into_params(), token, Attempt::Probe)
            .await
    }

    /// Whether a detached action is still running for the current state.
    ///
    /// Never waits for an operation in flight.
    pub fn has_running_action(&self) -> bool {
        self.inner.action.is_running()
    }

    async fn execute(
        &self,
        label: &str,
        arguments: Params,
        token: &CancellationToken,
        attempt: Attempt,
    ) -> Result<bool, MachineError> {
        let mut runtime = self.lock_protocol(token).await?;
        let source = {
            let snapshot = self.snapshot();
            if !snapshot.lifecycle.can_accept_transition() {
                return Err(MachineError::NotActivated);
            }
            snapshot.current.ok_or(MachineError::NotActivated)?
        };

        let Some(transition) = self.resolve(source, label, &arguments, token).await? else {
            tracing::debug!(
                machine = %self.inner.id,
                state = %self.state(source).id,
                label,
                "no matching transition"
            );
            return match attempt {
                Attempt::Strict => Err(MachineError::NoMatchingTransition {
                    state: self.state(source).id.to_string(),
                    label: label.to_string(),
                }),
                Attempt::Try | Attempt::Probe => Ok(false),
            };
        };
        if attempt == Attempt::Probe {
            return Ok(true);
        }

        self.apply(&mut runtime, transition, arguments, token).await?;
        Ok(true)
    }

    /// First transition from `source` whose types match and whose guard passes.
    async fn resolve(
        &self,
        source: usize,
        label: &str,
        arguments: &Params,
        token: &CancellationToken,
    ) -> Result<Option<&TransitionDef>, MachineError> {
        let state = &self.state(source).id;
        let signature = arguments.signature();
        let parameters = self
            .snapshot()
            .slots
            .current()
            .cloned()
            .unwrap_or_default();

        for candidate in self.inner.transitions.candidates(source, label, &signature) {
            let Some(guard) = &candidate.guard else {
                return Ok(Some(candidate));
            };
            let ctx = GuardContext {
                state: state.clone(),
                parameters: parameters.clone(),
                arguments: arguments.clone(),
                token: token.clone(),
            };
            if self
                .inner
                .policy
                .invoke(Category::Condition, token, guard.check(ctx))
                .await?
            {
                return Ok(Some(candidate));
            }
            tracing::debug!(
                machine = %self.inner.id,
                state = %state,
                label,
                "guard rejected transition"
            );
        }
        Ok(None)
    }

    async fn apply(
        &self,
        runtime: &mut Runtime,
        transition: &TransitionDef,
        arguments: Params,
        token: &CancellationToken,
    ) -> Result<(), MachineError> {
        let source = self.state(transition.source);
        let target = self.state(transition.target);

        let previous = {
            let mut snapshot = self.snapshot();
            snapshot.slots.begin_transition();
            snapshot.next = Some(transition.target);
            snapshot.slots.previous().cloned().unwrap_or_default()
        };

        let wait = runtime.actions.discipline() == ActionDiscipline::Coupled;
        runtime.actions.stop(wait).await;

        match self
            .cross(transition, source, target, previous.clone(), arguments, token)
            .await
        {
            Ok(parameters) => {
                {
                    let mut snapshot = self.snapshot();
                    snapshot.slots.commit_transition();
                    snapshot.previous = Some(transition.source);
                    snapshot.current = Some(transition.target);
                    snapshot.next = None;
                    snapshot.history.push(StateTransition {
                        from: Some((&source.id).into()),
                        to: (&target.id).into(),
                        label: Some(transition.label.clone()),
                        timestamp: Utc::now(),
                    });
                }
                tracing::info!(
                    machine = %self.inner.id,
                    from = %source.id,
                    to = %target.id,
                    label = %transition.label,
                    "transition applied"
                );
                runtime
                    .actions
                    .start(
                        target.handlers.action.as_ref(),
                        &target.id,
                        parameters,
                        &runtime.scope,
                        token,
                    )
                    .await
            }
            Err(error) => {
                {
                    let mut snapshot = self.snapshot();
                    snapshot.lifecycle = Lifecycle::Recovery;
                    snapshot.slots.rollback_transition();
                    snapshot.next = None;
                }
                tracing::warn!(
                    machine = %self.inner.id,
                    from = %source.id,
                    label = %transition.label,
                    %error,
                    "transition rolled back"
                );
                if runtime.actions.discipline() == ActionDiscipline::Detached {
                    // Detached starts never block and never fail.
                    let _ = runtime
                        .actions
                        .start(
                            source.handlers.action.as_ref(),
                            &source.id,
                            previous,
                            &runtime.scope,
                            token,
                        )
                        .await;
                }
                self.snapshot().lifecycle = Lifecycle::Active;
                Err(error)
            }
        }
    }

    /// Exit the source, stage the next payload, enter the target.
    async fn cross(
        &self,
        transition: &TransitionDef,
        source: &StateDef,
        target: &StateDef,
        previous: Params,
        arguments: Params,
        token: &CancellationToken,
    ) -> Result<Params, MachineError> {
        let exit = StateContext {
            state: source.id.clone(),
            parameters: previous.clone(),
            token: token.clone(),
        };
        self.run_handler(Category::Exit, source.handlers.on_exit.as_ref(), exit, token)
            .await?;

        let next = next_parameters(
            &self.inner.policy,
            transition.mapping.as_ref(),
            previous,
            arguments,
            &target.id,
            token,
        )
        .await?;
        self.snapshot().slots.set_next(next.clone());

        self.notify_state_change(
            Some(source.id.clone()),
            &target.id,
            Some(transition.label.clone()),
            &next,
            token,
        )
        .await?;

        let entry = StateContext {
            state: target.id.clone(),
            parameters: next.clone(),
            token: token.clone(),
        };
        self.run_handler(Category::Entry, target.handlers.on_entry.as_ref(), entry, token)
            .await?;
        Ok(next)
    }

    async fn enter_initial(
        &self,
        state: &StateDef,
        parameters: &Params,
        token: &CancellationToken,
    ) -> Result<(), MachineError> {
        self.notify_state_change(None, &state.id, None, parameters, token)
            .await?;

        let ctx = StateContext {
            state: state.id.clone(),
            parameters: parameters.clone(),
            token: token.clone(),
        };
        self.run_handler(
            Category::Activate,
            state.handlers.on_activate.as_ref(),
            ctx.clone(),
            token,
        )
        .await?;
        self.run_handler(Category::Entry, state.handlers.on_entry.as_ref(), ctx, token)
            .await
    }

    async fn notify_state_change(
        &self,
        from: Option<StateId>,
        to: &StateId,
        label: Option<String>,
        parameters: &Params,
        token: &CancellationToken,
    ) -> Result<(), MachineError> {
        let Some(on_state_change) = &self.inner.on_state_change else {
            return Ok(());
        };
        let change = StateChange {
            from,
            to: to.clone(),
            label,
            parameters: parameters.clone(),
            token: token.clone(),
        };
        self.inner
            .policy
            .invoke(Category::StateChange, token, on_state_change(change))
            .await
    }

    async fn run_handler(
        &self,
        category: Category,
        handler: Option<&Handler<StateContext>>,
        ctx: StateContext,
        token: &CancellationToken,
    ) -> Result<(), MachineError> {
        match handler {
            Some(handler) => self.inner.policy.invoke(category, token, handler(ctx)).await,
            None => Ok(()),
        }
    }

    /// Acquire the protocol lock, giving up if `token` is canceled first.
    async fn lock_protocol(
        &self,
        token: &CancellationToken,
    ) -> Result<tokio::sync::MutexGuard<'_, Runtime>, MachineError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(MachineError::Canceled),
            runtime = self.inner.protocol.lock() => Ok(runtime),
        }
    }

    fn snapshot(&self) -> MutexGuard<'_, Snapshot> {
        self.inner
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self, index: usize) -> &StateDef {
        // Indices come from validated tables.
        &self.inner.states[index]
    }
}

impl std::fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("id", &self.inner.id)
            .field("lifecycle", &self.lifecycle())
            .field("current", &self.current_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{StateHandlers, TransitionDef};

    fn machine() -> StateMachine {
        let states = StateTable::new(vec![
            StateDef {
                id: StateId::new("A"),
                handlers: StateHandlers::default(),
            },
            StateDef {
                id: StateId::new("B"),
                handlers: StateHandlers::default(),
            },
        ]);
        let transitions = TransitionTable::new(vec![TransitionDef {
            source: 0,
            label: "go".to_string(),
            arguments: Vec::new(),
            guard: None,
            target: 1,
            mapping: None,
        }]);
        StateMachine::new(MachineParts {
            states,
            transitions,
            initial: 0,
            initial_parameters: Params::new(),
            on_state_change: None,
            discipline: ActionDiscipline::Coupled,
            policy: ExceptionPolicy::new(),
            triggers: Vec::new(),
            history_limit: Some(2),
        })
    }

    #[test]
    fn lifecycle_flags() {
        assert!(!Lifecycle::Inactive.is_activated());
        assert!(!Lifecycle::Inactive.can_accept_transition());
        assert!(Lifecycle::Active.can_accept_transition());
        assert!(Lifecycle::Recovery.is_activated());
    }

    #[test]
    fn weak_handle_does_not_keep_machine_alive() {
        let machine = machine();
        let weak = machine.downgrade();
        assert!(weak.upgrade().is_some());

        drop(machine);
        assert!(weak.upgrade().is_none());
    }

    #[tokio::test]
    async fn can_transition_does_not_mutate() {
        let machine = machine();
        let token = CancellationToken::new();
        machine.activate(&token).await.unwrap();

        assert!(machine.can_transition("go", &token).await.unwrap());
        assert_eq!(machine.current_state(), Some(StateId::new("A")));
        assert_eq!(machine.history().transitions().len(), 1);
    }

    #[tokio::test]
    async fn history_is_capped() {
        let machine = machine();
        let token = CancellationToken::new();
        machine.activate(&token).await.unwrap();
        machine.transition("go", &token).await.unwrap();
        machine.deactivate(&token).await.unwrap();
        machine.activate(&token).await.unwrap();

        let history = machine.history();
        assert_eq!(history.limit(), Some(2));
        assert_eq!(history.transitions().len(), 2);
        assert_eq!(history.transitions()[0].label.as_deref(), Some("go"));
        assert!(history.transitions()[1].from.is_none());
    }

    #[tokio::test]
    async fn running_action_is_observable_while_locked() {
        let machine = machine();
        let token = CancellationToken::new();
        machine.activate(&token).await.unwrap();

        let _held = machine.inner.protocol.lock().await;
        assert!(!machine.has_running_action());
    }

    #[tokio::test]
    async fn canceled_token_is_rejected_before_locking() {
        let machine = machine();
        let token = CancellationToken::new();
        token.cancel();

        assert!(machine.activate(&token).await.unwrap_err().is_canceled());
        assert!(!machine.is_activated());
    }
}
