//! Validated state and transition tables.
//!
//! Tables are only produced by the builder after validation, so lookups never
//! report configuration problems. Transitions refer to states by index into
//! the state table; the index of a transition's target is resolved once,
//! when the machine is built.

use super::context::{Handler, StateContext};
use super::guard::Guard;
use super::mapping::Mapping;
use super::params::{signature_accepts, ParamType};
use super::state::StateId;

/// Callbacks attached to one state.
#[derive(Clone, Default)]
pub struct StateHandlers {
    pub on_entry: Option<Handler<StateContext>>,
    pub on_exit: Option<Handler<StateContext>>,
    pub on_activate: Option<Handler<StateContext>>,
    pub on_deactivate: Option<Handler<StateContext>>,
    /// Long-running background action.
    pub action: Option<Handler<StateContext>>,
}

/// A configured state.
#[derive(Clone)]
pub struct StateDef {
    pub id: StateId,
    pub handlers: StateHandlers,
}

/// A configured transition with its target resolved.
#[derive(Clone, Debug)]
pub struct TransitionDef {
    /// Index of the source state.
    pub source: usize,
    pub label: String,
    /// Types needed to invoke the transition.
    pub arguments: Vec<ParamType>,
    pub guard: Option<Guard>,
    /// Index of the target state.
    pub target: usize,
    pub mapping: Option<Mapping>,
}

impl TransitionDef {
    pub fn is_unconditional(&self) -> bool {
        self.guard.is_none()
    }
}

/// States in declaration order.
#[derive(Clone, Default)]
pub struct StateTable {
    states: Vec<StateDef>,
}

impl StateTable {
    pub fn new(states: Vec<StateDef>) -> Self {
        Self { states }
    }

    /// First state whose identity accepts `label` with `signature`.
    pub fn lookup(&self, label: &str, signature: &[ParamType]) -> Option<usize> {
        self.states
            .iter()
            .position(|state| state.id.accepts(label, signature))
    }

    /// Index of the state with exactly this identity.
    pub fn position(&self, id: &StateId) -> Option<usize> {
        self.states.iter().position(|state| &state.id == id)
    }

    pub fn get(&self, index: usize) -> Option<&StateDef> {
        self.states.get(index)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StateDef> {
        self.states.iter()
    }
}

impl std::ops::Index<usize> for StateTable {
    type Output = StateDef;

    fn index(&self, index: usize) -> &StateDef {
        &self.states[index]
    }
}

/// Transitions in declaration order.
#[derive(Clone, Debug, Default)]
pub struct TransitionTable {
    transitions: Vec<TransitionDef>,
}

impl TransitionTable {
    pub fn new(transitions: Vec<TransitionDef>) -> Self {
        Self { transitions }
    }

    /// Transitions leaving `source` under `label` that accept `arguments`,
    /// in declaration order. Guards are not evaluated here.
    pub fn candidates<'t: 'q, 'q>(
        &'t self,
        source: usize,
        label: &'q str,
        arguments: &'q [ParamType],
    ) -> impl Iterator<Item = &'t TransitionDef> + 'q {
        self.transitions.iter().filter(move |t| {
            t.source == source && t.label == label && signature_accepts(&t.arguments, arguments)
        })
    }

    /// Every transition leaving `source`, in declaration order.
    pub fn from_state(&self, source: usize) -> impl Iterator<Item = &TransitionDef> {
        self.transitions.iter().filter(move |t| t.source == source)
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}
