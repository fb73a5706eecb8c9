//! Core state machine types.
//!
//! This module contains the synchronous, side-effect free part of the engine:
//! - Typed parameters and the previous/current/next slot transaction
//! - State identity and the validated state and transition tables
//! - Guard predicates and mapping transforms
//! - Immutable transition history
//!
//! Nothing here spawns tasks or holds locks; the async runtime lives in
//! [`crate::effects`].

mod context;
mod guard;
mod history;
mod mapping;
mod params;
mod state;
mod table;

pub use context::{
    handler, BoxError, BoxFuture, Fault, GuardContext, Handler, MapInput, StateChange,
    StateContext,
};
pub use guard::Guard;
pub use history::{StateHistory, StateRecord, StateTransition};
pub use mapping::{Mapping, MappingOutput};
pub use params::{
    signature_accepts, ParamError, ParamTuple, ParamType, ParameterSlots, Params, SlotKind, Value,
    MAX_PARAMS,
};
pub use state::StateId;
pub use table::{StateDef, StateHandlers, StateTable, TransitionDef, TransitionTable};
