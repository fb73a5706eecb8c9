//! Stagehand: a hierarchical async state machine engine
//!
//! Stagehand keeps Stillwater's "pure core, imperative shell" split. The core
//! holds the data model (typed state payloads, state and transition tables,
//! guards, mappings, history) and does no I/O. The effects layer runs the
//! lifecycle protocol on tokio: callbacks, background actions and triggers,
//! all cooperatively cancellable.
//!
//! # Core Concepts
//!
//! - **State**: a label plus the types of its payload (0 to 4 values)
//! - **Transition**: a labeled, optionally guarded edge; plain or mapped
//! - **Atomicity**: a failed transition rolls back state and payload
//! - **Actions and Triggers**: background work scoped to a state or to the
//!   activation
//!
//! # Example
//!
//! ```rust
//! use stagehand::builder::{MachineBuilder, StateSpec, TransitionSpec};
//! use stagehand::core::{Mapping, StateId};
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test_runtime(async {
//! let machine = MachineBuilder::new()
//!     .initial("Counting", (1_u32,))
//!     .state(StateSpec::of::<(u32,)>("Counting"))
//!     .state(StateSpec::new("Done"))
//!     .transition(
//!         TransitionSpec::new(StateId::of::<(u32,)>("Counting"), "tick")
//!             .to_mapped("Counting", Mapping::typed(|(n,): (u32,)| (n + 1,))),
//!     )
//!     .transition(TransitionSpec::new(StateId::of::<(u32,)>("Counting"), "stop").to("Done"))
//!     .build()
//!     .unwrap();
//!
//! let token = CancellationToken::new();
//! machine.activate(&token).await.unwrap();
//! machine.transition("tick", &token).await.unwrap();
//! assert_eq!(machine.current_parameter::<u32>().unwrap(), 2);
//!
//! machine.transition("stop", &token).await.unwrap();
//! assert_eq!(machine.current_state(), Some(StateId::new("Done")));
//! machine.deactivate(&token).await.unwrap();
//! # });
//! # fn tokio_test_runtime(f: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Builder::new_current_thread()
//! #         .enable_all()
//! #         .build()
//! #         .unwrap()
//! #         .block_on(f)
//! # }
//! ```

pub mod builder;
pub mod core;
pub mod effects;

// Re-export commonly used types
pub use builder::{BuildError, MachineBuilder, StateSpec, TransitionSpec, TriggerSpec};
pub use crate::core::{Fault, Guard, Mapping, Params, StateHistory, StateId};
pub use effects::{ActionDiscipline, MachineError, Signal, StateMachine};
