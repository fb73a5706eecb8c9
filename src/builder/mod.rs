//! Builder API for machine construction.
//!
//! States, transitions and triggers are declared as plain spec values and
//! collected by [`MachineBuilder`]. Building validates the whole
//! configuration at once; the runtime only ever sees the validated tables.

pub mod error;
pub mod machine;
pub mod state;
pub mod transition;
pub mod trigger;
mod validate;

pub use error::{BuildError, ConfigurationError, Finding};
pub use machine::{MachineBuilder, DEFAULT_HISTORY_LIMIT};
pub use state::StateSpec;
pub use transition::TransitionSpec;
pub use trigger::TriggerSpec;
