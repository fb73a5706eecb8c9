//! Runtime errors surfaced by [`StateMachine`](super::StateMachine) operations.

use super::policy::Category;
use crate::core::{BoxError, Fault, ParamError};
use thiserror::Error;

/// Errors that can occur while driving a machine.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("state machine is already activated")]
    AlreadyActivated,

    #[error("state machine is not activated")]
    NotActivated,

    #[error("no transition '{label}' from state '{state}' matches")]
    NoMatchingTransition { state: String, label: String },

    #[error("{category} handler failed: {source}")]
    Handler {
        category: Category,
        #[source]
        source: BoxError,
    },

    #[error("operation canceled")]
    Canceled,

    #[error(transparent)]
    Parameter(#[from] ParamError),
}

impl MachineError {
    pub(crate) fn from_fault(category: Category, fault: Fault) -> Self {
        match fault {
            Fault::Canceled => Self::Canceled,
            Fault::Failed(source) => Self::Handler { category, source },
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Category of the failing callback, if a callback failed.
    pub fn category(&self) -> Option<Category> {
        match self {
            Self::Handler { category, .. } => Some(*category),
            _ => None,
        }
    }
}

/// Lets callbacks use `?` on machine calls; cancellation stays cancellation.
impl From<MachineError> for Fault {
    fn from(error: MachineError) -> Self {
        match error {
            MachineError::Canceled => Fault::Canceled,
            other => Fault::Failed(Box::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faults_keep_their_category() {
        let error = MachineError::from_fault(Category::Entry, Fault::failed("boom"));

        assert_eq!(error.category(), Some(Category::Entry));
        assert_eq!(error.to_string(), "entry handler failed: boom");
    }

    #[test]
    fn cancellation_round_trips() {
        let error = MachineError::from_fault(Category::Exit, Fault::Canceled);
        assert!(error.is_canceled());

        let fault: Fault = error.into();
        assert!(fault.is_canceled());
    }

    #[test]
    fn other_errors_become_failures() {
        let fault: Fault = MachineError::NotActivated.into();
        assert!(matches!(fault, Fault::Failed(_)));
    }
}
