//! Build errors for machine construction.

use std::fmt;
use stillwater::NonEmptyVec;
use thiserror::Error;

/// Errors that can occur when building a machine.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Initial state not specified. Call .initial(label, parameters) before .build()")]
    MissingInitialState,

    #[error(
        "Trigger #{index} is incomplete. \
         Call .await_signal(..) or .await_fn(..) and .then_invoke(..)"
    )]
    IncompleteTrigger { index: usize },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// One structural problem found by the validator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Finding {
    #[error("state '{state}' is declared more than once")]
    DuplicateState { state: String },

    #[error("transition '{label}' from '{from}' targets unknown state '{target}'")]
    DanglingTarget {
        from: String,
        label: String,
        target: String,
    },

    #[error(
        "transition '{label}' from '{from}' to '{target}' is unreachable: \
         shadowed by an earlier unconditional transition to '{shadowed_by}'"
    )]
    UnreachableTransition {
        from: String,
        label: String,
        target: String,
        shadowed_by: String,
    },

    #[error("transition '{label}' from '{from}' has no target. Call .to(..) or .to_mapped(..)")]
    MissingTarget { from: String, label: String },

    #[error("transition '{label}' from '{from}' maps a payload of shape {expected}")]
    MappingInputMismatch {
        from: String,
        label: String,
        expected: String,
    },

    #[error("transition '{label}' leaves undeclared state '{from}'")]
    UnknownSource { from: String, label: String },

    #[error("initial state '{state}' does not match any declared state")]
    UnknownInitialState { state: String },
}

/// Every finding of a failed validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub struct ConfigurationError {
    findings: Vec<Finding>,
}

impl ConfigurationError {
    pub(crate) fn new(findings: NonEmptyVec<Finding>) -> Self {
        Self {
            findings: findings.iter().cloned().collect(),
        }
    }

    pub(crate) fn from_finding(finding: Finding) -> Self {
        Self {
            findings: vec![finding],
        }
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid machine configuration ({} finding", self.findings.len())?;
        if self.findings.len() != 1 {
            f.write_str("s")?;
        }
        f.write_str(")")?;
        for finding in &self.findings {
            write!(f, "\n  - {finding}")?;
        }
        Ok(())
    }
}
