//! Builder for transition declarations.

use crate::core::{Fault, Guard, GuardContext, Mapping, ParamTuple, ParamType, StateId};
use std::future::Future;

/// Declares one transition leaving a state.
///
/// A transition is plain (`.to(..)`: the target receives the invocation
/// arguments verbatim) or mapped (`.to_mapped(..)`: a [`Mapping`] computes
/// the target payload).
#[derive(Clone, Debug)]
pub struct TransitionSpec {
    pub(crate) source: StateId,
    pub(crate) label: String,
    pub(crate) arguments: Vec<ParamType>,
    pub(crate) guard: Option<Guard>,
    pub(crate) target: Option<String>,
    pub(crate) mapping: Option<Mapping>,
}

impl TransitionSpec {
    /// Create a transition leaving `source` under `label`.
    pub fn new(source: StateId, label: impl Into<String>) -> Self {
        Self {
            source,
            label: label.into(),
            arguments: Vec::new(),
            guard: None,
            target: None,
            mapping: None,
        }
    }

    /// Invocation arguments shaped like the tuple `T`.
    pub fn with_arguments<T: ParamTuple>(mut self) -> Self {
        self.arguments = T::signature();
        self
    }

    pub fn with_signature(mut self, arguments: Vec<ParamType>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Add a guard (optional).
    pub fn guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Add a guard using a closure (optional).
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&GuardContext) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Guard::new(predicate));
        self
    }

    /// Add an async guard that may fail (optional).
    pub fn when_async<F, Fut>(mut self, predicate: F) -> Self
    where
        F: Fn(GuardContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, Fault>> + Send + 'static,
    {
        self.guard = Some(Guard::from_async(predicate));
        self
    }

    /// Target the state labeled `target`, passing the arguments through.
    pub fn to(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self.mapping = None;
        self
    }

    /// Target the state labeled `target` with a mapped payload.
    pub fn to_mapped(mut self, target: impl Into<String>, mapping: Mapping) -> Self {
        self.target = Some(target.into());
        self.mapping = Some(mapping);
        self
    }

    pub fn source(&self) -> &StateId {
        &self.source
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Signature the target must accept.
    pub(crate) fn target_signature(&self) -> Vec<ParamType> {
        match &self.mapping {
            Some(mapping) => mapping.output_signature(self.source.signature()),
            None => self.arguments.clone(),
        }
    }
}
