//! State identity: a label plus an ordered parameter-type signature.
//!
//! The same label may be declared several times with different payload
//! shapes. Each shape is a distinct state.

use super::params::{signature_accepts, ParamTuple, ParamType};
use std::fmt;

/// Identity of a configured state.
///
/// # Example
///
/// ```rust
/// use stagehand::core::{ParamType, StateId};
///
/// let plain = StateId::new("Idle");
/// let keyed = StateId::of::<(u64,)>("Idle");
///
/// assert_ne!(plain, keyed);
/// assert_eq!(keyed.signature(), &[ParamType::of::<u64>()]);
/// assert_eq!(plain.to_string(), "Idle");
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct StateId {
    label: String,
    signature: Vec<ParamType>,
}

impl StateId {
    /// State without parameters.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            signature: Vec::new(),
        }
    }

    /// State whose payload has the shape of the tuple `T`.
    pub fn of<T: ParamTuple>(label: impl Into<String>) -> Self {
        Self::with_signature(label, T::signature())
    }

    pub fn with_signature(label: impl Into<String>, signature: Vec<ParamType>) -> Self {
        Self {
            label: label.into(),
            signature,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn signature(&self) -> &[ParamType] {
        &self.signature
    }

    /// Whether a reference to `label` carrying `candidate` types lands on this state.
    pub fn accepts(&self, label: &str, candidate: &[ParamType]) -> bool {
        self.label == label && signature_accepts(&self.signature, candidate)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)?;
        if !self.signature.is_empty() {
            let names: Vec<&str> = self.signature.iter().map(ParamType::name).collect();
            write!(f, "({})", names.join(", "))?;
        }
        Ok(())
    }
}

impl fmt::Debug for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateId({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_includes_signature() {
        assert_eq!(StateId::new("A"), StateId::of::<()>("A"));
        assert_ne!(StateId::new("A"), StateId::of::<(i32,)>("A"));
        assert_ne!(StateId::of::<(i32,)>("A"), StateId::of::<(i64,)>("A"));
    }

    #[test]
    fn accepts_matches_label_and_types() {
        let state = StateId::of::<(i32,)>("A");

        assert!(state.accepts("A", &[ParamType::of::<i32>()]));
        assert!(!state.accepts("B", &[ParamType::of::<i32>()]));
        assert!(!state.accepts("A", &[ParamType::of::<String>()]));
        assert!(!state.accepts("A", &[]));
    }

    #[test]
    fn wildcard_state_accepts_any_single_value() {
        let state = StateId::with_signature("Holder", vec![ParamType::any()]);

        assert!(state.accepts("Holder", &[ParamType::of::<String>()]));
        assert!(state.accepts("Holder", &[ParamType::of::<u8>()]));
    }

    #[test]
    fn display_lists_parameter_types() {
        assert_eq!(StateId::new("Idle").to_string(), "Idle");
        assert_eq!(StateId::of::<(i32, bool)>("Busy").to_string(), "Busy(i32, bool)");
    }
}
