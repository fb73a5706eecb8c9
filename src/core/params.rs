//! Typed parameter payloads and the slot transaction that moves them.
//!
//! States and transitions carry up to [`MAX_PARAMS`] heterogeneous values.
//! Each value keeps a reified [`ParamType`] so shapes can be checked when a
//! machine is configured and values can be cast back when they are read.
//!
//! [`ParameterSlots`] holds the previous, current and next payloads and is
//! the only place parameter data moves during a transition:
//!
//! - `begin_transition`: current → previous
//! - `set_next`: stage the payload for the target state
//! - `commit_transition`: next → current
//! - `rollback_transition`: previous → current

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::sync::Arc;
use thiserror::Error;

/// Maximum number of values a single payload may hold.
pub const MAX_PARAMS: usize = 4;

/// Marker type behind [`ParamType::any`].
struct AnyParam;

/// Reified type tag of a parameter.
///
/// Two tags are equal when they name the same Rust type. The wildcard
/// [`ParamType::any`] is assignable from every other tag, which is the only
/// assignability rule besides identity.
#[derive(Clone, Copy)]
pub struct ParamType {
    id: TypeId,
    name: &'static str,
}

impl ParamType {
    /// Tag for the concrete type `T`.
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Wildcard tag that accepts a value of any type.
    pub fn any() -> Self {
        Self {
            id: TypeId::of::<AnyParam>(),
            name: "any",
        }
    }

    pub fn is_any(&self) -> bool {
        self.id == TypeId::of::<AnyParam>()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether a slot declared with `self` can hold a value tagged `other`.
    pub fn is_assignable_from(&self, other: &ParamType) -> bool {
        self.is_any() || self.id == other.id
    }
}

impl PartialEq for ParamType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ParamType {}

impl Hash for ParamType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Whether every declared type accepts the corresponding candidate type.
///
/// Arity must match exactly.
pub fn signature_accepts(declared: &[ParamType], candidate: &[ParamType]) -> bool {
    declared.len() == candidate.len()
        && declared
            .iter()
            .zip(candidate)
            .all(|(d, c)| d.is_assignable_from(c))
}

/// Which of the three slots an operation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Previous,
    Current,
    Next,
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Previous => f.write_str("previous"),
            Self::Current => f.write_str("current"),
            Self::Next => f.write_str("next"),
        }
    }
}

/// Errors raised when storing or reading parameters.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParamError {
    #[error("{slot} parameters are not set")]
    NotSet { slot: SlotKind },

    #[error("parameter {index} holds `{found}`, requested `{expected}`")]
    Cast {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("parameter {index} is missing")]
    Missing { index: usize },

    #[error("at most {max} parameters are supported")]
    Capacity { max: usize },

    #[error("expected {expected} parameters, found {found}")]
    Arity { expected: usize, found: usize },
}

/// A single type-erased parameter value.
#[derive(Clone)]
pub struct Value {
    ty: ParamType,
    inner: Arc<dyn Any + Send + Sync>,
}

impl Value {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            ty: ParamType::of::<T>(),
            inner: Arc::new(value),
        }
    }

    pub fn param_type(&self) -> ParamType {
        self.ty
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value<{}>", self.ty)
    }
}

/// Ordered payload of zero to four values.
#[derive(Clone, Default)]
pub struct Params {
    values: Vec<Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a payload from loose values, enforcing the capacity.
    pub fn from_values(values: Vec<Value>) -> Result<Self, ParamError> {
        if values.len() > MAX_PARAMS {
            return Err(ParamError::Capacity { max: MAX_PARAMS });
        }
        Ok(Self { values })
    }

    pub fn push(&mut self, value: Value) -> Result<(), ParamError> {
        if self.values.len() == MAX_PARAMS {
            return Err(ParamError::Capacity { max: MAX_PARAMS });
        }
        self.values.push(value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    /// Runtime type signature of the stored values.
    pub fn signature(&self) -> Vec<ParamType> {
        self.values.iter().map(Value::param_type).collect()
    }

    /// Whether these values fit a declared signature.
    pub fn fits(&self, declared: &[ParamType]) -> bool {
        signature_accepts(declared, &self.signature())
    }

    /// Like [`Params::fits`], reporting the first mismatch.
    pub fn check_fits(&self, declared: &[ParamType]) -> Result<(), ParamError> {
        self.expect_arity(declared.len())?;
        for (index, (expected, value)) in declared.iter().zip(&self.values).enumerate() {
            if !expected.is_assignable_from(&value.ty) {
                return Err(ParamError::Cast {
                    index,
                    expected: expected.name(),
                    found: value.ty.name(),
                });
            }
        }
        Ok(())
    }

    /// Read one value, cloning it out as `T`.
    pub fn get_as<T: Any + Clone>(&self, index: usize) -> Result<T, ParamError> {
        let value = self
            .values
            .get(index)
            .ok_or(ParamError::Missing { index })?;
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or(ParamError::Cast {
                index,
                expected: std::any::type_name::<T>(),
                found: value.ty.name(),
            })
    }

    /// Read the whole payload as a typed tuple.
    pub fn extract<T: ParamTuple>(&self) -> Result<T, ParamError> {
        T::from_params(self)
    }

    fn expect_arity(&self, expected: usize) -> Result<(), ParamError> {
        if self.values.len() != expected {
            return Err(ParamError::Arity {
                expected,
                found: self.values.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.signature()).finish()
    }
}

/// Tuples of zero to four values usable as a payload.
pub trait ParamTuple: Sized {
    /// Static type signature of the tuple.
    fn signature() -> Vec<ParamType>;

    fn into_params(self) -> Params;

    fn from_params(params: &Params) -> Result<Self, ParamError>;
}

impl ParamTuple for () {
    fn signature() -> Vec<ParamType> {
        Vec::new()
    }

    fn into_params(self) -> Params {
        Params::new()
    }

    fn from_params(params: &Params) -> Result<Self, ParamError> {
        params.expect_arity(0)
    }
}

macro_rules! impl_param_tuple {
    ($len:expr; $($name:ident : $idx:tt),+) => {
        impl<$($name: Any + Clone + Send + Sync),+> ParamTuple for ($($name,)+) {
            fn signature() -> Vec<ParamType> {
                vec![$(ParamType::of::<$name>()),+]
            }

            fn into_params(self) -> Params {
                Params {
                    values: vec![$(Value::new(self.$idx)),+],
                }
            }

            fn from_params(params: &Params) -> Result<Self, ParamError> {
                params.expect_arity($len)?;
                Ok(($(params.get_as::<$name>($idx)?,)+))
            }
        }
    };
}

impl_param_tuple!(1; A: 0);
impl_param_tuple!(2; A: 0, B: 1);
impl_param_tuple!(3; A: 0, B: 1, C: 2);
impl_param_tuple!(4; A: 0, B: 1, C: 2, D: 3);

#[derive(Clone, Debug, Default)]
struct Slot {
    set: bool,
    values: Params,
}

impl Slot {
    fn read(&self, slot: SlotKind) -> Result<&Params, ParamError> {
        if self.set {
            Ok(&self.values)
        } else {
            Err(ParamError::NotSet { slot })
        }
    }
}

/// Previous, current and next payloads of a machine.
#[derive(Clone, Debug, Default)]
pub struct ParameterSlots {
    previous: Slot,
    current: Slot,
    next: Slot,
}

impl ParameterSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move current into previous and leave current empty.
    pub fn begin_transition(&mut self) {
        self.previous = mem::take(&mut self.current);
        self.next = Slot::default();
    }

    /// Stage the payload the target state will receive.
    pub fn set_next(&mut self, values: Params) {
        self.next = Slot { set: true, values };
    }

    /// Move next into current, dropping previous.
    pub fn commit_transition(&mut self) {
        self.current = mem::take(&mut self.next);
        self.previous = Slot::default();
    }

    /// Restore current from previous, discarding anything staged.
    pub fn rollback_transition(&mut self) {
        self.current = mem::take(&mut self.previous);
        self.next = Slot::default();
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn previous(&self) -> Result<&Params, ParamError> {
        self.previous.read(SlotKind::Previous)
    }

    pub fn current(&self) -> Result<&Params, ParamError> {
        self.current.read(SlotKind::Current)
    }

    pub fn next(&self) -> Result<&Params, ParamError> {
        self.next.read(SlotKind::Next)
    }

    pub fn is_set(&self, slot: SlotKind) -> bool {
        match slot {
            SlotKind::Previous => self.previous.set,
            SlotKind::Current => self.current.set,
            SlotKind::Next => self.next.set,
        }
    }

    /// Type signature of a slot, or `None` when the slot is not set.
    pub fn signature(&self, slot: SlotKind) -> Option<Vec<ParamType>> {
        let slot = match slot {
            SlotKind::Previous => &self.previous,
            SlotKind::Current => &self.current,
            SlotKind::Next => &self.next,
        };
        slot.set.then(|| slot.values.signature())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots_with_current(params: Params) -> ParameterSlots {
        let mut slots = ParameterSlots::new();
        slots.begin_transition();
        slots.set_next(params);
        slots.commit_transition();
        slots
    }

    #[test]
    fn tuple_round_trips_through_params() {
        let params = (42_i32, "order".to_string()).into_params();
        assert_eq!(params.len(), 2);

        let (id, name): (i32, String) = params.extract().unwrap();
        assert_eq!(id, 42);
        assert_eq!(name, "order");
    }

    #[test]
    fn cast_to_wrong_type_fails() {
        let params = (42_i32,).into_params();
        let result = params.get_as::<String>(0);

        assert!(matches!(result, Err(ParamError::Cast { index: 0, .. })));
    }

    #[test]
    fn extract_checks_arity() {
        let params = (1_u8, 2_u8).into_params();
        let result = params.extract::<(u8,)>();

        assert_eq!(
            result.unwrap_err(),
            ParamError::Arity {
                expected: 1,
                found: 2
            }
        );
    }

    #[test]
    fn capacity_is_four() {
        let mut params = (1, 2, 3, 4).into_params();
        let result = params.push(Value::new(5));

        assert_eq!(result, Err(ParamError::Capacity { max: MAX_PARAMS }));
        assert!(Params::from_values(vec![Value::new(1); 5]).is_err());
    }

    #[test]
    fn wildcard_accepts_everything() {
        let any = ParamType::any();
        assert!(any.is_assignable_from(&ParamType::of::<i32>()));
        assert!(!ParamType::of::<i32>().is_assignable_from(&any));
        assert!(ParamType::of::<i32>().is_assignable_from(&ParamType::of::<i32>()));
        assert!(!ParamType::of::<i32>().is_assignable_from(&ParamType::of::<i64>()));
    }

    #[test]
    fn unset_slots_refuse_reads() {
        let slots = ParameterSlots::new();

        assert_eq!(
            slots.current().unwrap_err(),
            ParamError::NotSet {
                slot: SlotKind::Current
            }
        );
        assert!(slots.signature(SlotKind::Next).is_none());
    }

    #[test]
    fn commit_moves_next_into_current() {
        let mut slots = slots_with_current((1_i32,).into_params());

        slots.begin_transition();
        assert!(slots.current().is_err());
        assert_eq!(slots.previous().unwrap().get_as::<i32>(0), Ok(1));

        slots.set_next((2_i32,).into_params());
        slots.commit_transition();

        assert_eq!(slots.current().unwrap().get_as::<i32>(0), Ok(2));
        assert!(!slots.is_set(SlotKind::Previous));
        assert!(!slots.is_set(SlotKind::Next));
    }

    #[test]
    fn rollback_restores_current() {
        let mut slots = slots_with_current((1_i32,).into_params());

        slots.begin_transition();
        slots.set_next(("staged".to_string(),).into_params());
        slots.rollback_transition();

        assert_eq!(slots.current().unwrap().get_as::<i32>(0), Ok(1));
        assert!(slots.next().is_err());
        assert!(slots.previous().is_err());
    }

    #[test]
    fn clear_resets_every_slot() {
        let mut slots = slots_with_current((1_i32,).into_params());
        slots.clear();

        assert!(!slots.is_set(SlotKind::Current));
        assert!(!slots.is_set(SlotKind::Previous));
        assert!(!slots.is_set(SlotKind::Next));
    }
}
