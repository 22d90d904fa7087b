//! The dynamic value envelope (`AnyValue`) and the argument-sequence
//! convention used to pass zero, one, or many values across a
//! continuation boundary.
//!
//! Unlike the C++ lineage this crate is adapted from, there is no
//! separate `ExceptionToken` type and no `call()` operation on the
//! envelope: rejection reasons are ordinary envelopes, and handler
//! invocation happens through the generic `then`/`fail` adapters in
//! `handler.rs` instead of a runtime-invocable value stored inside the
//! envelope itself.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::error::BadCast;

/// Stable identity of a value held (or not held) by an [`AnyValue`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueType {
    id: TypeId,
    name: &'static str,
}

impl ValueType {
    fn of<T: 'static>() -> Self {
        ValueType { id: TypeId::of::<T>(), name: std::any::type_name::<T>() }
    }

    pub(crate) fn of_type<T: 'static>() -> Self {
        Self::of::<T>()
    }

    fn empty() -> Self {
        ValueType { id: TypeId::of::<EmptyMarker>(), name: "<empty>" }
    }

    fn sequence() -> Self {
        ValueType { id: TypeId::of::<SequenceMarker>(), name: "<sequence>" }
    }
}

impl fmt::Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

enum EmptyMarker {}
enum SequenceMarker {}

/// Internal object-safe storage for one boxed value: downcastable and
/// cheaply cloneable without knowing the concrete type at the call site.
trait ValueBox: Any + Send + Sync {
    fn clone_box(&self) -> Box<dyn ValueBox + 'static>;
    fn as_any(&self) -> &(dyn Any + 'static);
    fn type_name(&self) -> &'static str;
}

impl<T> ValueBox for T
where
    T: Any + Clone + Send + Sync,
{
    fn clone_box(&self) -> Box<dyn ValueBox + 'static> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &(dyn Any + 'static) {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

enum Repr {
    Empty,
    Sequence(Arc<Vec<AnyValue>>),
    Value(Box<dyn ValueBox + 'static>),
}

/// Type-erased single-slot container for exactly one value, or an
/// ordered sequence of such values, or nothing.
///
/// Construction unwraps one level when handed an `AnyValue` itself so
/// envelopes never nest — see module docs.
pub struct AnyValue(Repr);

impl AnyValue {
    /// The canonical empty envelope (used for zero-value resolves and
    /// void-returning handlers).
    pub fn empty() -> Self {
        AnyValue(Repr::Empty)
    }

    /// Wrap `value` in an envelope. If `T` is itself `AnyValue`, the
    /// inner representation is unwrapped rather than boxed again.
    pub fn new<T: Clone + Send + Sync + 'static>(value: T) -> Self {
        if TypeId::of::<T>() == TypeId::of::<AnyValue>() {
            let boxed: Box<dyn Any> = Box::new(value);
            let inner = *boxed
                .downcast::<AnyValue>()
                .expect("TypeId check above guarantees this downcast succeeds");
            return inner;
        }
        AnyValue(Repr::Value(Box::new(value)))
    }

    /// Wrap an ordered sequence of envelopes as a single envelope
    /// carrying the "sequence of envelopes" type identity.
    pub fn sequence(values: Vec<AnyValue>) -> Self {
        AnyValue(Repr::Sequence(Arc::new(values)))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.0, Repr::Empty)
    }

    pub fn as_sequence(&self) -> Option<&[AnyValue]> {
        match &self.0 {
            Repr::Sequence(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Stable identity of the held value (or the dedicated `Empty` /
    /// `<sequence>` identities).
    pub fn value_type(&self) -> ValueType {
        match &self.0 {
            Repr::Empty => ValueType::empty(),
            Repr::Sequence(_) => ValueType::sequence(),
            Repr::Value(b) => {
                let b: &(dyn ValueBox + 'static) = b.as_ref();
                ValueType { id: b.as_any().type_id(), name: b.type_name() }
            }
        }
    }

    /// Build the `BadCast` a caller would get from `downcast::<T>()`,
    /// without actually attempting the downcast. Used by the argument
    /// adapter for arity/shape mismatches (e.g. too-short sequences)
    /// that never reach a per-element downcast call.
    pub(crate) fn mismatch<T: 'static>(&self) -> BadCast {
        BadCast { from: self.value_type(), to: ValueType::of_type::<T>() }
    }

    /// Extract `T` by exact type match. Requesting `AnyValue` itself
    /// always succeeds and hands back an identical clone.
    pub fn downcast<T: Clone + Send + Sync + 'static>(&self) -> Result<T, BadCast> {
        if TypeId::of::<T>() == TypeId::of::<AnyValue>() {
            let cloned = self.clone();
            let boxed: Box<dyn Any> = Box::new(cloned);
            return Ok(*boxed
                .downcast::<T>()
                .expect("TypeId check above guarantees this downcast succeeds"));
        }
        match &self.0 {
            Repr::Value(b) => {
                let b: &(dyn ValueBox + 'static) = b.as_ref();
                b.as_any()
                    .downcast_ref::<T>()
                    .cloned()
                    .ok_or_else(|| BadCast { from: self.value_type(), to: ValueType::of::<T>() })
            }
            Repr::Empty | Repr::Sequence(_) => {
                Err(BadCast { from: self.value_type(), to: ValueType::of::<T>() })
            }
        }
    }
}

impl Clone for AnyValue {
    fn clone(&self) -> Self {
        let repr = match &self.0 {
            Repr::Empty => Repr::Empty,
            Repr::Sequence(v) => Repr::Sequence(Arc::clone(v)),
            Repr::Value(b) => {
                let b: &(dyn ValueBox + 'static) = b.as_ref();
                Repr::Value(b.clone_box())
            }
        };
        AnyValue(repr)
    }
}

impl fmt::Debug for AnyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Repr::Empty => write!(f, "AnyValue(empty)"),
            Repr::Sequence(v) => write!(f, "AnyValue(sequence[{}])", v.len()),
            Repr::Value(b) => {
                let b: &(dyn ValueBox + 'static) = b.as_ref();
                write!(f, "AnyValue({})", b.type_name())
            }
        }
    }
}

/// Packs a fixed-arity Rust tuple into the canonical "argument list"
/// envelope convention from the data model: zero values become an empty
/// sequence, one value is stored bare, two or more become a sequence.
pub trait IntoArgsEnvelope {
    fn into_args_envelope(self) -> AnyValue;
}

impl IntoArgsEnvelope for () {
    fn into_args_envelope(self) -> AnyValue {
        AnyValue::sequence(Vec::new())
    }
}

macro_rules! impl_into_args_envelope {
    ($($t:ident),+) => {
        impl<$($t: Clone + Send + Sync + 'static),+> IntoArgsEnvelope for ($($t,)+) {
            #[allow(non_snake_case)]
            fn into_args_envelope(self) -> AnyValue {
                let ($($t,)+) = self;
                let values: Vec<AnyValue> = vec![$(AnyValue::new($t)),+];
                if values.len() == 1 {
                    values.into_iter().next().unwrap()
                } else {
                    AnyValue::sequence(values)
                }
            }
        }
    };
}

impl_into_args_envelope!(A);
impl_into_args_envelope!(A, B);
impl_into_args_envelope!(A, B, C);
impl_into_args_envelope!(A, B, C, D);
