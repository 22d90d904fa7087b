//! Argument adapter: generic `then`/`fail` handler wrapper constructors
//! that implement the dispatch rules from SPEC_FULL.md §4.2 as explicit,
//! arity-specific code paths chosen at compile time, replacing the
//! runtime callable-introspection facility the original design used.

use std::any::{Any, TypeId};

use crate::envelope::AnyValue;
use crate::holder::SettleState;
use crate::promise::Promise;

/// What a handler invocation produced: a settled value/reason, or a
/// promise to join onto.
pub(crate) enum Outcome {
    Settled(SettleState, AnyValue),
    Join(Promise),
}

pub(crate) type HandlerFn = Box<dyn FnOnce(AnyValue) -> Outcome + Send>;

/// Converts a handler's return value into an [`Outcome`]. A `Promise`
/// return triggers a join; anything else becomes the new settled value.
fn outcome_of<R: Clone + Send + Sync + 'static>(value: R, settle_as: SettleState) -> Outcome {
    if TypeId::of::<R>() == TypeId::of::<Promise>() {
        let boxed: Box<dyn Any> = Box::new(value);
        let promise = *boxed.downcast::<Promise>().expect("TypeId check above guarantees this downcast succeeds");
        return Outcome::Join(promise);
    }
    Outcome::Settled(settle_as, AnyValue::new(value))
}

/// Extracts a single handler parameter from the input envelope per the
/// "wildcard" (`T = AnyValue`) or "single typed parameter" rules.
/// Returns the original envelope unchanged on mismatch so rejected-branch
/// callers can re-propagate it verbatim.
fn adapt_one<T: Clone + Send + Sync + 'static>(input: &AnyValue) -> Result<T, AnyValue> {
    if TypeId::of::<T>() == TypeId::of::<AnyValue>() {
        let unwrapped = match input.as_sequence() {
            Some(seq) if seq.len() == 1 => seq[0].clone(),
            Some(seq) if seq.is_empty() => AnyValue::empty(),
            _ => input.clone(),
        };
        return Ok(unwrapped.downcast::<T>().expect("TypeId check above guarantees this downcast succeeds"));
    }
    let candidate = match input.as_sequence() {
        Some(seq) => seq.first().cloned(),
        None => Some(input.clone()),
    };
    match candidate.and_then(|c| c.downcast::<T>().ok()) {
        Some(v) => Ok(v),
        None => Err(input.clone()),
    }
}

macro_rules! adapt_many {
    ($name:ident, $($t:ident : $idx:tt),+) => {
        fn $name<$($t: Clone + Send + Sync + 'static),+>(input: &AnyValue) -> Result<($($t,)+), AnyValue> {
            let Some(seq) = input.as_sequence() else { return Err(input.clone()) };
            let needed = adapt_many!(@count $($t),+);
            if seq.len() < needed {
                return Err(input.clone());
            }
            $(
                let $t = match seq[$idx].downcast::<$t>() {
                    Ok(v) => v,
                    Err(_) => return Err(input.clone()),
                };
            )+
            Ok(($($t,)+))
        }
    };
    (@count $($t:ident),+) => {
        <[()]>::len(&[$(adapt_many!(@unit $t)),+])
    };
    (@unit $t:ident) => { () };
}

adapt_many!(adapt_two, A: 0, B: 1);
adapt_many!(adapt_three, A: 0, B: 1, C: 2);
adapt_many!(adapt_four, A: 0, B: 1, C: 2, D: 3);

/// Built from a handler closure passed to `then`/`always`; on a resolved
/// branch a shape/type mismatch converts to a `BadCast` rejection.
pub(crate) trait IntoResolvedHandler<Marker> {
    fn into_resolved_handler(self) -> HandlerFn;
}

/// Built from a handler closure passed to `fail`/`always`; on a rejected
/// branch a shape/type mismatch re-rejects with the original, unchanged
/// reason so a later `fail` gets a chance to match.
pub(crate) trait IntoRejectedHandler<Marker> {
    fn into_rejected_handler(self) -> HandlerFn;
}

pub(crate) struct ZeroArgMarker;
pub(crate) struct OneArgMarker<T>(std::marker::PhantomData<T>);
pub(crate) struct TwoArgMarker<A, B>(std::marker::PhantomData<(A, B)>);
pub(crate) struct ThreeArgMarker<A, B, C>(std::marker::PhantomData<(A, B, C)>);
pub(crate) struct FourArgMarker<A, B, C, D>(std::marker::PhantomData<(A, B, C, D)>);

impl<F, R> IntoResolvedHandler<ZeroArgMarker> for F
where
    F: FnOnce() -> R + Send + 'static,
    R: Clone + Send + Sync + 'static,
{
    fn into_resolved_handler(self) -> HandlerFn {
        Box::new(move |_input| outcome_of(self(), SettleState::Resolved))
    }
}

impl<F, R> IntoRejectedHandler<ZeroArgMarker> for F
where
    F: FnOnce() -> R + Send + 'static,
    R: Clone + Send + Sync + 'static,
{
    fn into_rejected_handler(self) -> HandlerFn {
        Box::new(move |_input| outcome_of(self(), SettleState::Resolved))
    }
}

impl<F, T, R> IntoResolvedHandler<OneArgMarker<T>> for F
where
    F: FnOnce(T) -> R + Send + 'static,
    T: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    fn into_resolved_handler(self) -> HandlerFn {
        Box::new(move |input| match adapt_one::<T>(&input) {
            Ok(arg) => outcome_of(self(arg), SettleState::Resolved),
            Err(original) => Outcome::Settled(
                SettleState::Rejected,
                AnyValue::new(crate::error::PromiseError::BadCast {
                    from: original.value_type(),
                    to: crate::envelope::ValueType::of_type::<T>(),
                }),
            ),
        })
    }
}

impl<F, T, R> IntoRejectedHandler<OneArgMarker<T>> for F
where
    F: FnOnce(T) -> R + Send + 'static,
    T: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    fn into_rejected_handler(self) -> HandlerFn {
        Box::new(move |input| match adapt_one::<T>(&input) {
            Ok(arg) => outcome_of(self(arg), SettleState::Resolved),
            Err(original) => Outcome::Settled(SettleState::Rejected, original),
        })
    }
}

macro_rules! impl_multi_arity {
    ($marker:ident, $adapt:ident, $($t:ident),+) => {
        impl<F, $($t),+, R> IntoResolvedHandler<$marker<$($t),+>> for F
        where
            F: FnOnce($($t),+) -> R + Send + 'static,
            $($t: Clone + Send + Sync + 'static,)+
            R: Clone + Send + Sync + 'static,
        {
            fn into_resolved_handler(self) -> HandlerFn {
                Box::new(move |input| match $adapt::<$($t),+>(&input) {
                    Ok(($($t,)+)) => outcome_of(self($($t),+), SettleState::Resolved),
                    Err(original) => Outcome::Settled(
                        SettleState::Rejected,
                        AnyValue::new(crate::error::PromiseError::BadCast {
                            from: original.value_type(),
                            to: crate::envelope::ValueType::of_type::<($($t,)+)>(),
                        }),
                    ),
                })
            }
        }

        impl<F, $($t),+, R> IntoRejectedHandler<$marker<$($t),+>> for F
        where
            F: FnOnce($($t),+) -> R + Send + 'static,
            $($t: Clone + Send + Sync + 'static,)+
            R: Clone + Send + Sync + 'static,
        {
            fn into_rejected_handler(self) -> HandlerFn {
                Box::new(move |input| match $adapt::<$($t),+>(&input) {
                    Ok(($($t,)+)) => outcome_of(self($($t),+), SettleState::Resolved),
                    Err(original) => Outcome::Settled(SettleState::Rejected, original),
                })
            }
        }
    };
}

impl_multi_arity!(TwoArgMarker, adapt_two, A, B);
impl_multi_arity!(ThreeArgMarker, adapt_three, A, B, C);
impl_multi_arity!(FourArgMarker, adapt_four, A, B, C, D);
