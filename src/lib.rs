//! A thread-driven, type-erased promise/defer graph with joinable
//! continuations.
//!
//! A [`Promise`] carries at most one value or rejection reason, type-erased
//! behind [`AnyValue`]. Continuations attached with [`Promise::then`],
//! [`Promise::fail`], [`Promise::then_or_fail`], [`Promise::always`], and
//! [`Promise::finally`] run on whichever thread eventually settles the
//! chain — there is no bundled executor or reactor; this crate only
//! supplies the state machine and the combinators built on top of it
//! ([`combinators::all`], [`combinators::race`], [`combinators::do_while`],
//! [`combinators::with_timeout`], ...).
//!
//! Rejections that are never observed by a `fail`/`then_or_fail`/`always`
//! handler are reported to the process-wide hook installed with
//! [`handle_uncaught_exception`].

mod config;
mod envelope;
mod error;
mod handler;
mod holder;
mod promise;
mod uncaught;

pub mod combinators;

pub use config::Config;
pub use envelope::{AnyValue, IntoArgsEnvelope, ValueType};
pub use error::{BadCast, PromiseError};
pub use promise::{new_pending_promise, new_promise, Defer, DeferLoop, Promise};
pub use uncaught::handle_uncaught_exception;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn chained_then_carries_the_value_forward() {
        let result = Arc::new(AtomicI32::new(0));
        let r2 = result.clone();
        new_promise(|defer| defer.resolve((2i32,)))
            .then(|v: i32| v * 10)
            .then(move |v: i32| r2.store(v, Ordering::SeqCst));
        assert_eq!(result.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn rejection_skips_then_and_is_caught_by_fail() {
        let caught = Arc::new(AtomicI32::new(0));
        let c2 = caught.clone();
        new_promise(|defer| defer.reject(("nope".to_string(),)))
            .then(|v: i32| v + 1)
            .fail(move |reason: String| {
                assert_eq!(reason, "nope");
                c2.store(1, Ordering::SeqCst);
            });
        assert_eq!(caught.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn returning_a_promise_from_then_joins_the_chain() {
        let result = Arc::new(AtomicI32::new(0));
        let r2 = result.clone();
        new_promise(|defer| defer.resolve((1i32,)))
            .then(|v: i32| new_promise(move |inner| inner.resolve((v + 41,))))
            .then(move |v: i32| r2.store(v, Ordering::SeqCst));
        assert_eq!(result.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn bad_cast_on_resolved_branch_produces_a_new_rejection() {
        let seen = Arc::new(AtomicI32::new(0));
        let s2 = seen.clone();
        new_promise(|defer| defer.resolve((1i32,)))
            .then(|v: String| v)
            .fail(move |_: PromiseError| s2.store(1, Ordering::SeqCst));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn finally_runs_on_both_branches_and_preserves_the_outcome() {
        let ran = Arc::new(AtomicI32::new(0));
        let r2 = ran.clone();
        let reason = Arc::new(AtomicI32::new(0));
        let g2 = reason.clone();
        new_promise(|defer| defer.reject((7i32,)))
            .finally(move || {
                r2.fetch_add(1, Ordering::SeqCst);
            })
            .fail(move |v: i32| g2.store(v, Ordering::SeqCst));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(reason.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn uncaught_rejection_without_a_fail_handler_reaches_the_hook() {
        let p = new_promise(|defer| defer.reject(("dropped".to_string(),)));
        drop(p);
    }
}
