//! Free-function combinators built on top of the public `Promise` API:
//! already-settled constructors, `all`, the `race` family, `do_while`,
//! and `with_timeout`.

use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::envelope::{AnyValue, IntoArgsEnvelope};
use crate::error::PromiseError;
use crate::promise::{new_pending_promise, new_promise, DeferLoop, DoBreakMarker, Promise};

/// An already-resolved promise, packed the same way `Defer::resolve`
/// would pack `args`.
pub fn resolve<Args: IntoArgsEnvelope>(args: Args) -> Promise {
    Promise::resolve_raw(args.into_args_envelope())
}

/// An already-rejected promise.
pub fn reject<Args: IntoArgsEnvelope>(args: Args) -> Promise {
    Promise::reject_raw(args.into_args_envelope())
}

/// Resolves once every promise in `list` resolves, with the results in
/// input order packed as a single `Vec<AnyValue>` value; rejects with the
/// first rejection reason observed. Non-winning siblings are left to
/// settle on their own.
pub fn all(list: Vec<Promise>) -> Promise {
    if list.is_empty() {
        return resolve((Vec::<AnyValue>::new(),));
    }
    let outer = new_pending_promise();
    let total = list.len();
    let results: Arc<Mutex<Vec<Option<AnyValue>>>> = Arc::new(Mutex::new(vec![None; total]));
    let remaining = Arc::new(AtomicIsize::new(total as isize));

    for (i, child) in list.iter().enumerate() {
        let outer = outer.clone();
        let outer_fail = outer.clone();
        let results = results.clone();
        let remaining = remaining.clone();
        child.then_or_fail(
            move |v: AnyValue| {
                let is_last = {
                    let mut guard = results.lock().unwrap();
                    guard[i] = Some(v);
                    remaining.fetch_sub(1, Ordering::SeqCst) == 1
                };
                if is_last {
                    let values = results.lock().unwrap().iter().cloned().map(|o| o.expect("every slot filled when remaining reaches zero")).collect::<Vec<_>>();
                    outer.resolve((values,));
                }
            },
            move |r: AnyValue| {
                outer_fail.reject((r,));
            },
        );
    }
    outer
}

fn race_core(list: Vec<Promise>) -> (Promise, Vec<Promise>, Arc<AtomicIsize>) {
    let outer = new_pending_promise();
    let winner = Arc::new(AtomicIsize::new(-1));

    for (i, child) in list.iter().enumerate() {
        let outer = outer.clone();
        let outer_fail = outer.clone();
        let winner = winner.clone();
        let winner_fail = winner.clone();
        child.then_or_fail(
            move |v: AnyValue| {
                if winner.compare_exchange(-1, i as isize, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
                    outer.resolve((v,));
                }
            },
            move |r: AnyValue| {
                if winner_fail.compare_exchange(-1, i as isize, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
                    outer_fail.reject((r,));
                }
            },
        );
    }
    (outer, list, winner)
}

/// Settles as soon as the first promise in `list` settles, with that
/// promise's own outcome. Every other promise is left running.
pub fn race(list: Vec<Promise>) -> Promise {
    race_core(list).0
}

/// Like [`race`], but once the winner is known every losing promise is
/// explicitly rejected.
pub fn race_and_reject(list: Vec<Promise>) -> Promise {
    let (outer, children, winner) = race_core(list);
    outer.always(move || {
        let w = winner.load(Ordering::SeqCst);
        for (i, child) in children.iter().enumerate() {
            if i as isize != w {
                child.reject(());
            }
        }
    });
    outer
}

/// Like [`race`], but once the winner is known every losing promise is
/// explicitly resolved.
pub fn race_and_resolve(list: Vec<Promise>) -> Promise {
    let (outer, children, winner) = race_core(list);
    outer.always(move || {
        let w = winner.load(Ordering::SeqCst);
        for (i, child) in children.iter().enumerate() {
            if i as isize != w {
                child.resolve(());
            }
        }
    });
    outer
}

/// Runs `body` repeatedly, once per iteration, driven by the
/// [`DeferLoop`] it receives: `do_continue` runs the body again,
/// `do_break` resolves the returned promise with the given value, and
/// `reject` fails it outright.
pub fn do_while<F>(body: F) -> Promise
where
    F: Fn(&DeferLoop) + Send + Sync + 'static,
{
    run_iteration(Arc::new(body))
}

fn run_iteration(body: Arc<dyn Fn(&DeferLoop) + Send + Sync>) -> Promise {
    let iteration = new_promise(|defer| {
        let defer_loop = DeferLoop::new(defer.clone());
        body(&defer_loop);
    });

    let next_body = body.clone();
    iteration.then_or_fail(
        move |_: AnyValue| run_iteration(next_body.clone()),
        move |r: AnyValue| match r.as_sequence() {
            Some(seq) if seq.len() == 2 && seq[0].downcast::<DoBreakMarker>().is_ok() => {
                Promise::resolve_raw(seq[1].clone())
            }
            _ => Promise::reject_raw(r),
        },
    )
}

/// Races `p` against an internal timer; if the timer fires first, the
/// returned promise rejects with [`PromiseError::TimedOut`] and `p` is
/// left to settle on its own.
pub fn with_timeout(p: Promise, duration: Duration) -> Promise {
    let timer = new_promise(move |defer| {
        let defer = defer.clone();
        std::thread::spawn(move || {
            std::thread::sleep(duration);
            defer.reject((PromiseError::TimedOut,));
        });
    });
    race(vec![p, timer])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promise::new_promise;
    use std::sync::atomic::AtomicI32;
    use std::time::Duration;

    #[test]
    fn all_with_no_promises_resolves_empty() {
        let done = Arc::new(AtomicBoolPair::new());
        let d2 = done.clone();
        all(vec![]).then(move |v: Vec<AnyValue>| {
            assert!(v.is_empty());
            d2.mark();
        });
        assert!(done.is_marked());
    }

    #[test]
    fn all_sums_resolved_values_in_order() {
        let a = resolve((1i32,));
        let b = resolve((2i32,));
        let c = resolve((3i32,));
        let total = Arc::new(AtomicI32::new(0));
        let t2 = total.clone();
        all(vec![a, b, c]).then(move |v: Vec<AnyValue>| {
            let sum: i32 = v.iter().map(|e| e.downcast::<i32>().unwrap()).sum();
            t2.store(sum, Ordering::SeqCst);
        });
        assert_eq!(total.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn all_rejects_with_first_failure() {
        let a = resolve((1i32,));
        let b = reject(("boom".to_string(),));
        let done = Arc::new(AtomicBoolPair::new());
        let d2 = done.clone();
        all(vec![a, b]).fail(move |reason: String| {
            assert_eq!(reason, "boom");
            d2.mark();
        });
        assert!(done.is_marked());
    }

    #[test]
    fn race_settles_with_the_first_settled_value() {
        let slow = new_promise::<_>(|defer| {
            let defer = defer.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(30));
                defer.resolve((2i32,));
            });
        });
        let fast = resolve((1i32,));
        let winner = Arc::new(AtomicI32::new(0));
        let w2 = winner.clone();
        race(vec![slow, fast]).then(move |v: i32| w2.store(v, Ordering::SeqCst));
        assert_eq!(winner.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn do_while_accumulates_then_breaks() {
        let total = Arc::new(AtomicI32::new(0));
        let t2 = total.clone();
        let count = Arc::new(AtomicI32::new(0));
        let c2 = count.clone();
        let result = Arc::new(AtomicI32::new(-1));
        let r2 = result.clone();

        do_while(move |l: &DeferLoop| {
            let n = c2.fetch_add(1, Ordering::SeqCst) + 1;
            t2.fetch_add(n, Ordering::SeqCst);
            if n >= 3 {
                l.do_break((t2.load(Ordering::SeqCst),));
            } else {
                l.do_continue(());
            }
        })
        .then(move |total: i32| r2.store(total, Ordering::SeqCst));

        assert_eq!(total.load(Ordering::SeqCst), 6);
        assert_eq!(result.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn with_timeout_rejects_when_the_inner_promise_is_too_slow() {
        let slow = new_promise::<_>(|defer| {
            let defer = defer.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                defer.resolve(());
            });
        });
        let timed_out = Arc::new(AtomicBoolPair::new());
        let t2 = timed_out.clone();
        with_timeout(slow, Duration::from_millis(5)).fail(move |_: PromiseError| {
            t2.mark();
        });
        std::thread::sleep(Duration::from_millis(20));
        assert!(timed_out.is_marked());
    }

    struct AtomicBoolPair(std::sync::atomic::AtomicBool);
    impl AtomicBoolPair {
        fn new() -> Self {
            AtomicBoolPair(std::sync::atomic::AtomicBool::new(false))
        }
        fn mark(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
        fn is_marked(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }
}
