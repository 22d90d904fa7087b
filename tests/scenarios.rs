//! End-to-end scenarios, one per named case in SPEC_FULL.md §8.

use spark_promise::combinators::{all, race_and_reject, resolve};
use spark_promise::{new_pending_promise, new_promise, AnyValue, PromiseError};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn sink() -> (Arc<AtomicI32>, impl Fn(i32) + Clone) {
    let cell = Arc::new(AtomicI32::new(i32::MIN));
    let cell2 = cell.clone();
    (cell, move |v: i32| cell2.store(v, Ordering::SeqCst))
}

#[test]
fn s1_sequential_values_sum_via_tuple_adapter() {
    let (out, store) = sink();
    resolve((3i32, 5i32, 6i32)).then(move |(a, b, c): (i32, i32, i32)| store(a + b + c));
    assert_eq!(out.load(Ordering::SeqCst), 14);
}

#[test]
fn s2_a_then_handler_returning_a_promise_joins_the_chain() {
    let (out, store) = sink();
    resolve(())
        .then(|| new_promise(|d| d.resolve((42i32,))))
        .then(move |x: i32| store(x + 1));
    assert_eq!(out.load(Ordering::SeqCst), 43);
}

#[test]
fn s3_typed_fail_routing_skips_mismatched_handlers() {
    let matched = Arc::new(AtomicUsize::new(0));
    let m2 = matched.clone();
    spark_promise::combinators::reject(("oops".to_string(),))
        .fail(|_n: i32| unreachable!("an i32 fail handler must not match a String reason"))
        .fail(move |s: String| m2.store(s.len(), Ordering::SeqCst));
    assert_eq!(matched.load(Ordering::SeqCst), 4);
}

#[test]
fn s4_all_sums_resolved_values_and_propagates_the_first_rejection() {
    let (out, store) = sink();
    all(vec![resolve((1i32,)), resolve((2i32,)), resolve((3i32,))]).then(move |v: Vec<AnyValue>| {
        let sum: i32 = v.iter().map(|e| e.downcast::<i32>().unwrap()).sum();
        store(sum);
    });
    assert_eq!(out.load(Ordering::SeqCst), 6);

    let rejected = Arc::new(AtomicUsize::new(0));
    let r2 = rejected.clone();
    all(vec![resolve((1i32,)), spark_promise::combinators::reject(("x".to_string(),)), resolve((3i32,))])
        .fail(move |reason: String| {
            assert_eq!(reason, "x");
            r2.store(1, Ordering::SeqCst);
        });
    assert_eq!(rejected.load(Ordering::SeqCst), 1);
}

#[test]
fn s5_race_and_reject_settles_with_the_fastest_child_and_rejects_the_rest() {
    let delayed = |millis: u64, value: i32| {
        new_promise(move |defer| {
            let defer = defer.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(millis));
                defer.resolve((value,));
            });
        })
    };

    let p10 = delayed(10, 1);
    let p20 = delayed(20, 2);
    let p30 = delayed(30, 3);

    let rejections = Arc::new(AtomicUsize::new(0));
    let r20 = rejections.clone();
    p20.fail(move |_: PromiseError| {
        r20.fetch_add(1, Ordering::SeqCst);
    });
    let r30 = rejections.clone();
    p30.fail(move |_: PromiseError| {
        r30.fetch_add(1, Ordering::SeqCst);
    });

    let (winner, store) = sink();
    race_and_reject(vec![p10, p20, p30]).then(move |v: i32| store(v));

    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(winner.load(Ordering::SeqCst), 1);
    assert_eq!(rejections.load(Ordering::SeqCst), 2);
}

#[test]
fn s6_do_while_breaks_at_the_target_count() {
    let (out, store) = sink();
    let counter = Arc::new(AtomicI32::new(0));
    let c2 = counter.clone();

    spark_promise::combinators::do_while(move |l| {
        let n = c2.fetch_add(1, Ordering::SeqCst) + 1;
        if n == 5 {
            l.do_break((n,));
        } else {
            l.do_continue(());
        }
    })
    .then(move |n: i32| store(n));

    assert_eq!(out.load(Ordering::SeqCst), 5);
    assert_eq!(counter.load(Ordering::SeqCst), 5);
}

#[test]
fn uncaught_rejection_on_a_never_pending_promise_is_harmless() {
    let p = new_pending_promise();
    p.reject(("abandoned".to_string(),));
}
