#![cfg(any(loom, spark_loom))]

//! Model-checks the mutex+condvar ready-queue pattern `holder::drive` is
//! built on: a task only runs once it is at the front of the queue, and
//! every waiter sees the settlement regardless of scheduling order.
//!
//! `PromiseHolder` itself cannot be swapped onto `loom::sync` types because
//! it is built on `arc_swap::ArcSwapWeak`, which has no loom-instrumented
//! counterpart; this test isolates the one pattern that matters for
//! correctness (condvar-guarded FIFO draining under a plain mutex) rather
//! than attempting to loom-check the whole holder graph.

use loom::sync::{Arc, Condvar, Mutex};
use loom::thread;

struct ReadyQueue {
    front: Mutex<usize>,
    cond: Condvar,
}

impl ReadyQueue {
    fn new() -> Self {
        ReadyQueue { front: Mutex::new(0), cond: Condvar::new() }
    }

    /// Blocks until `ticket` is at the front, then advances it — the same
    /// "wait until I'm the front task, pop, commit" shape `drive` uses.
    fn take_turn(&self, ticket: usize, order: &Mutex<Vec<usize>>) {
        let mut front = self.front.lock().unwrap();
        while *front != ticket {
            front = self.cond.wait(front).unwrap();
        }
        order.lock().unwrap().push(ticket);
        *front += 1;
        self.cond.notify_all();
    }
}

#[test]
fn tasks_run_in_ticket_order_regardless_of_thread_scheduling() {
    loom::model(|| {
        let queue = Arc::new(ReadyQueue::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let q1 = queue.clone();
        let o1 = order.clone();
        let second = thread::spawn(move || q1.take_turn(1, &o1));

        queue.take_turn(0, &order);
        second.join().unwrap();

        assert_eq!(*order.lock().unwrap(), vec![0, 1]);
    });
}
