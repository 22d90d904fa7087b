//! `PromiseHolder`, `Task`, and the `drive` function that advances a
//! chain of continuations.
//!
//! Handlers run *without* holding the holder's mutex: the lock is
//! released before invoking user code and re-acquired only to commit the
//! outcome. This is the "explicit deferred-work drained after releasing
//! the lock" strategy the design notes call out as an alternative to a
//! re-entrant mutex, and it is the only structural departure from the
//! original state machine (see SPEC_FULL.md §9 and DESIGN.md).

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, Weak};

use arc_swap::{ArcSwap, ArcSwapWeak};
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::envelope::AnyValue;
use crate::handler::{HandlerFn, Outcome};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum SettleState {
    Pending,
    Resolved,
    Rejected,
}

/// One queued continuation. Handlers are cleared after invocation to
/// break closure cycles back through a captured `Defer`.
pub(crate) struct TaskSlot {
    pub(crate) state: Mutex<SettleState>,
    pub(crate) holder: ArcSwapWeak<PromiseHolder>,
    pub(crate) on_resolved: Mutex<Option<HandlerFn>>,
    pub(crate) on_rejected: Mutex<Option<HandlerFn>>,
}

impl TaskSlot {
    fn new(holder: &Arc<PromiseHolder>) -> Arc<TaskSlot> {
        Arc::new(TaskSlot {
            state: Mutex::new(SettleState::Pending),
            holder: ArcSwapWeak::new(Arc::downgrade(holder)),
            on_resolved: Mutex::new(None),
            on_rejected: Mutex::new(None),
        })
    }
}

/// Indirection target of a public `Promise`/`SharedPromise` handle,
/// redirectable in one atomic swap when its holder is joined into
/// another.
pub(crate) struct SharedPromiseInner {
    pub(crate) holder: ArcSwap<PromiseHolder>,
}

impl SharedPromiseInner {
    pub(crate) fn new(holder: Arc<PromiseHolder>) -> Arc<SharedPromiseInner> {
        Arc::new(SharedPromiseInner { holder: ArcSwap::new(holder) })
    }

    pub(crate) fn current(&self) -> Arc<PromiseHolder> {
        self.holder.load_full()
    }
}

pub(crate) struct HolderState {
    pub(crate) state: SettleState,
    pub(crate) value: AnyValue,
    pub(crate) pending_tasks: VecDeque<Arc<TaskSlot>>,
    pub(crate) owners: Vec<Weak<SharedPromiseInner>>,
}

/// Shared state of one deferred computation.
pub struct PromiseHolder {
    pub(crate) inner: Mutex<HolderState>,
    pub(crate) cond: Condvar,
}

impl PromiseHolder {
    fn pending() -> Arc<PromiseHolder> {
        Arc::new(PromiseHolder {
            inner: Mutex::new(HolderState {
                state: SettleState::Pending,
                value: AnyValue::empty(),
                pending_tasks: VecDeque::new(),
                owners: Vec::new(),
            }),
            cond: Condvar::new(),
        })
    }

    fn settled(state: SettleState, value: AnyValue) -> Arc<PromiseHolder> {
        Arc::new(PromiseHolder {
            inner: Mutex::new(HolderState { state, value, pending_tasks: VecDeque::new(), owners: Vec::new() }),
            cond: Condvar::new(),
        })
    }
}

impl Drop for PromiseHolder {
    fn drop(&mut self) {
        let (state, value) = {
            let guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            (guard.state, guard.value.clone())
        };
        if state == SettleState::Rejected {
            crate::uncaught::notify(value);
        }
    }
}

/// Creates the holder + first pass-through task pair backing a freshly
/// constructed promise, returning both so the caller (`new_promise`) can
/// build a `Defer` bound to the first task.
pub(crate) fn new_pending() -> (Arc<PromiseHolder>, Arc<TaskSlot>) {
    let holder = PromiseHolder::pending();
    let task = TaskSlot::new(&holder);
    holder.inner.lock().unwrap().pending_tasks.push_back(Arc::clone(&task));
    (holder, task)
}

pub(crate) fn new_settled(state: SettleState, value: AnyValue) -> Arc<PromiseHolder> {
    PromiseHolder::settled(state, value)
}

pub(crate) fn register_owner(holder: &Arc<PromiseHolder>, owner: &Arc<SharedPromiseInner>) {
    holder.inner.lock().unwrap().owners.push(Arc::downgrade(owner));
    check_owner_leak(holder);
}

fn check_owner_leak(holder: &Arc<PromiseHolder>) {
    let count = holder.inner.lock().unwrap().owners.len();
    if count > Config::global().owner_leak_threshold() {
        warn!(owner_count = count, "promise holder owner set is growing past the leak-detection threshold");
    }
}

/// Appends a new task to `holder`'s queue with the given handlers and
/// immediately drives it (handles the already-settled case where the
/// new task can run right away, including the case where the handler
/// returns a `Promise` and triggers a join).
///
/// The caller's eventual `Promise` handle is registered as an owner of
/// `holder` *before* driving, not built from the task's own
/// `ArcSwapWeak<PromiseHolder>` afterwards: a join drains and redirects
/// every owner of `holder`, but a task already popped off
/// `pending_tasks` (as this one is, by the time its handler runs) is
/// not among the entries `join` walks, so its own weak pointer is never
/// updated and can dangle once `holder` is deallocated. Riding along
/// as a registered owner gets this handle redirected by the same
/// mechanism every other live `Promise` clone relies on.
pub(crate) fn attach_task(
    holder: Arc<PromiseHolder>,
    on_resolved: Option<HandlerFn>,
    on_rejected: Option<HandlerFn>,
) -> Arc<SharedPromiseInner> {
    let shared = SharedPromiseInner::new(Arc::clone(&holder));
    register_owner(&holder, &shared);

    let task = TaskSlot::new(&holder);
    *task.on_resolved.lock().unwrap() = on_resolved;
    *task.on_rejected.lock().unwrap() = on_rejected;
    holder.inner.lock().unwrap().pending_tasks.push_back(Arc::clone(&task));

    drive(task);
    shared
}

/// Settles `task`'s holder (only if `task` is still pending) and drives
/// the chain. Shared by `Defer::resolve/reject` and `Promise::resolve/reject`.
pub(crate) fn settle_and_drive(task: &Arc<TaskSlot>, new_state: SettleState, value: AnyValue) {
    let Some(holder) = task.holder.load().upgrade() else { return };
    {
        let mut guard = holder.inner.lock().unwrap();
        if *task.state.lock().unwrap() != SettleState::Pending || guard.state != SettleState::Pending {
            return;
        }
        guard.state = new_state;
        guard.value = value;
        trace!(?new_state, "promise holder settled");
    }
    holder.cond.notify_all();
    drive(task.clone());
}

/// Advances the chain starting at `task`, looping across joins, until a
/// pending continuation is reached or the queue drains.
pub(crate) fn drive(mut task: Arc<TaskSlot>) {
    loop {
        let Some(mut holder) = task.holder.load().upgrade() else { return };

        let mut guard = holder.inner.lock().unwrap();
        if *task.state.lock().unwrap() != SettleState::Pending || guard.state == SettleState::Pending {
            return;
        }
        loop {
            match guard.pending_tasks.front() {
                Some(front) if Arc::ptr_eq(front, &task) => break,
                _ => {
                    guard = holder.cond.wait(guard).unwrap();
                    if *task.state.lock().unwrap() != SettleState::Pending {
                        return;
                    }
                }
            }
        }
        guard.pending_tasks.pop_front();
        let settle_state = guard.state;
        *task.state.lock().unwrap() = settle_state;

        let handler = if settle_state == SettleState::Resolved {
            task.on_resolved.lock().unwrap().take()
        } else {
            task.on_rejected.lock().unwrap().take()
        };
        task.on_resolved.lock().unwrap().take();
        task.on_rejected.lock().unwrap().take();

        let next_task = match handler {
            None => {
                debug!(?settle_state, "pass-through task, no handler attached");
                guard.pending_tasks.front().cloned()
            }
            Some(h) => {
                guard.state = SettleState::Pending;
                let input = guard.value.clone();
                drop(guard);

                let outcome = run_handler(h, input, settle_state);

                match outcome {
                    Outcome::Settled(state, value) => {
                        let mut guard = holder.inner.lock().unwrap();
                        guard.state = state;
                        guard.value = value;
                        trace!(?state, "task handler settled holder");
                        guard.pending_tasks.front().cloned()
                    }
                    Outcome::Join(promise) => {
                        let target = promise.holder_arc();
                        debug!("joining holder into handler-returned promise");
                        join(&target, &holder);
                        holder = target;
                        let guard = holder.inner.lock().unwrap();
                        guard.pending_tasks.front().cloned()
                    }
                }
            }
        };

        match next_task {
            Some(t) => task = t,
            None => return,
        }
    }
}

fn run_handler(handler: HandlerFn, input: AnyValue, branch: SettleState) -> Outcome {
    debug_assert!(branch != SettleState::Pending);
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(input))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(&payload);
            warn!(%message, "promise handler panicked");
            Outcome::Settled(
                SettleState::Rejected,
                AnyValue::new(crate::error::PromiseError::HandlerPanicked { message }),
            )
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Reassigns every pending task and owner of `right` onto `left`,
/// marking `right` terminally resolved and inert.
pub(crate) fn join(left: &Arc<PromiseHolder>, right: &Arc<PromiseHolder>) {
    if Arc::ptr_eq(left, right) {
        return;
    }
    let (drained_tasks, drained_owners) = {
        let mut right_guard = right.inner.lock().unwrap();
        let tasks: Vec<_> = right_guard.pending_tasks.drain(..).collect();
        let owners: Vec<_> = right_guard.owners.drain(..).collect();
        right_guard.state = SettleState::Resolved;
        (tasks, owners)
    };

    for t in &drained_tasks {
        t.holder.store(Arc::downgrade(left));
    }
    for o in &drained_owners {
        if let Some(owner) = o.upgrade() {
            owner.holder.store(Arc::clone(left));
        }
    }

    {
        let mut left_guard = left.inner.lock().unwrap();
        left_guard.pending_tasks.extend(drained_tasks);
        left_guard.owners.extend(drained_owners);
    }
    left.cond.notify_all();
    check_owner_leak(left);
}
