//! Public promise handles: `Promise`, `Defer`, and `DeferLoop`.

use std::sync::Arc;

use tracing::trace;

use crate::envelope::{AnyValue, IntoArgsEnvelope};
use crate::handler::{IntoRejectedHandler, IntoResolvedHandler};
use crate::holder::{self, PromiseHolder, SettleState, SharedPromiseInner, TaskSlot};

/// The public value-type handle to a deferred computation. Cloning a
/// `Promise` shares the same underlying holder (through the
/// redirectable `SharedPromiseInner` indirection), not a snapshot.
#[derive(Clone)]
pub struct Promise {
    shared: Arc<SharedPromiseInner>,
}

impl Promise {
    fn from_holder(holder: Arc<PromiseHolder>) -> Self {
        let shared = SharedPromiseInner::new(holder.clone());
        holder::register_owner(&holder, &shared);
        Promise { shared }
    }

    pub(crate) fn holder_arc(&self) -> Arc<PromiseHolder> {
        self.shared.current()
    }

    /// Appends a resolved-branch continuation; a rejection passes
    /// through unchanged.
    pub fn then<F, M>(&self, f: F) -> Promise
    where
        F: IntoResolvedHandler<M> + Send + 'static,
    {
        let holder = self.holder_arc();
        let shared = holder::attach_task(holder, Some(f.into_resolved_handler()), None);
        Promise::from_shared(shared)
    }

    /// Appends both a resolved- and a rejected-branch continuation in
    /// one task.
    pub fn then_or_fail<FR, FJ, MR, MJ>(&self, on_resolved: FR, on_rejected: FJ) -> Promise
    where
        FR: IntoResolvedHandler<MR> + Send + 'static,
        FJ: IntoRejectedHandler<MJ> + Send + 'static,
    {
        let holder = self.holder_arc();
        let shared = holder::attach_task(
            holder,
            Some(on_resolved.into_resolved_handler()),
            Some(on_rejected.into_rejected_handler()),
        );
        Promise::from_shared(shared)
    }

    /// Appends a rejected-branch continuation; a resolution passes
    /// through unchanged.
    pub fn fail<F, M>(&self, f: F) -> Promise
    where
        F: IntoRejectedHandler<M> + Send + 'static,
    {
        let holder = self.holder_arc();
        let shared = holder::attach_task(holder, None, Some(f.into_rejected_handler()));
        Promise::from_shared(shared)
    }

    /// Registers the same handler on both branches.
    pub fn always<F, M>(&self, f: F) -> Promise
    where
        F: IntoResolvedHandler<M> + IntoRejectedHandler<M> + Clone + Send + 'static,
    {
        let holder = self.holder_arc();
        let resolved = f.clone().into_resolved_handler();
        let rejected = f.into_rejected_handler();
        let shared = holder::attach_task(holder, Some(resolved), Some(rejected));
        Promise::from_shared(shared)
    }

    /// Runs `h` for its side effect on either branch, discards its
    /// return value, and re-settles downstream with the *original*
    /// value or reason.
    pub fn finally<F>(&self, h: F) -> Promise
    where
        F: Fn() + Clone + Send + 'static,
    {
        let h_ok = h.clone();
        let h_err = h;
        self.then_or_fail(
            move |v: AnyValue| {
                h_ok();
                v
            },
            move |v: AnyValue| {
                h_err();
                // `fail`'s success path always resolves downstream (see
                // handler.rs); pairing it with `reject_raw` restores the
                // original rejected outcome instead of turning it into a
                // resolution.
                Promise::reject_raw(v)
            },
        )
    }

    /// Drops this handle's owning reference to the holder.
    pub fn clear(self) {}

    /// Wraps an owner already registered (and, if a join happened while
    /// driving its task, already redirected) against its holder.
    fn from_shared(shared: Arc<SharedPromiseInner>) -> Promise {
        Promise { shared }
    }

    /// Builds an already-rejected promise with no pending tasks; used by
    /// the uncaught-rejection hook and by `finally`'s rejected branch.
    pub(crate) fn reject_raw(reason: AnyValue) -> Promise {
        let holder = holder::new_settled(SettleState::Rejected, reason);
        Promise::from_holder(holder)
    }

    pub(crate) fn resolve_raw(value: AnyValue) -> Promise {
        let holder = holder::new_settled(SettleState::Resolved, value);
        Promise::from_holder(holder)
    }

    /// Externally drives a promise created with the zero-argument
    /// [`new_promise`]; a no-op if it has already settled.
    pub fn resolve<Args: IntoArgsEnvelope>(&self, args: Args) {
        if let Some(task) = self.first_task() {
            holder::settle_and_drive(&task, SettleState::Resolved, args.into_args_envelope());
        }
    }

    pub fn reject<Args: IntoArgsEnvelope>(&self, args: Args) {
        if let Some(task) = self.first_task() {
            holder::settle_and_drive(&task, SettleState::Rejected, args.into_args_envelope());
        }
    }

    fn first_task(&self) -> Option<Arc<TaskSlot>> {
        let holder = self.holder_arc();
        let guard = holder.inner.lock().unwrap();
        guard.pending_tasks.front().cloned()
    }
}

/// A single-shot resolver bound to one task, handed to the `run`
/// closure passed to [`new_promise`]. Cloning shares the same task: an
/// adapter that needs to move a resolver into a spawned thread or a
/// registered callback clones it rather than taking the `&Defer`
/// reference by value, matching the collaborator contract in
/// SPEC_FULL.md §6 ("capturing the `Defer` by value").
#[derive(Clone)]
pub struct Defer {
    task: Arc<TaskSlot>,
    promise: Promise,
}

impl Defer {
    pub fn resolve<Args: IntoArgsEnvelope>(&self, args: Args) {
        holder::settle_and_drive(&self.task, SettleState::Resolved, args.into_args_envelope());
    }

    pub fn reject<Args: IntoArgsEnvelope>(&self, args: Args) {
        holder::settle_and_drive(&self.task, SettleState::Rejected, args.into_args_envelope());
    }

    pub fn promise(&self) -> Promise {
        self.promise.clone()
    }
}

/// Internal marker type identifying a `do_while` break: the first
/// element of a two-element rejection sequence whose presence signals
/// loop termination to the driver in `combinators.rs`.
#[derive(Clone)]
pub(crate) struct DoBreakMarker;

/// A resolver specialised for one `do_while` iteration.
pub struct DeferLoop {
    defer: Defer,
}

impl DeferLoop {
    pub(crate) fn new(defer: Defer) -> Self {
        DeferLoop { defer }
    }

    /// Resolves this iteration; the loop driver will invoke the body
    /// again.
    pub fn do_continue<Args: IntoArgsEnvelope>(&self, args: Args) {
        self.defer.resolve(args);
    }

    /// Ends the loop, resolving the outer `do_while` promise with
    /// `args`.
    pub fn do_break<Args: IntoArgsEnvelope>(&self, args: Args) {
        let payload = args.into_args_envelope();
        self.defer.reject((DoBreakMarker, payload));
    }

    /// Fails the loop outright; the outer `do_while` promise rejects
    /// with `args`.
    pub fn reject<Args: IntoArgsEnvelope>(&self, args: Args) {
        self.defer.reject(args);
    }

    pub fn promise(&self) -> Promise {
        self.defer.promise()
    }
}

/// Allocates a pending promise, then synchronously invokes `run` with a
/// [`Defer`] bound to its initial task.
pub fn new_promise<F>(run: F) -> Promise
where
    F: FnOnce(&Defer),
{
    let (holder, task) = holder::new_pending();
    let promise = Promise::from_holder(holder);
    let defer = Defer { task, promise: promise.clone() };
    trace!("new_promise: invoking resolver");
    run(&defer);
    promise
}

/// Allocates a pending promise with no resolver; the caller drives it
/// later via [`Promise::resolve`]/[`Promise::reject`].
pub fn new_pending_promise() -> Promise {
    let (holder, _task) = holder::new_pending();
    Promise::from_holder(holder)
}
