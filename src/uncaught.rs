//! Process-wide uncaught-rejection hook. A holder that drops while still
//! rejected (see `Drop for PromiseHolder` in `holder.rs`) routes its
//! reason here instead of silently discarding it.

use std::cell::Cell;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::error;

use crate::envelope::AnyValue;
use crate::promise::Promise;

type Hook = Arc<dyn Fn(Promise) + Send + Sync>;

static HOOK: OnceLock<Mutex<Option<Hook>>> = OnceLock::new();

thread_local! {
    // Guards against a hook whose own promise construction drops another
    // rejected holder, which would otherwise recurse back in here.
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
}

/// Installs the process-wide handler invoked for every promise that is
/// dropped while still rejected. Replaces any previously installed hook.
pub fn handle_uncaught_exception<F>(f: F)
where
    F: Fn(Promise) + Send + Sync + 'static,
{
    let slot = HOOK.get_or_init(|| Mutex::new(None));
    *slot.lock().unwrap() = Some(Arc::new(f));
}

pub(crate) fn notify(reason: AnyValue) {
    if IN_HOOK.with(Cell::get) {
        return;
    }
    IN_HOOK.with(|f| f.set(true));
    struct ResetOnDrop;
    impl Drop for ResetOnDrop {
        fn drop(&mut self) {
            IN_HOOK.with(|f| f.set(false));
        }
    }
    let _reset = ResetOnDrop;

    let hook = HOOK.get_or_init(|| Mutex::new(None)).lock().unwrap().clone();
    let promise = Promise::reject_raw(reason);
    match hook {
        Some(h) => h(promise),
        None => default_hook(promise),
    }
}

/// Logs the reason and attaches a `fail` handler so the rejected promise
/// built for the hook doesn't itself recurse back into `notify` on drop.
fn default_hook(promise: Promise) {
    promise.fail(|reason: AnyValue| {
        error!(?reason, "uncaught promise rejection");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn default_hook_does_not_panic_or_recurse() {
        notify(AnyValue::new("boom".to_string()));
    }

    #[test]
    fn installed_hook_observes_the_reason() {
        static SEEN: AtomicBool = AtomicBool::new(false);
        handle_uncaught_exception(|p: Promise| {
            p.fail(|_: AnyValue| {
                SEEN.store(true, Ordering::SeqCst);
            });
        });
        notify(AnyValue::new(1i32));
        assert!(SEEN.load(Ordering::SeqCst));
    }
}
