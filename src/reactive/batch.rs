//! Notification batching.
//!
//! Inside [`batch`], cell notifications are queued instead of delivered.
//! When the outermost batch returns, each queued cell notifies its
//! subscribers once with its final value. Batching is per thread: a change
//! delivered by a bridge task on another thread is never held back.

use std::cell::RefCell;

type Job = Box<dyn FnOnce()>;

#[derive(Default)]
struct Pending {
    depth: usize,
    jobs: Vec<(usize, Job)>,
}

thread_local! {
    static PENDING: RefCell<Pending> = RefCell::new(Pending::default());
}

/// RAII guard for one batch level. Flushes when the outermost level ends.
struct BatchGuard;

impl BatchGuard {
    fn enter() -> Self {
        PENDING.with(|pending| pending.borrow_mut().depth += 1);
        Self
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let jobs = PENDING.with(|pending| {
            let mut pending = pending.borrow_mut();
            pending.depth -= 1;
            if pending.depth == 0 {
                std::mem::take(&mut pending.jobs)
            } else {
                Vec::new()
            }
        });

        // A panicking batch drops its queued notifications.
        if std::thread::panicking() {
            return;
        }

        // Jobs run with the queue released so they can schedule again.
        for (_, job) in jobs {
            job();
        }
    }
}

/// Runs `f` with cell notifications deferred until it returns.
///
/// Nested calls join the outer batch. A cell changed several times inside
/// a batch notifies once.
///
/// # Example
///
/// ```
/// use crux::reactive::{ReactiveCell, batch};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let cell = ReactiveCell::new(0);
/// let calls = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&calls);
/// let _sub = cell.subscribe(move |_| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// batch(|| {
///     cell.set(1);
///     cell.set(2);
/// });
/// assert_eq!(calls.load(Ordering::SeqCst), 1);
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _guard = BatchGuard::enter();
    f()
}

/// Whether the current thread is inside a [`batch`].
pub fn is_batching() -> bool {
    PENDING.with(|pending| pending.borrow().depth > 0)
}

/// Runs `job` now, or queues it under `id` if a batch is open.
///
/// Only the first job queued for an `id` is kept.
pub(crate) fn schedule(id: usize, job: impl FnOnce() + 'static) {
    let job = PENDING.with(|pending| {
        let mut pending = pending.borrow_mut();
        if pending.depth == 0 {
            return Some(job);
        }
        if !pending.jobs.iter().any(|(queued, _)| *queued == id) {
            pending.jobs.push((id, Box::new(job)));
        }
        None
    });

    if let Some(job) = job {
        job();
    }
}
