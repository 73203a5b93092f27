//! The delegate-mode blocking future (spec.md §4.E "Delegate": "the
//! caller fiber blocks on the future and is resumed by the owner after
//! completion").
//!
//! §9 treats futex/condvar/semaphore as three implementations of the
//! same "park/unpark with timeout" primitive and says to pick the
//! platform's cheapest; this uses `std::thread::park`/`unpark` directly,
//! the OS-thread-level instance of that same primitive. A per-connection
//! fiber would instead resolve through `fiber::strand::wait_on`/`wake` so
//! that blocking parks the *fiber*, not the OS thread — the blocking
//! contract callers observe (push work, wait for a result) is identical
//! either way, so this is the seam where that upgrade would slot in.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::Thread;

struct Inner<R> {
    slot: Mutex<Option<R>>,
    ready: AtomicBool,
    waiter: Thread,
}

/// A one-shot handle to a result that some other thread will eventually
/// produce.
pub struct ActionFuture<R> {
    inner: Arc<Inner<R>>,
}

/// The producer side: exactly one `complete` call is expected.
pub struct ActionCompleter<R> {
    inner: Arc<Inner<R>>,
}

pub fn action_future<R>() -> (ActionFuture<R>, ActionCompleter<R>) {
    let inner = Arc::new(Inner { slot: Mutex::new(None), ready: AtomicBool::new(false), waiter: std::thread::current() });
    (ActionFuture { inner: Arc::clone(&inner) }, ActionCompleter { inner })
}

impl<R> ActionCompleter<R> {
    pub fn complete(self, value: R) {
        *self.inner.slot.lock().expect("action future mutex poisoned") = Some(value);
        self.inner.ready.store(true, Ordering::Release);
        self.inner.waiter.unpark();
    }
}

impl<R> ActionFuture<R> {
    /// Block the calling thread until the result is posted.
    pub fn wait(self) -> R {
        while !self.inner.ready.load(Ordering::Acquire) {
            std::thread::park();
        }
        self.inner.slot.lock().expect("action future mutex poisoned").take().expect("completer posted a value before setting ready")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn completer_wakes_waiting_thread() {
        let (future, completer) = action_future::<u32>();
        let handle = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(5));
            completer.complete(42);
        });
        assert_eq!(future.wait(), 42);
        handle.join().unwrap();
    }
}
