//! The per-thread cooperative scheduler (spec.md §4.C "Scheduling
//! model"). Exactly one `Strand` per OS thread; fibers spawned on it
//! never migrate elsewhere.
//!
//! Grounded in the teacher crate's thread-local-binding idiom (one
//! global accessor per subsystem, §9: "bind them to a thread-local once
//! on entry and retrieve through a single accessor") combined with the
//! 32-bin bitmap run-queue this spec calls for.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use super::context::{Context, Stack, DEFAULT_STACK_SIZE};
use super::timerqueue::TimerQueue;
use super::waitset::WaitSet;

pub type FiberId = u32;

const NUM_PRIORITY_BINS: usize = 32;
const NONE: FiberId = FiberId::MAX;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum RunState {
    Runnable,
    Blocked,
    Dead,
}

struct FiberRecord {
    context: Box<Context>,
    state: RunState,
    priority: u8,
}

/// A 32-bin priority run-queue. Bit `i` of `bitmap` is set iff bin `i` is
/// non-empty; picking the next fiber is a trailing-zero-count. No aging.
struct RunQueue {
    bins: [VecDeque<FiberId>; NUM_PRIORITY_BINS],
    bitmap: u32,
}

impl RunQueue {
    fn new() -> Self {
        Self { bins: std::array::from_fn(|_| VecDeque::new()), bitmap: 0 }
    }

    fn push(&mut self, priority: u8, id: FiberId) {
        let bin = (priority as usize).min(NUM_PRIORITY_BINS - 1);
        self.bins[bin].push_back(id);
        self.bitmap |= 1 << bin;
    }

    fn pop(&mut self) -> Option<FiberId> {
        if self.bitmap == 0 {
            return None;
        }
        let bin = self.bitmap.trailing_zeros() as usize;
        let id = self.bins[bin].pop_front();
        if self.bins[bin].is_empty() {
            self.bitmap &= !(1 << bin);
        }
        id
    }

    fn is_empty(&self) -> bool {
        self.bitmap == 0
    }
}

/// The per-thread fiber scheduler.
pub struct Strand {
    fibers: Vec<Option<FiberRecord>>,
    free_ids: Vec<FiberId>,
    run_queue: RunQueue,
    current: Cell<FiberId>,
    scheduler_context: Box<Context>,
    timers: RefCell<TimerQueue>,
    shutdown: Cell<bool>,
}

thread_local! {
    static CURRENT: RefCell<Option<*const Strand>> = const { RefCell::new(None) };
}

impl Strand {
    pub fn new(now_ms: u64) -> Box<Self> {
        let strand = Box::new(Self {
            fibers: Vec::new(),
            free_ids: Vec::new(),
            run_queue: RunQueue::new(),
            current: Cell::new(NONE),
            scheduler_context: Box::new(Context::scheduler()),
            timers: RefCell::new(TimerQueue::new(16, 64, now_ms)),
            shutdown: Cell::new(false),
        });
        CURRENT.with(|c| *c.borrow_mut() = Some(strand.as_ref() as *const Strand));
        strand
    }

    /// Access the strand bound to the current OS thread. Panics if
    /// called off a strand-owning thread — every worker thread binds
    /// one via `Strand::new` before running fibers.
    pub fn with_current<R>(f: impl FnOnce(&Strand) -> R) -> R {
        CURRENT.with(|c| {
            let ptr = c.borrow().expect("no Strand bound on this thread");
            f(unsafe { &*ptr })
        })
    }

    /// Allocate fiber state for `entry(arg)` and push it onto the
    /// run-queue. `entry` must not return — fiber bodies end by calling
    /// `Strand::exit_current`.
    pub fn spawn(&mut self, entry: fn(usize), arg: usize, priority: u8) -> FiberId {
        let stack = Stack::new(DEFAULT_STACK_SIZE);
        let context = Box::new(Context::new(stack, entry as usize, arg));
        let record = FiberRecord { context, state: RunState::Runnable, priority };
        let id = match self.free_ids.pop() {
            Some(id) => {
                self.fibers[id as usize] = Some(record);
                id
            }
            None => {
                self.fibers.push(Some(record));
                (self.fibers.len() - 1) as FiberId
            }
        };
        self.run_queue.push(priority, id);
        id
    }

    /// Run one scheduling step: pop the next runnable fiber and switch
    /// into it. Returns `false` if there was nothing to run.
    pub fn run_once(&mut self) -> bool {
        let Some(id) = self.run_queue.pop() else { return false };
        self.current.set(id);
        let (sched_ptr, fiber_ptr) = {
            let record = self.fibers[id as usize].as_ref().expect("scheduled fiber record missing");
            (self.scheduler_context.as_mut() as *mut Context, record.context.as_ref() as *const Context)
        };
        unsafe { Context::switch(sched_ptr, fiber_ptr) };
        self.current.set(NONE);

        let dead = matches!(self.fibers[id as usize].as_ref().unwrap().state, RunState::Dead);
        if dead {
            self.fibers[id as usize] = None;
            self.free_ids.push(id);
        } else if matches!(self.fibers[id as usize].as_ref().unwrap().state, RunState::Runnable) {
            let priority = self.fibers[id as usize].as_ref().unwrap().priority;
            self.run_queue.push(priority, id);
        }
        true
    }

    pub fn has_runnable(&self) -> bool {
        !self.run_queue.is_empty()
    }

    /// Advance the timer queue, waking any fiber whose deadline passed.
    pub fn pump_timers(&mut self, now_ms: u64) {
        let fired = self.timers.borrow_mut().advance(now_ms);
        for id in fired {
            self.wake(id);
        }
    }

    pub fn next_timer_deadline(&self) -> Option<u64> {
        self.timers.borrow().get_min()
    }

    /// Currently-running fiber, valid only while called from fiber
    /// context (i.e. between a `run_once` switch-in and switch-out).
    fn current_id(&self) -> FiberId {
        let id = self.current.get();
        assert_ne!(id, NONE, "yield/block called off a running fiber");
        id
    }

    /// `yield()`: push the current fiber at the tail of its bin, switch
    /// back to the scheduler; resumes on the next `run_once` turn.
    pub fn yield_now(&self) {
        let id = self.current_id();
        self.switch_to_scheduler(id, RunState::Runnable);
    }

    /// `block()`: mark the current fiber blocked and switch back to the
    /// scheduler. It resumes only via an explicit `wake`.
    pub fn block(&self) {
        let id = self.current_id();
        self.switch_to_scheduler(id, RunState::Blocked);
    }

    /// `wait_on(waitset)`: enqueue the current fiber and block.
    pub fn wait_on(&self, waitset: &WaitSet) {
        let id = self.current_id();
        waitset.park(id);
        self.block();
    }

    /// `sleep(timeout)`: install a timer entry that wakes the fiber,
    /// then block.
    pub fn sleep(&self, now_ms: u64, timeout_ms: u64) {
        let id = self.current_id();
        self.timers.borrow_mut().insert(now_ms + timeout_ms, id);
        self.block();
    }

    /// Mark `id` runnable and push it back onto the run-queue. Waking a
    /// fiber that isn't blocked is a programmer error (spec.md §4.C
    /// "double-wake of a non-blocked fiber").
    pub fn wake(&self, id: FiberId) {
        // SAFETY-by-convention: `Strand` methods are only ever called
        // from the single OS thread that owns it, so `&self` access
        // here never races with the mutation `run_once` performs.
        let strand = unsafe { &mut *(self as *const Strand as *mut Strand) };
        let record = strand.fibers[id as usize].as_mut().expect("wake of a reaped fiber");
        assert_eq!(record.state, RunState::Blocked, "double-wake of a non-blocked fiber");
        record.state = RunState::Runnable;
        let priority = record.priority;
        strand.run_queue.push(priority, id);
    }

    /// Called from within the running fiber's own code to terminate it.
    pub fn exit_current(&self) -> ! {
        let id = self.current_id();
        let strand = unsafe { &mut *(self as *const Strand as *mut Strand) };
        strand.fibers[id as usize].as_mut().unwrap().state = RunState::Dead;
        let sched_ptr = strand.scheduler_context.as_ref() as *const Context;
        let fiber_ptr = strand.fibers[id as usize].as_ref().unwrap().context.as_mut() as *mut Context;
        unsafe {
            Context::switch(fiber_ptr, sched_ptr);
        }
        unreachable!("a dead fiber's context must never be switched back into")
    }

    fn switch_to_scheduler(&self, id: FiberId, new_state: RunState) {
        let strand = unsafe { &mut *(self as *const Strand as *mut Strand) };
        strand.fibers[id as usize].as_mut().unwrap().state = new_state;
        let sched_ptr = strand.scheduler_context.as_ref() as *const Context;
        let fiber_ptr = strand.fibers[id as usize].as_ref().unwrap().context.as_ref() as *const Context;
        unsafe {
            Context::switch(fiber_ptr as *mut Context, sched_ptr);
        }
    }

    pub fn request_shutdown(&self) {
        self.shutdown.set(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn bump_and_exit(_arg: usize) {
        COUNTER.fetch_add(1, Ordering::SeqCst);
        Strand::with_current(|s| s.yield_now());
        COUNTER.fetch_add(1, Ordering::SeqCst);
        Strand::with_current(|s| s.exit_current());
    }

    #[test]
    fn spawned_fiber_runs_yields_and_exits() {
        COUNTER.store(0, Ordering::SeqCst);
        let mut strand = Strand::new(0);
        strand.spawn(bump_and_exit as fn(usize), 0, 16);
        assert!(strand.run_once()); // runs until first yield
        assert_eq!(COUNTER.load(Ordering::SeqCst), 1);
        assert!(strand.run_once()); // resumes, runs to completion
        assert_eq!(COUNTER.load(Ordering::SeqCst), 2);
        assert!(!strand.has_runnable());
    }

    #[test]
    fn run_queue_is_fifo_within_a_priority_bin() {
        let mut rq = RunQueue::new();
        rq.push(5, 1);
        rq.push(5, 2);
        rq.push(5, 3);
        assert_eq!(rq.pop(), Some(1));
        assert_eq!(rq.pop(), Some(2));
        assert_eq!(rq.pop(), Some(3));
        assert_eq!(rq.pop(), None);
    }

    #[test]
    fn run_queue_prefers_lower_numbered_bins() {
        let mut rq = RunQueue::new();
        rq.push(10, 100);
        rq.push(0, 200);
        assert_eq!(rq.pop(), Some(200));
        assert_eq!(rq.pop(), Some(100));
    }
}
