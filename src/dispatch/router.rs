//! Ties the three routing modes together behind one call shape: "run
//! this action against this partition, block until it's done" (spec.md
//! §4.E: "All three modes present the same blocking API to the caller;
//! they differ in who runs the critical section").

use std::sync::Arc;

use crate::primitives::Ring;
use crate::table::Partition;

use super::combiner::Combiner;
use super::future::action_future;
use super::mode::DispatchMode;

type Job = Box<dyn FnOnce() + Send>;

/// The owner side of delegate mode: every action destined for this
/// partition from a non-owner thread lands here; the owner's event loop
/// drains it once per turn (spec.md §4.E "Delegate").
pub struct DelegateInbox {
    ring: Ring<Job>,
}

impl DelegateInbox {
    pub fn new(capacity: usize) -> Self {
        Self { ring: Ring::with_capacity(capacity) }
    }

    fn push(&self, job: Job) {
        self.ring.enqueue(job);
    }

    /// Run every job currently queued. Called by the owning strand once
    /// per event-loop turn; never blocks.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        while let Some(job) = self.ring.try_dequeue() {
            job();
            ran += 1;
        }
        ran
    }
}

/// Per-partition routing state for the two non-direct modes. Built once
/// at start-up alongside the partition it serves.
pub struct PartitionRoute {
    mode: DispatchMode,
    inbox: Option<DelegateInbox>,
    combiner: Option<Combiner>,
}

impl PartitionRoute {
    pub fn new(mode: DispatchMode, queue_capacity: usize) -> Self {
        match mode {
            DispatchMode::Direct => Self { mode, inbox: None, combiner: None },
            DispatchMode::Delegate => Self { mode, inbox: Some(DelegateInbox::new(queue_capacity)), combiner: None },
            DispatchMode::Combine => Self { mode, inbox: None, combiner: Some(Combiner::new(queue_capacity)) },
        }
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Drain any pending delegate jobs for this partition. A no-op in
    /// the other two modes. Called once per event-loop turn by the
    /// owning strand.
    pub fn pump(&self) -> usize {
        match &self.inbox {
            Some(inbox) => inbox.drain(),
            None => 0,
        }
    }

    /// Run `action` against `partition`, routed per this partition's
    /// configured mode, blocking the caller until it completes.
    pub fn execute<R>(&self, partition: &Arc<Partition>, action: impl FnOnce(&Arc<Partition>) -> R + Send + 'static) -> R
    where
        R: Send + 'static,
    {
        match self.mode {
            DispatchMode::Direct => action(partition),
            DispatchMode::Delegate => {
                let inbox = self.inbox.as_ref().expect("delegate mode always carries an inbox");
                let (future, completer) = action_future();
                let partition = Arc::clone(partition);
                inbox.push(Box::new(move || completer.complete(action(&partition))));
                future.wait()
            }
            DispatchMode::Combine => {
                let combiner = self.combiner.as_ref().expect("combine mode always carries a combiner");
                let (future, completer) = action_future();
                let partition = Arc::clone(partition);
                combiner.submit(Box::new(move || completer.complete(action(&partition))));
                future.wait()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::hash_key;

    #[test]
    fn direct_mode_runs_inline() {
        let partition = Partition::new(0, 1, 1 << 20);
        let route = PartitionRoute::new(DispatchMode::Direct, 16);
        let hash = hash_key(b"k");
        route.execute(&partition, move |p| {
            p.insert(b"k", b"v", 0, 0, hash);
        });
        assert_eq!(partition.lookup(hash, b"k").unwrap().value(), b"v");
    }

    #[test]
    fn delegate_mode_requires_a_pump_to_complete() {
        let partition = Partition::new(0, 1, 1 << 20);
        let route = Arc::new(PartitionRoute::new(DispatchMode::Delegate, 16));
        let hash = hash_key(b"k");
        let route2 = Arc::clone(&route);
        let partition2 = Arc::clone(&partition);
        let handle = std::thread::spawn(move || {
            route2.execute(&partition2, move |p| {
                p.insert(b"k", b"v", 0, 0, hash);
            });
        });
        // Give the submitting thread a chance to enqueue before we pump.
        std::thread::sleep(std::time::Duration::from_millis(5));
        while route.pump() == 0 {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        handle.join().unwrap();
        assert_eq!(partition.lookup(hash, b"k").unwrap().value(), b"v");
    }
}
