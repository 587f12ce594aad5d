use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

#[derive(Debug, Default)]
struct BusyCounter {
    active: usize,
    generation: u64,
}

/// Reference-counted busy indicator shared by every suspending operation.
/// The published flag only drops back to idle once the last holder leaves.
/// `reset` starts a new generation; guards from earlier generations no
/// longer count when they drop.
#[derive(Debug)]
pub struct BusyTracker {
    counter: Mutex<BusyCounter>,
    sender: watch::Sender<bool>,
}

impl Default for BusyTracker {
    fn default() -> Self {
        let (sender, _receiver) = watch::channel(false);
        Self {
            counter: Mutex::new(BusyCounter::default()),
            sender,
        }
    }
}

impl BusyTracker {
    pub fn enter(self: &Arc<Self>) -> BusyGuard {
        let generation = self.increment();
        BusyGuard {
            tracker: Arc::clone(self),
            generation,
        }
    }

    pub fn is_busy(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn active_operations(&self) -> usize {
        self.counter().active
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    pub fn reset(&self) {
        let mut counter = self.counter();
        counter.active = 0;
        counter.generation += 1;
        self.sender.send_replace(false);
    }

    fn counter(&self) -> MutexGuard<'_, BusyCounter> {
        self.counter.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn increment(&self) -> u64 {
        let mut counter = self.counter();
        counter.active += 1;
        if counter.active == 1 {
            self.sender.send_replace(true);
        }
        counter.generation
    }

    fn decrement(&self, generation: u64) {
        let mut counter = self.counter();
        if counter.generation != generation {
            return;
        }
        counter.active = counter.active.saturating_sub(1);
        if counter.active == 0 {
            self.sender.send_replace(false);
        }
    }
}

#[must_use = "the operation counts as busy only while the guard is alive"]
#[derive(Debug)]
pub struct BusyGuard {
    tracker: Arc<BusyTracker>,
    generation: u64,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.tracker.decrement(self.generation);
    }
}
