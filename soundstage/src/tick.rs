//! Game-loop integration.
//!
//! The engine never owns a timer. The host's game loop calls [`TickConsumer::update`] on
//! every attached consumer once per tick, through whatever [`TickScheduler`] it provides.
//! [`TickLoop`] is a minimal scheduler for hosts without a loop of their own.

use crate::sync::lock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Receives one `update` call per game tick.
pub trait TickConsumer: Send + Sync {
    fn update(&self);
}

/// Host loop that consumers can attach to and detach from at any time, including from
/// inside their own `update`.
pub trait TickScheduler: Send + Sync {
    fn attach(&self, consumer: Arc<dyn TickConsumer>);

    /// Detaches `consumer`, matched by identity. Unknown consumers are ignored.
    fn detach(&self, consumer: &Arc<dyn TickConsumer>);
}

/// Compares two consumers by the address of their data, ignoring vtables.
pub(crate) fn same_consumer(a: &Arc<dyn TickConsumer>, b: &Arc<dyn TickConsumer>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Scheduler driven by explicit [`tick`](TickLoop::tick) calls.
#[derive(Default)]
pub struct TickLoop {
    consumers: Mutex<Vec<Arc<dyn TickConsumer>>>,
    ticks: AtomicU64,
}

impl TickLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one tick on a snapshot of the attached consumers.
    pub fn tick(&self) {
        let consumers = lock(&self.consumers).clone();
        for consumer in consumers {
            consumer.update();
        }
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn consumer_count(&self) -> usize {
        lock(&self.consumers).len()
    }

    /// Total ticks run so far
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl TickScheduler for TickLoop {
    fn attach(&self, consumer: Arc<dyn TickConsumer>) {
        let mut consumers = lock(&self.consumers);
        if !consumers.iter().any(|c| same_consumer(c, &consumer)) {
            consumers.push(consumer);
        }
    }

    fn detach(&self, consumer: &Arc<dyn TickConsumer>) {
        lock(&self.consumers).retain(|c| !same_consumer(c, consumer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Weak;
    use std::sync::atomic::AtomicUsize;

    struct Counter {
        count: AtomicUsize,
        detach_after: usize,
        scheduler: Weak<TickLoop>,
        this: Weak<Counter>,
    }

    impl TickConsumer for Counter {
        fn update(&self) {
            let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;
            if count == self.detach_after {
                if let (Some(scheduler), Some(this)) = (self.scheduler.upgrade(), self.this.upgrade())
                {
                    let this: Arc<dyn TickConsumer> = this;
                    scheduler.detach(&this);
                }
            }
        }
    }

    #[test]
    fn test_consumer_can_detach_itself() {
        let ticks = Arc::new(TickLoop::new());
        let counter = Arc::new_cyclic(|this| Counter {
            count: AtomicUsize::new(0),
            detach_after: 2,
            scheduler: Arc::downgrade(&ticks),
            this: this.clone(),
        });

        ticks.attach(counter.clone());
        ticks.attach(counter.clone());
        assert_eq!(ticks.consumer_count(), 1);

        for _ in 0..5 {
            ticks.tick();
        }
        assert_eq!(counter.count.load(Ordering::SeqCst), 2);
        assert_eq!(ticks.consumer_count(), 0);
        assert_eq!(ticks.ticks(), 5);
    }
}
