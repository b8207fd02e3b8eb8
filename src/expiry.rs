use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;

type ExpiryJob = Box<dyn FnOnce() + Send>;

struct ScheduledJob {
    deadline: Instant,
    seq: u64,
    job: ExpiryJob,
}

// Reversed so that the binary heap pops the earliest deadline first; the
// sequence number keeps equal deadlines in arming order.
impl Ord for ScheduledJob {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ScheduledJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ScheduledJob {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for ScheduledJob {}

struct SchedulerState {
    queue: BinaryHeap<ScheduledJob>,
    next_seq: u64,
    shutdown: bool,
}

/// One-shot timer queue backing TTL expiry. A single background thread per
/// scheduler runs each job at or after its deadline; the thread is detached
/// and never prevents process termination. Pending jobs are discarded on
/// shutdown.
pub(crate) struct ExpiryScheduler {
    state: Arc<(Mutex<SchedulerState>, Condvar)>,
}

impl ExpiryScheduler {
    pub(crate) fn new() -> Self {
        let state = Arc::new((
            Mutex::new(SchedulerState {
                queue: BinaryHeap::new(),
                next_seq: 0,
                shutdown: false,
            }),
            Condvar::new(),
        ));
        let thread_state = Arc::clone(&state);
        thread::spawn(move || run(thread_state));
        Self { state }
    }

    /// Arms a one-shot job to run `delay` from now. Ignored after shutdown.
    pub(crate) fn schedule(&self, delay: Duration, job: ExpiryJob) {
        let (lock, cond) = &*self.state;
        let mut state = lock.lock().unwrap();
        if state.shutdown {
            return;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push(ScheduledJob {
            deadline: Instant::now() + delay,
            seq,
            job,
        });
        cond.notify_one();
    }

    pub(crate) fn shutdown(&self) {
        let (lock, cond) = &*self.state;
        let mut state = lock.lock().unwrap();
        if !state.shutdown {
            state.shutdown = true;
            state.queue.clear();
            cond.notify_one();
        }
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(state: Arc<(Mutex<SchedulerState>, Condvar)>) {
    let (lock, cond) = &*state;
    let mut state = lock.lock().unwrap();
    loop {
        if state.shutdown {
            debug!("expiry scheduler shutting down");
            return;
        }
        let now = Instant::now();
        let next_deadline = state.queue.peek().map(|entry| entry.deadline);
        match next_deadline {
            Some(deadline) if deadline <= now => {
                if let Some(entry) = state.queue.pop() {
                    // run the job without holding the queue lock
                    drop(state);
                    (entry.job)();
                    state = lock.lock().unwrap();
                }
            }
            Some(deadline) => {
                state = cond.wait_timeout(state, deadline - now).unwrap().0;
            }
            None => {
                state = cond.wait(state).unwrap();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::channel;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::ExpiryScheduler;

    #[test]
    fn jobs_fire_in_deadline_order() {
        let scheduler = ExpiryScheduler::new();
        let (sender, receiver) = channel();

        let late = sender.clone();
        scheduler.schedule(
            Duration::from_millis(80),
            Box::new(move || {
                _ = late.send(2);
            }),
        );
        scheduler.schedule(
            Duration::from_millis(20),
            Box::new(move || {
                _ = sender.send(1);
            }),
        );

        assert_eq!(receiver.recv_timeout(Duration::from_secs(2)).unwrap(), 1);
        assert_eq!(receiver.recv_timeout(Duration::from_secs(2)).unwrap(), 2);
    }

    #[test]
    fn shutdown_discards_pending_jobs() {
        let scheduler = ExpiryScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        scheduler.schedule(
            Duration::from_millis(50),
            Box::new(move || {
                _ = counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        scheduler.shutdown();

        thread::sleep(Duration::from_millis(150));
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // arming after shutdown is a no-op
        let counter = Arc::clone(&fired);
        scheduler.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                _ = counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        thread::sleep(Duration::from_millis(100));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
