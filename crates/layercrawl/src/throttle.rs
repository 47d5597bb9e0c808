use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::CrawlError;
use crate::pool::{Job, WorkerPool};

/// Caps the number of fetches running against one host.
///
/// Jobs over the cap wait in FIFO order and are released by [`complete`].
///
/// [`complete`]: HostThrottle::complete
pub(crate) struct HostThrottle {
    limit: usize,
    pool: Arc<WorkerPool>,
    state: Mutex<ThrottleState>,
}

#[derive(Default)]
struct ThrottleState {
    active: usize,
    queued: VecDeque<Job>,
}

impl HostThrottle {
    pub fn new(limit: usize, pool: Arc<WorkerPool>) -> Self {
        Self {
            limit,
            pool,
            state: Mutex::new(ThrottleState::default()),
        }
    }

    pub fn admit(&self, job: Job) -> Result<(), CrawlError> {
        let mut state = self.state.lock();
        if state.active < self.limit {
            self.pool.submit(job)?;
            state.active += 1;
        } else {
            state.queued.push_back(job);
        }
        Ok(())
    }

    /// Frees the slot of a finished job, starting the next queued one if any.
    pub fn complete(&self) {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
        if state.active < self.limit {
            if let Some(job) = state.queued.pop_front() {
                match self.pool.submit(job) {
                    Ok(()) => state.active += 1,
                    Err(e) => log::error!("Dropping queued fetch: {e}"),
                }
            }
        }
    }

    /// Drops every queued job.
    pub fn clear(&self) {
        let queued = mem::take(&mut self.state.lock().queued);
        if !queued.is_empty() {
            log::debug!("Dropping {} queued fetches", queued.len());
        }
    }

    #[cfg(test)]
    fn active(&self) -> usize {
        self.state.lock().active
    }

    #[cfg(test)]
    fn queued(&self) -> usize {
        self.state.lock().queued.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn queue_over_limit() {
        let pool = Arc::new(WorkerPool::new("test", 4).unwrap());
        let throttle = HostThrottle::new(2, pool);
        let (tx_gate, rx_gate) = crossbeam_channel::unbounded::<()>();

        for _ in 0..5 {
            let rx_gate = rx_gate.clone();
            throttle
                .admit(Box::new(move || {
                    rx_gate.recv().ok();
                }))
                .unwrap();
        }

        assert_eq!(2, throttle.active());
        assert_eq!(3, throttle.queued());

        tx_gate.send(()).unwrap();
        throttle.complete();
        assert_eq!(2, throttle.active());
        assert_eq!(2, throttle.queued());

        drop(tx_gate);
        for _ in 0..4 {
            throttle.complete();
        }
        assert_eq!(0, throttle.queued());
    }

    #[test]
    fn fifo_release() {
        let pool = Arc::new(WorkerPool::new("test", 1).unwrap());
        let throttle = Arc::new(HostThrottle::new(1, pool));
        let (tx, rx) = crossbeam_channel::unbounded();

        for i in 0..5 {
            let tx = tx.clone();
            let throttle_c = throttle.clone();
            throttle
                .admit(Box::new(move || {
                    tx.send(i).unwrap();
                    throttle_c.complete();
                }))
                .unwrap();
        }

        assert_eq!(vec![0, 1, 2, 3, 4], rx.iter().take(5).collect::<Vec<_>>());
    }

    #[test]
    fn never_exceed_limit() {
        let pool = Arc::new(WorkerPool::new("test", 8).unwrap());
        let throttle = Arc::new(HostThrottle::new(3, pool));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = crossbeam_channel::unbounded();

        for _ in 0..20 {
            let throttle_c = throttle.clone();
            let running = running.clone();
            let peak = peak.clone();
            let tx = tx.clone();
            throttle
                .admit(Box::new(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(2));
                    running.fetch_sub(1, Ordering::SeqCst);
                    throttle_c.complete();
                    tx.send(()).unwrap();
                }))
                .unwrap();
        }

        rx.iter().take(20).for_each(drop);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }
}
