use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Counts the tasks spawned for the layer being crawled.
///
/// Every task holds a [`Ticket`], the layer is settled once all tickets are
/// dropped. The same barrier is reused for every layer of a crawl.
#[derive(Debug, Default)]
pub(crate) struct LayerBarrier {
    pending: Mutex<usize>,
    settled: Condvar,
}

impl LayerBarrier {
    pub fn register(self: &Arc<Self>) -> Ticket {
        *self.pending.lock() += 1;
        Ticket {
            barrier: self.clone(),
        }
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        *self.pending.lock()
    }

    /// Blocks until every registered ticket has been dropped.
    pub fn wait(&self) {
        let mut pending = self.pending.lock();
        while *pending > 0 {
            self.settled.wait(&mut pending);
        }
    }

    fn arrive(&self) {
        let mut pending = self.pending.lock();
        *pending -= 1;
        if *pending == 0 {
            self.settled.notify_all();
        }
    }
}

/// One outstanding unit of work, released on drop.
#[derive(Debug)]
pub(crate) struct Ticket {
    barrier: Arc<LayerBarrier>,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.barrier.arrive();
    }
}
