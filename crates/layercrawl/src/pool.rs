use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::error::CrawlError;

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed number of named threads running submitted jobs.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    name: &'static str,
    tx_job: Sender<Job>,
    rx_job: Receiver<Job>,
    tx_stop: Sender<()>,
    state: Mutex<PoolState>,
}

#[derive(Debug)]
struct PoolState {
    closed: bool,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(name: &'static str, size: usize) -> Result<Self, CrawlError> {
        let (tx_job, rx_job) = crossbeam_channel::unbounded::<Job>();
        let (tx_stop, rx_stop) = crossbeam_channel::unbounded::<()>();

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let rx_job = rx_job.clone();
            let rx_stop = rx_stop.clone();
            let worker = thread::Builder::new()
                .name(format!("{name}-{id}"))
                .spawn(move || work(name, rx_job, rx_stop))?;
            workers.push(worker);
        }
        log::debug!("Started {size} {name} workers");

        Ok(Self {
            name,
            tx_job,
            rx_job,
            tx_stop,
            state: Mutex::new(PoolState {
                closed: false,
                workers,
            }),
        })
    }

    /// Queues `job`, it runs as soon as a worker is idle.
    pub fn submit(&self, job: Job) -> Result<(), CrawlError> {
        // Held across the send so no job lands in the queue after its drain
        let state = self.state.lock();
        if state.closed {
            return Err(CrawlError::ShutDown);
        }
        self.tx_job.send(job).map_err(|_| CrawlError::ShutDown)
    }

    /// Refuses further jobs, workers keep running the queued ones.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    /// Stops every worker once its current job is done, joins them and drops
    /// the jobs left in the queue.
    pub fn shutdown(&self) {
        let workers = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.workers)
        };
        if workers.is_empty() {
            return;
        }
        for _ in 0..workers.len() {
            self.tx_stop.send(()).ok();
        }
        let current = thread::current().id();
        for worker in workers {
            // The last handle on a pool may be dropped by one of its own jobs
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                log::error!("A {} worker panicked", self.name);
            }
        }
        let dropped = self.rx_job.try_iter().count();
        if dropped > 0 {
            log::debug!("Dropped {dropped} pending {} jobs", self.name);
        }
        log::debug!("Stopped {} workers", self.name);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn work(name: &str, rx_job: Receiver<Job>, rx_stop: Receiver<()>) {
    loop {
        crossbeam_channel::select! {
            recv(rx_job) -> job => {
                if let Ok(job) = job {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                        log::error!("A {name} job panicked: {}", panic_message(&*payload));
                    }
                } else {
                    break
                }
            },
            recv(rx_stop) -> _ => break
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        String::from("unknown panic")
    }
}
