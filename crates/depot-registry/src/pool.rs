//! Bounded worker pool for background work.
//!
//! Jobs go through a bounded channel, so a slow consumer applies backpressure
//! to producers instead of growing an unbounded backlog.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{error, trace};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Count of submitted-but-unfinished jobs.
#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn begin(&self) {
        *self.count.lock() += 1;
    }

    fn finish(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// Fixed-size pool of named worker threads.
pub struct WorkerPool {
    name: String,
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    pending: Arc<Pending>,
}

impl WorkerPool {
    /// Spawn `threads` workers fed by a queue of depth `queue`.
    pub fn new(name: &str, threads: usize, queue: usize) -> std::io::Result<Self> {
        let (sender, receiver) = bounded::<Job>(queue.max(1));
        let pending = Arc::new(Pending::default());

        let mut workers = Vec::with_capacity(threads.max(1));
        for i in 0..threads.max(1) {
            let receiver = receiver.clone();
            let pending = Arc::clone(&pending);
            let thread_name = format!("{name}-{i}");
            let handle = std::thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || {
                    for job in receiver.iter() {
                        if catch_unwind(AssertUnwindSafe(job)).is_err() {
                            error!(worker = %thread_name, "background job panicked");
                        }
                        pending.finish();
                    }
                    trace!(worker = %thread_name, "worker exiting");
                })?;
            workers.push(handle);
        }

        Ok(WorkerPool {
            name: name.to_string(),
            sender: Some(sender),
            workers,
            pending,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a job, blocking while the queue is full.
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pending.begin();
        let sent = match &self.sender {
            Some(sender) => sender.send(Box::new(job)),
            None => {
                self.pending.finish();
                return;
            }
        };
        if let Err(rejected) = sent {
            // All workers are gone; run on the caller rather than drop it.
            (rejected.into_inner())();
            self.pending.finish();
        }
    }

    /// Block until every queued job has finished.
    ///
    /// Must not be called from inside a job.
    pub fn quiesce(&self) {
        let mut count = self.pending.count.lock();
        while *count > 0 {
            self.pending.idle.wait(&mut count);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
