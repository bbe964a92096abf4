use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, mpsc},
    thread,
};

use log::{debug, error};

use super::pool::{PoolError, PoolStats};

/// A unit of work; returns whether it succeeded.
pub type Job = Box<dyn FnOnce() -> bool + Send + 'static>;

/// Fixed set of worker threads fed through a rendezvous channel.
///
/// [`ThreadPool::execute`] only returns once an idle worker has taken the job, so a
/// busy pool pushes back on its caller instead of queueing work. Each worker keeps its
/// own tally of job results and hands it back when joined.
#[derive(Debug)]
pub struct ThreadPool {
    workers: Vec<Worker>,
    sender: Option<mpsc::SyncSender<Job>>,
}

impl ThreadPool {
    pub fn new(size: usize) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::EmptyPool);
        }

        let mut workers = Vec::with_capacity(size);
        let (sender, receiver) = mpsc::sync_channel(0);

        let receiver = Arc::new(Mutex::new(receiver));
        let sender = Some(sender);

        for i in 0..size {
            workers.push(Worker::new(i, Arc::clone(&receiver))?);
        }

        Ok(Self { workers, sender })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Hand `f` to the next idle worker, blocking until one is available.
    pub fn execute<F>(&self, f: F) -> Result<(), PoolError>
    where
        F: FnOnce() -> bool + Send + 'static,
    {
        let job = Box::new(f);
        self.sender
            .as_ref()
            .ok_or(PoolError::ShutDown)?
            .send(job)
            .map_err(|_| PoolError::ShutDown)
    }

    /// Stop accepting jobs, wait for running ones and sum the worker tallies.
    pub fn shutdown(mut self) -> PoolStats {
        self.join()
    }

    fn join(&mut self) -> PoolStats {
        drop(self.sender.take());

        let mut stats = PoolStats::default();
        for worker in self.workers.drain(..) {
            debug!("shutting down worker {}", worker.id);

            match worker.thread.join() {
                Ok(tally) => stats += tally,
                Err(_) => error!("worker {} exited abnormally", worker.id),
            }
        }
        stats
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.join();
    }
}

#[derive(Debug)]
struct Worker {
    id: usize,
    thread: thread::JoinHandle<PoolStats>,
}

impl Worker {
    fn new(id: usize, receiver: Arc<Mutex<mpsc::Receiver<Job>>>) -> Result<Self, PoolError> {
        let thread = thread::Builder::new()
            .name(format!("worker-{id}"))
            .spawn(move || {
                let mut tally = PoolStats::default();
                loop {
                    let msg = match receiver.lock() {
                        Ok(receiver) => receiver.recv(),
                        Err(_) => {
                            error!("worker {id}: job queue lock poisoned");
                            break;
                        }
                    };

                    match msg {
                        Ok(job) => {
                            debug!("worker {id} handling a connection!");
                            let success = panic::catch_unwind(AssertUnwindSafe(job))
                                .unwrap_or_else(|_| {
                                    error!("worker {id}: job panicked");
                                    false
                                });
                            tally.record(success);
                        }
                        Err(_) => {
                            debug!("worker {id} disconnected!");
                            break;
                        }
                    }
                }
                tally
            })?;

        Ok(Self { id, thread })
    }
}
