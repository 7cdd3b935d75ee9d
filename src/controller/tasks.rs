//! Operation pool
//!
//! Fixed set of worker threads running store/remove barriers off the
//! dispatch thread.

use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Sender};

use crate::error::Result;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct OperationPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl OperationPool {
    /// Start `size` workers
    pub fn new(size: usize) -> Result<Self> {
        let (sender, receiver) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(size);

        for i in 0..size {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("operation-{}", i))
                .spawn(move || {
                    for job in receiver.iter() {
                        job();
                    }
                })?;
            workers.push(handle);
        }

        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Queue a job; it runs as soon as a worker is free
    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(sender) = &self.sender {
            if sender.send(Box::new(job)).is_err() {
                tracing::error!("Operation pool is gone, job dropped");
            }
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for OperationPool {
    /// Close the queue and wait for in-flight barriers to finish
    fn drop(&mut self) {
        self.sender.take();
        let current = thread::current().id();
        for worker in self.workers.drain(..) {
            if worker.thread().id() != current {
                let _ = worker.join();
            }
        }
    }
}
