use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread,
};

use log::{debug, error};

use crate::error::{Error, Result};

/// Cancellation signal shared by the acceptor, its workers and whoever
/// wants to stop them.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fixed number of scoped worker threads running the same task.
#[derive(Debug)]
pub struct WorkerPool {
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        assert!(size > 0);
        Self { size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs `task(worker_id)` on every worker and waits for all of them.
    ///
    /// The first failing or panicking worker cancels `shutdown`; the others
    /// are expected to observe it and return. The first error is reported.
    pub fn run<F>(&self, shutdown: &Shutdown, task: F) -> Result<()>
    where
        F: Fn(usize) -> Result<()> + Sync,
    {
        let (sender, receiver) = mpsc::channel();
        let mut panicked = None;

        thread::scope(|s| {
            let workers: Vec<Worker> = (0..self.size)
                .map(|id| Worker::spawn(s, id, &task, shutdown, sender.clone()))
                .collect();
            drop(sender);

            for worker in workers {
                if worker.thread.join().is_err() {
                    error!("worker {} panicked", worker.id);
                    panicked.get_or_insert(Error::WorkerPanic(worker.id));
                } else {
                    debug!("worker {} stopped", worker.id);
                }
            }
        });

        match receiver.try_recv() {
            Ok(err) => Err(err),
            Err(_) => panicked.map_or(Ok(()), Err),
        }
    }
}

struct Worker<'scope> {
    id: usize,
    thread: thread::ScopedJoinHandle<'scope, ()>,
}

impl<'scope> Worker<'scope> {
    fn spawn<'env, F>(
        s: &'scope thread::Scope<'scope, 'env>,
        id: usize,
        task: &'scope F,
        shutdown: &'scope Shutdown,
        errors: mpsc::Sender<Error>,
    ) -> Self
    where
        F: Fn(usize) -> Result<()> + Sync,
    {
        let thread = s.spawn(move || {
            let _guard = CancelOnPanic(shutdown);
            debug!("worker {id} started");
            if let Err(err) = task(id) {
                error!("worker {id}: {err}");
                shutdown.cancel();
                // The receiver outlives every worker.
                let _ = errors.send(err);
            }
        });

        Self { id, thread }
    }
}

struct CancelOnPanic<'a>(&'a Shutdown);

impl Drop for CancelOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.cancel();
        }
    }
}
