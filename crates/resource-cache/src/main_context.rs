//! The execution context that callbacks are delivered on.
//!
//! Resolutions run on the worker runtime, but callers expect to be notified on their own
//! "main" context. [`channel`] creates a [`MainContext`] handle which can be cloned into the
//! cache, and the [`MainLoop`] which the owner of the main context drives.

use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Creates a connected [`MainContext`] and [`MainLoop`].
pub fn channel() -> (MainContext, MainLoop) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (MainContext { sender }, MainLoop { receiver })
}

/// A handle to post jobs onto the main context.
#[derive(Debug, Clone)]
pub struct MainContext {
    sender: mpsc::UnboundedSender<Job>,
}

impl MainContext {
    /// Enqueues `job` to be run on the main context.
    ///
    /// Jobs run in the order they were posted. If the [`MainLoop`] is gone the job is dropped.
    pub fn post<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.sender.send(Box::new(job)).is_err() {
            tracing::warn!("Main loop is gone, dropping job");
        }
    }
}

/// Runs the jobs posted through [`MainContext`]s.
#[derive(Debug)]
pub struct MainLoop {
    receiver: mpsc::UnboundedReceiver<Job>,
}

impl MainLoop {
    /// Waits for the next job and runs it.
    ///
    /// Returns `false` once every [`MainContext`] is dropped and no jobs are left.
    pub async fn turn(&mut self) -> bool {
        match self.receiver.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Runs all jobs that are already queued, without waiting for new ones.
    ///
    /// Returns the number of jobs that were run.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.receiver.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Runs jobs until every [`MainContext`] is dropped.
    pub async fn run(mut self) {
        while self.turn().await {}
    }
}
