use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::jobs::{Job, JobDispatcher, JobOutcome, run_job};
use crate::media::MediaBackend;

/// Fixed-size pool of threads executing [`Job`]s against a media backend.
///
/// Outcomes are posted to `results`; a worker exits once that receiver is
/// gone or the pool is dropped.
pub struct WorkerPool {
    jobs: Option<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl WorkerPool {
    pub fn spawn<T>(count: usize, backend: Arc<dyn MediaBackend>, results: mpsc::Sender<T>) -> Self
    where
        T: From<JobOutcome> + Send + 'static,
    {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        let workers = (0..count.max(1))
            .map(|worker| {
                let job_rx = Arc::clone(&job_rx);
                let backend = Arc::clone(&backend);
                let results = results.clone();
                thread::Builder::new()
                    .name(format!("playback-worker-{worker}"))
                    .spawn(move || {
                        loop {
                            let job = job_rx.lock().recv();
                            let Ok(job) = job else {
                                return;
                            };
                            let outcome = run_job(backend.as_ref(), job);
                            if results.send(T::from(outcome)).is_err() {
                                return;
                            }
                        }
                    })
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(error) => {
                    warn!(%error, "failed to spawn worker thread");
                    None
                }
            })
            .collect::<Vec<_>>();
        debug!(workers = workers.len(), "worker pool started");

        Self {
            jobs: Some(job_tx),
            workers,
        }
    }
}

impl JobDispatcher for WorkerPool {
    fn dispatch(&mut self, job: Job) {
        let Some(jobs) = &self.jobs else {
            return;
        };
        if let Err(mpsc::SendError(job)) = jobs.send(job) {
            warn!(request = ?job.request(), "worker pool stopped, dropping job");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.jobs = None;
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
