use super::types::DownloadJob;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Performs a single transfer for a job, returning the path written.
pub trait Fetch: Sync {
    fn fetch(&self, job: &DownloadJob) -> impl Future<Output = eyre::Result<PathBuf>> + Send;
}

#[derive(Debug)]
pub struct JobOutcome {
    pub job: DownloadJob,
    pub worker: usize,
    pub result: eyre::Result<PathBuf>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Default)]
pub struct PoolReport {
    pub outcomes: Vec<JobOutcome>,
}

impl PoolReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.is_success())
    }
}

/// A fixed number of workers draining one shared job queue.
#[derive(Clone, Copy, Debug)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs every job exactly once and returns after all workers have drained
    /// the queue. Failed jobs are recorded, never retried here.
    pub async fn run<F: Fetch>(&self, fetcher: &F, jobs: Vec<DownloadJob>) -> PoolReport {
        let total = jobs.len();
        let queue = Mutex::new(VecDeque::from(jobs));

        info!(jobs = total, workers = self.workers, "Starting downloads");

        let mut workers: FuturesUnordered<_> = (0..self.workers)
            .map(|worker| drain(worker, &queue, fetcher))
            .collect();

        let mut report = PoolReport::default();
        while let Some(outcomes) = workers.next().await {
            report.outcomes.extend(outcomes);
        }

        info!(
            succeeded = report.succeeded().count(),
            failed = report.failed().count(),
            "All download workers drained"
        );
        report
    }
}

fn next_job(queue: &Mutex<VecDeque<DownloadJob>>) -> Option<DownloadJob> {
    queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pop_front()
}

async fn drain<F: Fetch>(
    worker: usize,
    queue: &Mutex<VecDeque<DownloadJob>>,
    fetcher: &F,
) -> Vec<JobOutcome> {
    let mut outcomes = Vec::new();

    while let Some(job) = next_job(queue) {
        let result = fetcher.fetch(&job).await;
        match &result {
            Ok(path) => {
                info!(worker, url = %job.url, output = %path.display(), "Downloaded")
            }
            Err(err) => warn!(worker, url = %job.url, "Download failed: {:#}", err),
        }
        outcomes.push(JobOutcome {
            job,
            worker,
            result,
        });
    }

    debug!(worker, "Queue empty, worker done");
    outcomes
}

/// Downloads a single job outside of any pool.
pub async fn fetch_one<F: Fetch>(fetcher: &F, job: &DownloadJob) -> eyre::Result<PathBuf> {
    let path = fetcher.fetch(job).await?;
    info!(url = %job.url, output = %path.display(), "Downloaded");
    Ok(path)
}
