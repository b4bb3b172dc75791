#[allow(clippy::module_inception)]
mod download;
mod pool;
mod types;

pub use download::HttpFetcher;
pub use pool::{Fetch, JobOutcome, PoolReport, WorkerPool, fetch_one};
pub use types::{DownloadJob, DownloadOptions};
