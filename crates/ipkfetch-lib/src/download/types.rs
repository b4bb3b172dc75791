use crate::index::PackageName;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadJob {
    pub url: Url,
    pub file_name: PackageName,
    pub directory: PathBuf,
}

impl DownloadJob {
    pub fn output_path(&self) -> PathBuf {
        self.directory.join(self.file_name.as_ref())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DownloadOptions {
    pub parallelism: usize,
    pub max_retries: usize,
    pub timeout: Option<Duration>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            parallelism: 10,
            max_retries: 0,
            timeout: None,
        }
    }
}
