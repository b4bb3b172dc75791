use crate::download::DownloadOptions;
use crate::extract::ExtractOptions;
use crate::links::LinkSpec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Base URL of the feed; `Packages` and every `Filename` live below it.
    pub repository: Url,
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub deploy_dir: Option<PathBuf>,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub build: PackageSet,
    #[serde(default)]
    pub deploy: PackageSet,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSet {
    #[serde(default)]
    pub packages: Vec<Arc<str>>,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DownloadConfig {
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default)]
    pub max_retries: usize,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractConfig {
    #[serde(default = "default_ar_program")]
    pub ar_program: PathBuf,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

fn default_parallelism() -> usize {
    DownloadOptions::default().parallelism
}

fn default_ar_program() -> PathBuf {
    ExtractOptions::default().ar_program
}

fn default_settle_delay_ms() -> u64 {
    ExtractOptions::default().settle_delay.as_millis() as u64
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            max_retries: 0,
            timeout_secs: None,
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            ar_program: default_ar_program(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

impl From<&DownloadConfig> for DownloadOptions {
    fn from(value: &DownloadConfig) -> Self {
        Self {
            parallelism: value.parallelism,
            max_retries: value.max_retries,
            timeout: value.timeout_secs.map(Duration::from_secs),
        }
    }
}

impl From<&ExtractConfig> for ExtractOptions {
    fn from(value: &ExtractConfig) -> Self {
        Self {
            ar_program: value.ar_program.clone(),
            settle_delay: Duration::from_millis(value.settle_delay_ms),
        }
    }
}
