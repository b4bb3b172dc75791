use crate::config::PackageSet;
use crate::download::DownloadOptions;
use crate::extract::ExtractOptions;
use std::path::PathBuf;
use url::Url;

#[derive(Debug, Clone)]
pub struct SyncParams {
    pub repository: Url,
    pub root: PathBuf,
    pub deploy_dir: PathBuf,
    pub build: PackageSet,
    pub deploy: PackageSet,
    pub download: DownloadOptions,
    pub extract: ExtractOptions,
    pub report_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolveParams {
    pub repository: Url,
    pub index_path: Option<PathBuf>,
    pub packages: Vec<String>,
    pub show_fields: bool,
    pub download: DownloadOptions,
}
