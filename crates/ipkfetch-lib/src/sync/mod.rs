mod downloader;
mod report;

pub use downloader::{
    DOWNLOADS_DIR, DestinationMode, DownloaderOptions, PackageDownloader, fetch_index,
    prepare_destination,
};
pub use report::{FailureStage, LinkFailure, PackageFailure, RunReport, RunStatus, SetReport};
