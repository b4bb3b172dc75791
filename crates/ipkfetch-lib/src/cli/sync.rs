use crate::cli::params::SyncParams;
use crate::download::HttpFetcher;
use crate::error::IpkFetchError;
use crate::extract::ArchiveExtractor;
use crate::sync::{DownloaderOptions, PackageDownloader, RunReport, RunStatus};
use std::path::Path;

pub async fn run_sync(params: SyncParams) -> Result<RunReport, IpkFetchError> {
    tracing::info!(
        repository = %params.repository,
        root = %params.root.display(),
        deploy_dir = %params.deploy_dir.display(),
        "Starting sync"
    );

    let fetcher = HttpFetcher::new(&params.download)?;
    let extractor = ArchiveExtractor::new(params.extract.clone());
    let downloader = PackageDownloader::new(
        DownloaderOptions {
            repository: params.repository.clone(),
            root: params.root.clone(),
            parallelism: params.download.parallelism,
        },
        fetcher,
        extractor,
    );

    let report = downloader
        .run(&params.build, &params.deploy, &params.deploy_dir)
        .await?;

    if let Some(report_path) = &params.report_path {
        write_report(&report, report_path)?;
    }

    match report.status {
        RunStatus::Complete => {
            tracing::info!("Sync completed successfully");
            Ok(report)
        }
        RunStatus::PartiallyFailed => {
            let failed = report.failed_packages();
            tracing::error!("Sync finished with {} failures", failed.len());
            Err(IpkFetchError::PartialFailure { failed })
        }
    }
}

fn write_report(report: &RunReport, path: &Path) -> Result<(), IpkFetchError> {
    let report_error = |reason: String| IpkFetchError::ReportWrite {
        path: path.to_path_buf(),
        reason,
    };

    let json = serde_json::to_string_pretty(report).map_err(|e| report_error(e.to_string()))?;
    std::fs::write(path, json).map_err(|e| report_error(e.to_string()))?;
    tracing::info!("Wrote run report to {}", path.display());
    Ok(())
}
