use crate::cli::args::Command;
use crate::cli::params::{ResolveParams, SyncParams};
use crate::config::load_config;
use crate::download::DownloadOptions;
use crate::error::IpkFetchError;
use crate::extract::ExtractOptions;
use chrono::Datelike;
use std::path::{Path, PathBuf};

const DEFAULT_DEPLOY_DIR: &str = "extra_libs";

#[derive(Debug, Clone)]
pub enum ResolvedCommand {
    Sync(SyncParams),
    Resolve(ResolveParams),
}

fn root_below(home: &Path, year: i32) -> PathBuf {
    home.join("wpilib")
        .join(year.to_string())
        .join("roborio")
        .join(format!("arm-frc{year}-linux-gnueabi"))
}

/// Toolchain root used when neither the command line nor the config names one.
pub fn default_root(year: Option<i32>) -> Result<PathBuf, IpkFetchError> {
    let year = year.unwrap_or_else(|| chrono::Local::now().year());
    let home = dirs::home_dir().ok_or_else(|| IpkFetchError::CliArgumentValidation {
        details: "Cannot determine home directory. Pass --root or configure root.".to_string(),
    })?;
    Ok(root_below(&home, year))
}

pub fn resolve_command(command: Command) -> Result<ResolvedCommand, IpkFetchError> {
    match command {
        Command::Sync {
            config_path,
            root,
            deploy_dir,
            year,
            parallelism,
            report_path,
        } => {
            if parallelism == Some(0) {
                return Err(IpkFetchError::CliArgumentValidation {
                    details: "parallelism must be greater than 0.".to_string(),
                });
            }

            let app_config = load_config(&config_path)?;

            if app_config.build.packages.is_empty() && app_config.deploy.packages.is_empty() {
                return Err(IpkFetchError::ConfigValidation {
                    details: "No packages defined in build or deploy sets".to_string(),
                });
            }

            let root = match root.map(PathBuf::from).or_else(|| app_config.root.clone()) {
                Some(root) => root,
                None => default_root(year)?,
            };
            let deploy_dir = deploy_dir
                .map(PathBuf::from)
                .or_else(|| app_config.deploy_dir.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DEPLOY_DIR));

            let mut download = DownloadOptions::from(&app_config.download);
            if let Some(parallelism) = parallelism {
                download.parallelism = parallelism;
            }

            Ok(ResolvedCommand::Sync(SyncParams {
                repository: app_config.repository,
                root,
                deploy_dir,
                build: app_config.build,
                deploy: app_config.deploy,
                download,
                extract: ExtractOptions::from(&app_config.extract),
                report_path: report_path.map(PathBuf::from),
            }))
        }
        Command::Resolve {
            config_path,
            index_path,
            packages,
            show_fields,
        } => {
            if packages.is_empty() {
                return Err(IpkFetchError::CliArgumentValidation {
                    details: "No packages given to resolve.".to_string(),
                });
            }

            let app_config = load_config(&config_path)?;

            Ok(ResolvedCommand::Resolve(ResolveParams {
                repository: app_config.repository,
                index_path: index_path.map(PathBuf::from),
                packages,
                show_fields,
                download: DownloadOptions::from(&app_config.download),
            }))
        }
    }
}
