use super::types::{IndexError, IndexRecord, PackageName};
use crate::download::DownloadJob;
use std::path::Path;
use url::Url;

/// File name of the index below the repository base URL.
pub const INDEX_FILE_NAME: &str = "Packages";

const PRIORITY_MARKER: &str = "Priority:";

/// A `Packages` index held in memory so that repeated lookups don't re-read the file.
#[derive(Clone, Debug)]
pub struct PackageIndex {
    text: String,
}

/// Outcome of resolving a list of package names against an index.
#[derive(Debug, Default)]
pub struct Resolution {
    pub jobs: Vec<DownloadJob>,
    pub failures: Vec<(PackageName, IndexError)>,
}

impl PackageIndex {
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let text = std::fs::read_to_string(path).map_err(|source| IndexError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_text(text))
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Finds the block for `name`.
    ///
    /// The block starts at the line `Package: <name>` and runs up to and
    /// including the first following line that mentions `Priority:`. A blank
    /// line or the end of the file also closes it.
    pub fn lookup(&self, name: &str) -> Result<IndexRecord, IndexError> {
        let header = format!("Package: {name}");
        let mut block: Option<String> = None;

        for line in self.text.lines() {
            match block.as_mut() {
                None => {
                    if line == header {
                        block = Some(format!("{line}\n"));
                    }
                }
                Some(accumulated) => {
                    if line.trim().is_empty() {
                        break;
                    }
                    accumulated.push_str(line);
                    accumulated.push('\n');
                    if line.contains(PRIORITY_MARKER) {
                        break;
                    }
                }
            }
        }

        let block = block.ok_or_else(|| IndexError::PackageNotFound {
            package: name.to_string(),
        })?;
        IndexRecord::parse(name, &block)
    }
}

fn as_directory(repository: &Url) -> Url {
    let mut base = repository.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

pub fn index_url(repository: &Url) -> Result<Url, IndexError> {
    as_directory(repository)
        .join(INDEX_FILE_NAME)
        .map_err(|e| IndexError::InvalidUrl {
            package: INDEX_FILE_NAME.to_string(),
            base: repository.to_string(),
            reason: e.to_string(),
        })
}

/// Appends the record's `Filename` to the repository base URL.
pub fn resolve_url(repository: &Url, record: &IndexRecord) -> Result<Url, IndexError> {
    let filename = record.filename();
    let relative = filename.strip_prefix("./").unwrap_or(filename);
    let relative = relative.trim_start_matches('/');

    as_directory(repository)
        .join(relative)
        .map_err(|e| IndexError::InvalidUrl {
            package: record.package().to_string(),
            base: repository.to_string(),
            reason: e.to_string(),
        })
}

/// Builds one download job per resolvable package. Every job saves its
/// artifact under the package name inside `directory`.
pub fn resolve_jobs(
    index: &PackageIndex,
    repository: &Url,
    packages: &[PackageName],
    directory: &Path,
) -> Resolution {
    let mut resolution = Resolution::default();

    for package in packages {
        let resolved = index
            .lookup(package)
            .and_then(|record| resolve_url(repository, &record));
        match resolved {
            Ok(url) => {
                tracing::debug!(package = %package, url = %url, "Resolved package");
                resolution.jobs.push(DownloadJob {
                    url,
                    file_name: package.clone(),
                    directory: directory.to_path_buf(),
                });
            }
            Err(err) => {
                tracing::error!(package = %package, "Failed to resolve package: {}", err);
                resolution.failures.push((package.clone(), err));
            }
        }
    }

    resolution
}
