use super::report::{FailureStage, LinkFailure, RunReport, SetReport};
use crate::config::PackageSet;
use crate::download::{DownloadJob, Fetch, WorkerPool, fetch_one};
use crate::error::IpkFetchError;
use crate::extract::ArchiveExtractor;
use crate::index::{INDEX_FILE_NAME, PackageIndex, PackageName, index_url, resolve_jobs};
use crate::links::make_links;
use itertools::Itertools;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Directory below the root that keeps the index and the raw artifacts.
pub const DOWNLOADS_DIR: &str = "downloads";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DestinationMode {
    /// Create the directory if missing, keep whatever is in it.
    Keep,
    /// Remove the directory and its contents, then create it empty.
    Clear,
}

pub fn prepare_destination(dir: &Path, mode: DestinationMode) -> Result<(), IpkFetchError> {
    let setup_error = |e: std::io::Error| IpkFetchError::DestinationSetup {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    };

    if mode == DestinationMode::Clear && dir.symlink_metadata().is_ok() {
        tracing::info!("Clearing {}", dir.display());
        std::fs::remove_dir_all(dir).map_err(setup_error)?;
    }
    std::fs::create_dir_all(dir).map_err(setup_error)
}

/// Downloads `{repository}/Packages` into `directory` and loads it.
pub async fn fetch_index<F: Fetch>(
    fetcher: &F,
    repository: &Url,
    directory: &Path,
) -> Result<PackageIndex, IpkFetchError> {
    let url = index_url(repository)?;
    let job = DownloadJob {
        url: url.clone(),
        file_name: Arc::from(INDEX_FILE_NAME),
        directory: directory.to_path_buf(),
    };

    let path = fetch_one(fetcher, &job)
        .await
        .map_err(|e| IpkFetchError::IndexFetch {
            url: url.to_string(),
            reason: format!("{:#}", e),
        })?;
    Ok(PackageIndex::load(&path)?)
}

/// Absolute form of `path` with symlinks and `..` resolved. The existing
/// prefix is canonicalized, the missing remainder is resolved lexically.
fn resolved_path(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut resolved = PathBuf::new();
    let mut exists = true;

    for component in absolute.components() {
        if exists {
            match resolved.join(component).canonicalize() {
                Ok(canonical) => {
                    resolved = canonical;
                    continue;
                }
                Err(_) => exists = false,
            }
        }
        match component {
            Component::ParentDir => {
                resolved.pop();
            }
            Component::CurDir => {}
            other => resolved.push(other),
        }
    }

    Ok(resolved)
}

#[derive(Clone, Debug)]
pub struct DownloaderOptions {
    pub repository: Url,
    pub root: PathBuf,
    pub parallelism: usize,
}

/// Fetches package sets from one repository: index, downloads, extraction and links.
pub struct PackageDownloader<F> {
    options: DownloaderOptions,
    fetcher: F,
    extractor: ArchiveExtractor,
    pool: WorkerPool,
}

impl<F: Fetch> PackageDownloader<F> {
    pub fn new(options: DownloaderOptions, fetcher: F, extractor: ArchiveExtractor) -> Self {
        let pool = WorkerPool::new(options.parallelism);
        Self {
            options,
            fetcher,
            extractor,
            pool,
        }
    }

    pub fn download_dir(&self) -> PathBuf {
        self.options.root.join(DOWNLOADS_DIR)
    }

    /// Downloads `{repository}/Packages` into the downloads directory and loads it.
    pub async fn fetch_index(&self) -> Result<PackageIndex, IpkFetchError> {
        fetch_index(&self.fetcher, &self.options.repository, &self.download_dir()).await
    }

    /// Runs the whole pipeline for one package set, unpacking into `dest`.
    ///
    /// Only setup problems (downloads directory, index) are returned as
    /// errors. Per-package and per-link failures end up in the report.
    pub async fn download_packages(
        &self,
        name: &str,
        set: &PackageSet,
        dest: &Path,
    ) -> Result<SetReport, IpkFetchError> {
        let download_dir = self.download_dir();
        std::fs::create_dir_all(&download_dir).map_err(|e| {
            IpkFetchError::DownloadDirectoryCreation {
                path: download_dir.clone(),
                reason: e.to_string(),
            }
        })?;

        // The same name twice would have two workers writing one file.
        let packages: Vec<PackageName> = set.packages.iter().unique().cloned().collect();
        let mut report = SetReport::new(name, dest.to_path_buf(), packages.clone());

        tracing::info!("Fetching package index for {} set...", name);
        let index = self.fetch_index().await?;

        let resolution = resolve_jobs(
            &index,
            &self.options.repository,
            &packages,
            &download_dir,
        );
        for (package, err) in resolution.failures {
            report.fail(package, FailureStage::Resolve, err.to_string());
        }

        tracing::info!("Downloading {} packages...", resolution.jobs.len());
        let pool_report = self.pool.run(&self.fetcher, resolution.jobs).await;
        let mut downloaded = HashSet::new();
        for outcome in pool_report.outcomes {
            match outcome.result {
                Ok(_) => {
                    downloaded.insert(outcome.job.file_name);
                }
                Err(err) => report.fail(
                    outcome.job.file_name,
                    FailureStage::Download,
                    format!("{:#}", err),
                ),
            }
        }

        tracing::info!("All files downloaded, unarchiving into {}", dest.display());
        for package in packages.iter().filter(|p| downloaded.contains(*p)) {
            match self.extractor.extract(package, &download_dir, dest).await {
                Ok(_) => report.installed.push(package.clone()),
                Err(err) => {
                    tracing::error!(package = %package, "Error unarchiving: {}", err);
                    report.fail(package.clone(), FailureStage::Extract, err.to_string());
                }
            }
        }

        let links = make_links(dest, &set.links);
        report.links_created = links.created.len();
        report.links_skipped = links.skipped.len();
        report.link_failures = links
            .failed
            .into_iter()
            .map(|(spec, err)| LinkFailure {
                link: spec.link,
                reason: err.to_string(),
            })
            .collect();

        Ok(report)
    }

    /// Installs the build set into the root, then the deploy set into a
    /// freshly emptied `deploy_dir`.
    pub async fn run(
        &self,
        build: &PackageSet,
        deploy: &PackageSet,
        deploy_dir: &Path,
    ) -> Result<RunReport, IpkFetchError> {
        self.check_deploy_dir(deploy_dir)?;

        let root = self.options.root.clone();
        prepare_destination(&root, DestinationMode::Keep)?;
        tracing::info!("Downloading build packages into {}", root.display());
        let build_report = self.download_packages("build", build, &root).await?;
        tracing::info!("{}", build_report);

        prepare_destination(deploy_dir, DestinationMode::Clear)?;
        tracing::info!("Downloading deploy packages into {}", deploy_dir.display());
        let deploy_report = self.download_packages("deploy", deploy, deploy_dir).await?;
        tracing::info!("{}", deploy_report);

        Ok(RunReport::new(vec![build_report, deploy_report]))
    }

    /// The deploy directory gets wiped, so it must not contain the root.
    fn check_deploy_dir(&self, deploy_dir: &Path) -> Result<(), IpkFetchError> {
        let resolve = |path: &Path| {
            resolved_path(path).map_err(|e| IpkFetchError::DestinationSetup {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        };
        let root = resolve(&self.options.root)?;
        let deploy = resolve(deploy_dir)?;

        if root.starts_with(&deploy) {
            return Err(IpkFetchError::DestinationSetup {
                path: deploy_dir.to_path_buf(),
                reason: format!(
                    "deploy directory would be cleared but contains the root {}",
                    root.display()
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractOptions;
    use crate::extract::test_support::{ipk, require_ar};
    use crate::links::LinkSpec;
    use crate::sync::RunStatus;
    use eyre::eyre;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    const REPO: &str = "http://example/repo";

    const INDEX: &str = "\
Package: pkgA
Version: 1.0
Filename: a/pkgA_1.0.ipk
Priority: optional

Package: pkgB
Version: 2.0
Filename: b/pkgB_2.0.ipk
Priority: optional

Package: broken
Version: 0.1
Filename: b/broken_0.1.ipk
Priority: optional

Package: offline
Version: 0.1
Filename: o/offline_0.1.ipk
Priority: optional
";

    /// Serves fixed bodies by URL and records every request.
    #[derive(Default)]
    struct FakeRepository {
        files: HashMap<String, Vec<u8>>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeRepository {
        fn with_file(mut self, rel: &str, body: impl Into<Vec<u8>>) -> Self {
            self.files.insert(format!("{REPO}/{rel}"), body.into());
            self
        }

        fn standard() -> Self {
            Self::default()
                .with_file("Packages", INDEX)
                .with_file("a/pkgA_1.0.ipk", ipk(&[("./usr/lib/libA.so.1", b"A")]))
                .with_file("b/pkgB_2.0.ipk", ipk(&[("./usr/lib/libB.so.2", b"B")]))
                .with_file("b/broken_0.1.ipk", b"this is not an ar archive".to_vec())
        }
    }

    impl Fetch for FakeRepository {
        async fn fetch(&self, job: &DownloadJob) -> eyre::Result<PathBuf> {
            self.requests.lock().unwrap().push(job.url.to_string());
            let body = self
                .files
                .get(job.url.as_str())
                .ok_or_else(|| eyre!("404 Not Found: {}", job.url))?;
            let path = job.output_path();
            tokio::fs::write(&path, body).await?;
            Ok(path)
        }
    }

    fn downloader(root: &Path, repository: FakeRepository) -> PackageDownloader<FakeRepository> {
        PackageDownloader::new(
            DownloaderOptions {
                repository: Url::parse(REPO).unwrap(),
                root: root.to_path_buf(),
                parallelism: 3,
            },
            repository,
            ArchiveExtractor::new(ExtractOptions {
                settle_delay: Duration::ZERO,
                ..ExtractOptions::default()
            }),
        )
    }

    fn set(packages: &[&str], links: Vec<LinkSpec>) -> PackageSet {
        PackageSet {
            packages: packages.iter().map(|p| Arc::from(*p)).collect(),
            links,
        }
    }

    #[test]
    fn test_prepare_destination_clear_removes_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let deploy = dir.path().join("extra_libs");
        std::fs::create_dir_all(deploy.join("nested")).unwrap();
        std::fs::write(deploy.join("stale.so"), b"old").unwrap();
        std::fs::write(deploy.join("nested/stale.so"), b"old").unwrap();

        prepare_destination(&deploy, DestinationMode::Clear).unwrap();

        assert!(deploy.is_dir());
        assert_eq!(std::fs::read_dir(&deploy).unwrap().count(), 0);
    }

    #[test]
    fn test_prepare_destination_keep_preserves_contents() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("sysroot");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("existing"), b"keep").unwrap();

        prepare_destination(&root, DestinationMode::Keep).unwrap();
        prepare_destination(&dir.path().join("fresh/nested"), DestinationMode::Keep).unwrap();

        assert_eq!(std::fs::read(root.join("existing")).unwrap(), b"keep");
        assert!(dir.path().join("fresh/nested").is_dir());
    }

    #[tokio::test]
    async fn test_download_packages_resolves_and_requests_urls() {
        require_ar();
        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(dir.path(), FakeRepository::standard());

        let report = downloader
            .download_packages("build", &set(&["pkgA", "pkgB"], vec![]), dir.path())
            .await
            .unwrap();

        let mut requests = downloader.fetcher.requests.lock().unwrap().clone();
        requests.sort();
        assert_eq!(
            requests,
            vec![
                "http://example/repo/Packages",
                "http://example/repo/a/pkgA_1.0.ipk",
                "http://example/repo/b/pkgB_2.0.ipk",
            ]
        );
        let downloads = dir.path().join(DOWNLOADS_DIR);
        assert!(downloads.join(INDEX_FILE_NAME).is_file());
        assert!(downloads.join("pkgA").is_file());
        assert!(downloads.join("pkgB").is_file());

        assert_eq!(report.status(), RunStatus::Complete, "{report:?}");
        assert_eq!(
            std::fs::read(dir.path().join("usr/lib/libA.so.1")).unwrap(),
            b"A"
        );
        assert_eq!(
            std::fs::read(dir.path().join("usr/lib/libB.so.2")).unwrap(),
            b"B"
        );
    }

    #[tokio::test]
    async fn test_failures_are_recorded_per_stage() {
        require_ar();
        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(dir.path(), FakeRepository::standard());

        let report = downloader
            .download_packages(
                "build",
                &set(&["missing", "offline", "broken", "pkgA", "pkgB"], vec![]),
                dir.path(),
            )
            .await
            .unwrap();

        assert_eq!(report.status(), RunStatus::PartiallyFailed);
        let at = |stage| {
            report
                .failures_at(stage)
                .map(|failure| failure.package.to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(at(FailureStage::Resolve), vec!["missing"]);
        assert_eq!(at(FailureStage::Download), vec!["offline"]);

        // One broken archive must not stop the packages after it.
        assert_eq!(at(FailureStage::Extract), vec!["broken"]);
        assert_eq!(
            report.installed,
            vec![Arc::<str>::from("pkgA"), Arc::from("pkgB")]
        );
    }

    #[tokio::test]
    async fn test_index_fetch_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let repository = FakeRepository::default().with_file("a/pkgA_1.0.ipk", b"x".to_vec());
        let downloader = downloader(dir.path(), repository);

        let result = downloader
            .download_packages("build", &set(&["pkgA"], vec![]), dir.path())
            .await;

        assert!(
            matches!(result, Err(IpkFetchError::IndexFetch { .. })),
            "{result:?}"
        );
    }

    #[tokio::test]
    async fn test_duplicate_package_names_download_once() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(dir.path(), FakeRepository::standard());

        let report = downloader
            .download_packages("build", &set(&["pkgA", "pkgA"], vec![]), dir.path())
            .await
            .unwrap();

        assert_eq!(report.requested, vec![Arc::<str>::from("pkgA")]);
        let requests = downloader.fetcher.requests.lock().unwrap();
        assert_eq!(
            requests
                .iter()
                .filter(|url| url.ends_with("pkgA_1.0.ipk"))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_run_clears_deploy_dir_and_makes_links() {
        require_ar();
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("sysroot");
        let deploy_dir = dir.path().join("extra_libs");
        std::fs::create_dir_all(&deploy_dir).unwrap();
        std::fs::write(deploy_dir.join("stale.so"), b"old").unwrap();
        let downloader = downloader(&root, FakeRepository::standard());

        let report = downloader
            .run(
                &set(
                    &["pkgA"],
                    vec![LinkSpec::new("usr/lib/libA.so", "usr/lib/libA.so.1")],
                ),
                &set(
                    &["pkgB"],
                    vec![LinkSpec::new("usr/lib/libB.so", "usr/lib/libB.so.2")],
                ),
                &deploy_dir,
            )
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Complete, "{report:?}");
        assert!(!deploy_dir.join("stale.so").exists());
        assert_eq!(std::fs::read(root.join("usr/lib/libA.so")).unwrap(), b"A");
        assert_eq!(
            std::fs::read(deploy_dir.join("usr/lib/libB.so")).unwrap(),
            b"B"
        );
        assert!(!deploy_dir.join("usr/lib/libA.so.1").exists());
        assert!(root.join(DOWNLOADS_DIR).join("pkgB").is_file());
    }

    #[tokio::test]
    async fn test_run_refuses_parent_of_root_spelled_with_dotdot() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("sysroot");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("precious"), b"keep").unwrap();
        let downloader = downloader(&root, FakeRepository::standard());

        for deploy_dir in [root.join(".."), root.join("."), root.join("usr/../..")] {
            let result = downloader
                .run(&set(&[], vec![]), &set(&[], vec![]), &deploy_dir)
                .await;

            assert!(
                matches!(result, Err(IpkFetchError::DestinationSetup { .. })),
                "{}: {result:?}",
                deploy_dir.display()
            );
        }
        assert_eq!(std::fs::read(root.join("precious")).unwrap(), b"keep");
    }

    #[tokio::test]
    async fn test_run_refuses_deploy_dir_reaching_root_through_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("sysroot");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("precious"), b"keep").unwrap();
        let alias = dir.path().join("alias");
        std::os::unix::fs::symlink(dir.path(), &alias).unwrap();
        let downloader = downloader(&root, FakeRepository::standard());

        let result = downloader
            .run(&set(&[], vec![]), &set(&[], vec![]), &alias)
            .await;

        assert!(matches!(
            result,
            Err(IpkFetchError::DestinationSetup { .. })
        ));
        assert_eq!(std::fs::read(root.join("precious")).unwrap(), b"keep");
    }

    #[test]
    fn test_resolved_path_handles_missing_tail() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();

        assert_eq!(
            resolved_path(&dir.path().join("missing/nested/../other")).unwrap(),
            base.join("missing/other")
        );
        assert_eq!(
            resolved_path(&dir.path().join("missing/../..")).unwrap(),
            base.parent().unwrap().to_path_buf()
        );
    }

    #[tokio::test]
    async fn test_run_refuses_deploy_dir_containing_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("sysroot");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("precious"), b"keep").unwrap();
        let downloader = downloader(&root, FakeRepository::standard());

        let result = downloader
            .run(&set(&[], vec![]), &set(&[], vec![]), dir.path())
            .await;

        assert!(matches!(
            result,
            Err(IpkFetchError::DestinationSetup { .. })
        ));
        assert!(root.join("precious").exists());
    }
}
