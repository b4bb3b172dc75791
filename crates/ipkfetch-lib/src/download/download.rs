use super::pool::Fetch;
use super::types::{DownloadJob, DownloadOptions};
use crate::error::IpkFetchError;
use eyre::{Result, WrapErr, eyre};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("ipkfetch/", env!("CARGO_PKG_VERSION"));
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Fetches jobs over HTTP(S), streaming each response body to disk.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_retries: usize,
}

impl HttpFetcher {
    pub fn new(options: &DownloadOptions) -> Result<Self, IpkFetchError> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            max_retries: options.max_retries,
        })
    }

    async fn transfer(&self, job: &DownloadJob, output_path: &Path) -> Result<()> {
        let mut response = self
            .client
            .get(job.url.clone())
            .send()
            .await
            .wrap_err_with(|| format!("Failed to request {}", job.url))?
            .error_for_status()
            .wrap_err_with(|| format!("Server rejected request for {}", job.url))?;

        let file = tokio::fs::File::create(output_path)
            .await
            .wrap_err_with(|| format!("Failed to create output file: {}", output_path.display()))?;
        let mut writer = tokio::io::BufWriter::new(file);

        while let Some(chunk) = response
            .chunk()
            .await
            .wrap_err_with(|| format!("Failed to read from {}", job.url))?
        {
            writer
                .write_all(&chunk)
                .await
                .wrap_err_with(|| format!("Failed to write to {}", output_path.display()))?;
        }

        writer
            .flush()
            .await
            .wrap_err_with(|| format!("Failed to flush {}", output_path.display()))?;
        Ok(())
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, job: &DownloadJob) -> Result<PathBuf> {
        if job.url.as_str().is_empty()
            || job.file_name.is_empty()
            || job.directory.as_os_str().is_empty()
        {
            return Err(eyre!("Missing an argument to download {:?}", job));
        }

        let output_path = job.output_path();
        let mut attempt = 0;
        loop {
            debug!(url = %job.url, output = %output_path.display(), attempt, "Downloading");
            match self.transfer(job, &output_path).await {
                Ok(()) => return Ok(output_path),
                Err(err) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        url = %job.url,
                        attempt,
                        max_retries = self.max_retries,
                        "Retrying download: {:#}",
                        err
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt as u32).await;
                }
                Err(err) => {
                    // Don't leave a truncated artifact behind for the extraction stage.
                    let _ = tokio::fs::remove_file(&output_path).await;
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn job(server: &MockServer, rel: &str, name: &str, directory: &Path) -> DownloadJob {
        DownloadJob {
            url: Url::parse(&format!("{}{}", server.uri(), rel)).unwrap(),
            file_name: Arc::from(name),
            directory: directory.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_fetch_writes_body_under_package_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repo/a/pkgA_1.0.ipk"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ipk payload".to_vec()))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(&DownloadOptions::default()).unwrap();

        let output = fetcher
            .fetch(&job(&server, "/repo/a/pkgA_1.0.ipk", "pkgA", dir.path()))
            .await
            .unwrap();

        assert_eq!(output, dir.path().join("pkgA"));
        assert_eq!(std::fs::read(output).unwrap(), b"ipk payload");
    }

    #[tokio::test]
    async fn test_fetch_fails_on_http_error_without_leaving_a_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(&DownloadOptions::default()).unwrap();

        let result = fetcher
            .fetch(&job(&server, "/repo/missing.ipk", "missing", dir.path()))
            .await;

        assert!(result.is_err());
        assert!(!dir.path().join("missing").exists());
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_retries_up_to_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky.ipk"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky.ipk"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"second try".to_vec()))
            .with_priority(2)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(&DownloadOptions {
            max_retries: 1,
            ..DownloadOptions::default()
        })
        .unwrap();

        let output = fetcher
            .fetch(&job(&server, "/flaky.ipk", "flaky", dir.path()))
            .await
            .unwrap();

        assert_eq!(std::fs::read(output).unwrap(), b"second try");
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_rejects_missing_arguments() {
        let fetcher = HttpFetcher::new(&DownloadOptions::default()).unwrap();
        let job = DownloadJob {
            url: Url::parse("http://example/repo/x.ipk").unwrap(),
            file_name: Arc::from(""),
            directory: PathBuf::from("/tmp"),
        };

        let err = fetcher.fetch(&job).await.unwrap_err();
        assert!(err.to_string().contains("Missing an argument"));
    }
}
