use crate::cli::params::ResolveParams;
use crate::download::HttpFetcher;
use crate::error::IpkFetchError;
use crate::index::{IndexError, PackageIndex, resolve_url};
use crate::sync::fetch_index;
use url::Url;

pub async fn run_resolve(params: ResolveParams) -> Result<(), IpkFetchError> {
    let index = match &params.index_path {
        Some(path) => {
            tracing::info!("Loading package index from {}", path.display());
            PackageIndex::load(path)?
        }
        None => fetch_remote_index(&params).await?,
    };

    let (lines, failed) = describe(
        &index,
        &params.repository,
        &params.packages,
        params.show_fields,
    );
    for line in lines {
        println!("{line}");
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(IpkFetchError::PartialFailure { failed })
    }
}

async fn fetch_remote_index(params: &ResolveParams) -> Result<PackageIndex, IpkFetchError> {
    let scratch = tempfile::tempdir()?;
    let fetcher = HttpFetcher::new(&params.download)?;

    tracing::info!("Fetching package index from {}", params.repository);
    fetch_index(&fetcher, &params.repository, scratch.path()).await
}

/// One `<package> <url>` line per resolvable package, optionally followed by
/// its indented index fields. Unresolvable packages are logged and returned.
fn describe(
    index: &PackageIndex,
    repository: &Url,
    packages: &[String],
    show_fields: bool,
) -> (Vec<String>, Vec<String>) {
    let mut lines = Vec::new();
    let mut failed = Vec::new();

    for package in packages {
        let resolved = index.lookup(package).and_then(|record| {
            let url = resolve_url(repository, &record)?;
            Ok::<_, IndexError>((record, url))
        });
        match resolved {
            Ok((record, url)) => {
                lines.push(format!("{package} {url}"));
                if show_fields {
                    lines.extend(
                        record
                            .fields()
                            .map(|(name, value)| format!("  {name}: {value}")),
                    );
                }
            }
            Err(err) => {
                tracing::error!("{}", err);
                failed.push(package.clone());
            }
        }
    }

    (lines, failed)
}
