use super::compression::Compression;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Name prefix of the `ar` member holding the installable files.
pub const PAYLOAD_MEMBER_PREFIX: &str = "data.tar";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Downloaded artifact not found at {path}")]
    MissingArtifact { path: PathBuf },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to run {program}: {source}")]
    ArSpawn {
        program: PathBuf,
        source: std::io::Error,
    },

    #[error("ar failed with {status}: {stderr}")]
    ArFailed { status: ExitStatus, stderr: String },

    #[error("Archive {path} has no data.tar member")]
    MissingPayload { path: PathBuf },

    #[error("Unrecognised compression for {path}")]
    UnsupportedCompression { path: PathBuf },

    #[error("Failed to unpack {path}: {source}")]
    Unpack {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Unpack task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Clone, Debug)]
pub struct ExtractOptions {
    /// Program used to explode the outer `ar` container.
    pub ar_program: PathBuf,
    /// Pause before touching freshly downloaded files. Some network mounts
    /// need it; zero disables it.
    pub settle_delay: Duration,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            ar_program: PathBuf::from("ar"),
            settle_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedPayload {
    pub member: String,
    pub compression: Compression,
}

/// Unpacks `ipk` artifacts: an `ar` container whose `data.tar*` member is
/// unpacked into the destination.
#[derive(Clone, Debug, Default)]
pub struct ArchiveExtractor {
    options: ExtractOptions,
}

impl ArchiveExtractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    /// Extracts the artifact `download_dir/<package>` into `dest_dir`.
    ///
    /// The `ar` members land in a scratch directory inside `download_dir`
    /// which is removed afterwards, so nothing from one package is visible
    /// while the next one is unpacked.
    pub async fn extract(
        &self,
        package: &str,
        download_dir: &Path,
        dest_dir: &Path,
    ) -> Result<ExtractedPayload, ExtractError> {
        if !self.options.settle_delay.is_zero() {
            tokio::time::sleep(self.options.settle_delay).await;
        }

        let artifact = std::path::absolute(download_dir.join(package)).map_err(|source| {
            ExtractError::Io {
                path: download_dir.join(package),
                source,
            }
        })?;
        if !artifact.is_file() {
            return Err(ExtractError::MissingArtifact { path: artifact });
        }

        let scratch = tempfile::Builder::new()
            .prefix(&format!(".{package}."))
            .tempdir_in(download_dir)
            .map_err(|source| ExtractError::Io {
                path: download_dir.to_path_buf(),
                source,
            })?;

        debug!(package, artifact = %artifact.display(), "Running ar");
        let output = tokio::process::Command::new(&self.options.ar_program)
            .arg("x")
            .arg(&artifact)
            .current_dir(scratch.path())
            .output()
            .await
            .map_err(|source| ExtractError::ArSpawn {
                program: self.options.ar_program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(ExtractError::ArFailed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let member = find_payload(scratch.path(), &artifact)?;
        let compression = Compression::detect(&member)
            .map_err(|source| ExtractError::Io {
                path: member.clone(),
                source,
            })?
            .ok_or_else(|| ExtractError::UnsupportedCompression {
                path: member.clone(),
            })?;

        let member_name = member
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dest = dest_dir.to_path_buf();
        tokio::task::spawn_blocking(move || unpack_payload(&member, compression, &dest)).await??;

        info!(package, member = %member_name, %compression, dest = %dest_dir.display(), "Unpacked");
        Ok(ExtractedPayload {
            member: member_name,
            compression,
        })
    }
}

fn find_payload(scratch: &Path, artifact: &Path) -> Result<PathBuf, ExtractError> {
    let entries = std::fs::read_dir(scratch).map_err(|source| ExtractError::Io {
        path: scratch.to_path_buf(),
        source,
    })?;

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(PAYLOAD_MEMBER_PREFIX))
        })
        .collect();
    candidates.sort();

    candidates
        .into_iter()
        .next()
        .ok_or_else(|| ExtractError::MissingPayload {
            path: artifact.to_path_buf(),
        })
}

fn unpack_payload(
    member: &Path,
    compression: Compression,
    dest_dir: &Path,
) -> Result<(), ExtractError> {
    let file = File::open(member).map_err(|source| ExtractError::Io {
        path: member.to_path_buf(),
        source,
    })?;
    let decoder = compression
        .decoder(BufReader::new(file))
        .map_err(|source| ExtractError::Unpack {
            path: member.to_path_buf(),
            source,
        })?;

    let mut archive = tar::Archive::new(decoder);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);
    archive
        .unpack(dest_dir)
        .map_err(|source| ExtractError::Unpack {
            path: member.to_path_buf(),
            source,
        })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Compression;
    use std::io::Write;

    /// Builds an uncompressed tarball holding `files`.
    pub fn tar(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *contents).unwrap();
        }
        builder.into_inner().unwrap()
    }

    pub fn compress(compression: Compression, data: &[u8]) -> Vec<u8> {
        match compression {
            Compression::None => data.to_vec(),
            Compression::Gzip => {
                let mut encoder =
                    flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(data).unwrap();
                encoder.finish().unwrap()
            }
            Compression::Xz => {
                let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
                encoder.write_all(data).unwrap();
                encoder.finish().unwrap()
            }
            Compression::Zstd => zstd::stream::encode_all(data, 0).unwrap(),
            Compression::Bzip2 => {
                let mut encoder =
                    bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
                encoder.write_all(data).unwrap();
                encoder.finish().unwrap()
            }
        }
    }

    pub fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
        compress(Compression::Gzip, &tar(files))
    }

    /// Builds a GNU `ar` archive from `(member name, contents)` pairs.
    pub fn ar_archive(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut out = b"!<arch>\n".to_vec();
        for (name, contents) in members {
            write!(
                out,
                "{:<16}{:<12}{:<6}{:<6}{:<8}{:<10}`\n",
                format!("{name}/"),
                0,
                0,
                0,
                "100644",
                contents.len()
            )
            .unwrap();
            out.extend_from_slice(contents);
            if contents.len() % 2 == 1 {
                out.push(b'\n');
            }
        }
        out
    }

    /// An `ipk` whose payload member is `data_member`, compressed with `compression`.
    pub fn ipk_with(
        data_member: &str,
        compression: Compression,
        files: &[(&str, &[u8])],
    ) -> Vec<u8> {
        let control = tar_gz(&[("./control", b"Package: test\n")]);
        let data = compress(compression, &tar(files));
        ar_archive(&[
            ("debian-binary", b"2.0\n"),
            ("control.tar.gz", &control),
            (data_member, &data),
        ])
    }

    /// An `ipk` with a `data.tar.gz` holding `files`.
    pub fn ipk(files: &[(&str, &[u8])]) -> Vec<u8> {
        ipk_with("data.tar.gz", Compression::Gzip, files)
    }

    /// Extraction shells out to binutils `ar`; tests that unpack need it installed.
    pub fn require_ar() {
        let available = std::process::Command::new("ar")
            .arg("--version")
            .output()
            .is_ok_and(|output| output.status.success());
        assert!(
            available,
            "binutils `ar` must be on PATH to run extraction tests"
        );
    }
}
