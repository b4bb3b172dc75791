use debian_packaging::control::{ControlFile, ControlParagraph};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Name of a package in the index. Doubles as the local artifact file name.
pub type PackageName = Arc<str>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to read package index {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Package {package} not found in package index")]
    PackageNotFound { package: String },

    #[error("Malformed index block for package {package}: {reason}")]
    Malformed { package: String, reason: String },

    #[error("Index block for package {package} has no Filename field")]
    MissingFilename { package: String },

    #[error("Cannot build download URL for {package} from {base}: {reason}")]
    InvalidUrl {
        package: String,
        base: String,
        reason: String,
    },
}

/// Parsed metadata block of a single package.
#[derive(Clone, Debug)]
pub struct IndexRecord {
    package: PackageName,
    filename: String,
    paragraph: ControlParagraph<'static>,
}

impl IndexRecord {
    pub(crate) fn parse(package: &str, block: &str) -> Result<Self, IndexError> {
        let control: ControlFile<'static> =
            ControlFile::parse_str(block).map_err(|e| IndexError::Malformed {
                package: package.to_string(),
                reason: e.to_string(),
            })?;

        let paragraph = control
            .paragraphs()
            .next()
            .cloned()
            .ok_or_else(|| IndexError::Malformed {
                package: package.to_string(),
                reason: "block contains no fields".to_string(),
            })?;

        let filename = paragraph
            .field_str("Filename")
            .map(str::trim)
            .filter(|filename| !filename.is_empty())
            .ok_or_else(|| IndexError::MissingFilename {
                package: package.to_string(),
            })?
            .to_string();

        Ok(Self {
            package: Arc::from(package),
            filename,
            paragraph,
        })
    }

    pub fn package(&self) -> &PackageName {
        &self.package
    }

    /// Path of the artifact relative to the repository base.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.paragraph.field_str(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.paragraph
            .iter_fields()
            .map(|field| (field.name(), field.value_str()))
    }
}
