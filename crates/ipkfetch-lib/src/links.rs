//! Symbolic link aliases inside an unpacked tree, e.g. `libfoo.so -> libfoo.so.1`.

use serde::{Deserialize, Serialize};
use std::os::unix::fs::symlink;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// A link to create at `link`, pointing at `target`. Both are relative to
/// the directory the links are applied in.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "LinkSpecDef")]
pub struct LinkSpec {
    /// Path that gets created. The spec is skipped if this path is occupied.
    pub link: PathBuf,
    /// What the link points at. Not checked for existence beyond a warning.
    pub target: PathBuf,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields, untagged)]
enum LinkSpecDef {
    Pair(PathBuf, PathBuf),
    Named { link: PathBuf, target: PathBuf },
}

impl From<LinkSpecDef> for LinkSpec {
    fn from(value: LinkSpecDef) -> Self {
        match value {
            LinkSpecDef::Pair(link, target) | LinkSpecDef::Named { link, target } => {
                Self { link, target }
            }
        }
    }
}

impl LinkSpec {
    pub fn new(link: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            link: link.into(),
            target: target.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Invalid link spec {link} -> {target}: {reason}")]
    InvalidSpec {
        link: PathBuf,
        target: PathBuf,
        reason: String,
    },

    #[error("Failed to create link {link}: {source}")]
    Create {
        link: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Default)]
pub struct LinkReport {
    pub created: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(LinkSpec, LinkError)>,
}

/// Creates every link in `specs` below `base`. A spec whose link path is
/// already occupied (file, directory or symlink) is skipped, so applying
/// the same specs again changes nothing.
pub fn make_links(base: &Path, specs: &[LinkSpec]) -> LinkReport {
    let mut report = LinkReport::default();

    for spec in specs {
        let link_path = base.join(&spec.link);
        match make_link(base, spec) {
            Ok(true) => {
                info!(link = %link_path.display(), target = %spec.target.display(), "Created link");
                report.created.push(link_path);
            }
            Ok(false) => {
                debug!(link = %link_path.display(), "Link path already exists, skipping");
                report.skipped.push(link_path);
            }
            Err(err) => {
                warn!("{}", err);
                report.failed.push((spec.clone(), err));
            }
        }
    }

    report
}

fn make_link(base: &Path, spec: &LinkSpec) -> Result<bool, LinkError> {
    let invalid = |reason: &str| LinkError::InvalidSpec {
        link: spec.link.clone(),
        target: spec.target.clone(),
        reason: reason.to_string(),
    };
    let link = normalized(&spec.link).ok_or_else(|| invalid("link must be a relative path"))?;
    let target =
        normalized(&spec.target).ok_or_else(|| invalid("target must be a relative path"))?;
    if link.as_os_str().is_empty() || target.as_os_str().is_empty() {
        return Err(invalid("empty path"));
    }

    let link_path = base.join(&link);
    if link_path.symlink_metadata().is_ok() {
        return Ok(false);
    }
    if !base.join(&target).exists() {
        warn!(link = %link_path.display(), target = %target.display(), "Link target does not exist");
    }

    if let Some(parent) = link_path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| LinkError::Create {
            link: link_path.clone(),
            source,
        })?;
    }
    symlink(relative_target(&link, &target), &link_path).map_err(|source| LinkError::Create {
        link: link_path.clone(),
        source,
    })?;
    Ok(true)
}

/// Drops `.` components; `None` for absolute paths or paths containing `..`.
fn normalized(path: &Path) -> Option<PathBuf> {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

/// Path of `target` as seen from the directory containing `link`.
fn relative_target(link: &Path, target: &Path) -> PathBuf {
    let link_dir: Vec<Component> = link
        .parent()
        .map(|parent| parent.components().collect())
        .unwrap_or_default();
    let target: Vec<Component> = target.components().collect();

    let common = link_dir
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..link_dir.len() {
        relative.push("..");
    }
    for component in &target[common..] {
        relative.push(component);
    }
    relative
}
