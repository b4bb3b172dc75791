use crate::index::PackageName;
use itertools::Itertools;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Resolve,
    Download,
    Extract,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Complete,
    PartiallyFailed,
}

#[derive(Clone, Debug, Serialize)]
pub struct PackageFailure {
    pub package: PackageName,
    pub stage: FailureStage,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct LinkFailure {
    pub link: PathBuf,
    pub reason: String,
}

/// Outcome of one package set (build or deploy).
#[derive(Clone, Debug, Serialize)]
pub struct SetReport {
    pub name: String,
    pub destination: PathBuf,
    pub requested: Vec<PackageName>,
    pub installed: Vec<PackageName>,
    pub failures: Vec<PackageFailure>,
    pub links_created: usize,
    pub links_skipped: usize,
    pub link_failures: Vec<LinkFailure>,
}

impl SetReport {
    pub fn new(name: &str, destination: PathBuf, requested: Vec<PackageName>) -> Self {
        Self {
            name: name.to_string(),
            destination,
            requested,
            installed: Vec::new(),
            failures: Vec::new(),
            links_created: 0,
            links_skipped: 0,
            link_failures: Vec::new(),
        }
    }

    pub(crate) fn fail(&mut self, package: PackageName, stage: FailureStage, reason: String) {
        self.failures.push(PackageFailure {
            package,
            stage,
            reason,
        });
    }

    pub fn status(&self) -> RunStatus {
        if self.failures.is_empty() && self.link_failures.is_empty() {
            RunStatus::Complete
        } else {
            RunStatus::PartiallyFailed
        }
    }

    pub fn failures_at(&self, stage: FailureStage) -> impl Iterator<Item = &PackageFailure> {
        self.failures
            .iter()
            .filter(move |failure| failure.stage == stage)
    }
}

impl Display for SetReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}/{} packages installed into {}",
            self.name,
            self.installed.len(),
            self.requested.len(),
            self.destination.display()
        )?;
        if !self.failures.is_empty() {
            write!(
                f,
                "; failed: {}",
                self.failures
                    .iter()
                    .map(|failure| format!("{} ({:?})", failure.package, failure.stage))
                    .join(", ")
            )?;
        }
        if !self.link_failures.is_empty() {
            write!(
                f,
                "; failed links: {}",
                self.link_failures
                    .iter()
                    .map(|failure| failure.link.display())
                    .join(", ")
            )?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub sets: Vec<SetReport>,
}

impl RunReport {
    pub fn new(sets: Vec<SetReport>) -> Self {
        let status = if sets
            .iter()
            .all(|set| set.status() == RunStatus::Complete)
        {
            RunStatus::Complete
        } else {
            RunStatus::PartiallyFailed
        };
        Self { status, sets }
    }

    pub fn failed_packages(&self) -> Vec<String> {
        self.sets
            .iter()
            .flat_map(|set| {
                set.failures
                    .iter()
                    .map(|failure| failure.package.to_string())
                    .chain(
                        set.link_failures
                            .iter()
                            .map(|failure| format!("link {}", failure.link.display())),
                    )
            })
            .collect()
    }
}
