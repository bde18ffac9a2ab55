//! Dependency resolution through the build tool's `dependency:list` report

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::deploy::maven::{run_checked, BuildTool};
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::models::dependency::{DependencyCoordinates, DependencyDescriptor};

/// Line that opens the resolved-dependency block
pub const RESOLVED_MARKER: &str = "The following files have been resolved:";

/// Placeholder the build tool prints when a module has no dependencies
const NO_DEPENDENCIES: &str = "none";

const ARCHIVE_SUFFIX: &str = ".jar";
const SKIPPED_SUFFIXES: [&str; 2] = ["-sources.jar", "-javadoc.jar"];

/// Parse the resolved-dependency block out of a `dependency:list` report
pub fn parse_dependency_report(report: &str) -> Result<Vec<DependencyCoordinates>, DeployError> {
    let mut lines = report.lines();
    if !lines.by_ref().any(|line| line.contains(RESOLVED_MARKER)) {
        return Err(DeployError::Resolution(format!(
            "dependency report has no resolved files section:\n{}",
            report
        )));
    }

    let mut dependencies = Vec::new();
    for line in lines {
        let row = match line.find(']') {
            Some(end) => &line[end + 1..],
            None => line,
        }
        .trim();

        if row.is_empty() {
            break;
        }
        if row == NO_DEPENDENCIES {
            continue;
        }

        dependencies.push(parse_dependency_line(row)?);
    }

    Ok(dependencies)
}

fn parse_dependency_line(row: &str) -> Result<DependencyCoordinates, DeployError> {
    let fields: Vec<&str> = row.split(':').collect();
    let (classifier, version, scope) = match fields.len() {
        5 => (None, fields[3], fields[4]),
        6 => (Some(fields[3].to_string()), fields[4], fields[5]),
        n => {
            return Err(DeployError::Parse(format!(
                "expected 5 or 6 fields in dependency line, got {}: {}",
                n, row
            )))
        }
    };

    // Newer plugin versions annotate the scope, e.g. "compile -- module foo"
    let scope = scope.split_whitespace().next().unwrap_or_default();

    Ok(DependencyCoordinates {
        group_id: fields[0].to_string(),
        artifact_id: fields[1].to_string(),
        packaging: fields[2].to_string(),
        classifier,
        version: version.to_string(),
        scope: scope.to_string(),
    })
}

fn is_runtime_archive(name: &str) -> bool {
    name.ends_with(ARCHIVE_SUFFIX) && !SKIPPED_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Turn parsed coordinates into descriptors backed by files in `repository`.
///
/// An artifact path contributes only once across the whole run.
pub async fn resolve_artifacts(
    repository: &Path,
    dependencies: Vec<DependencyCoordinates>,
) -> Result<Vec<DependencyDescriptor>, DeployError> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut descriptors = Vec::with_capacity(dependencies.len());

    for coordinates in dependencies {
        let relative_dir = coordinates.repository_dir();
        let dir = Dir::new(repository.join(&relative_dir));
        if !dir.exists().await {
            return Err(DeployError::Resolution(format!(
                "dependency directory not found: {}",
                dir.path().display()
            )));
        }

        let mut artifact_files = Vec::new();
        for name in dir.file_names().await? {
            if !is_runtime_archive(&name) {
                continue;
            }
            let relative = relative_dir.join(&name);
            if seen.insert(relative.clone()) {
                artifact_files.push(relative);
            }
        }

        debug!(
            "Resolved {}:{}:{} to {} artifact(s)",
            coordinates.group_id,
            coordinates.artifact_id,
            coordinates.version,
            artifact_files.len()
        );
        descriptors.push(DependencyDescriptor::new(coordinates, artifact_files));
    }

    Ok(descriptors)
}

/// Builds a project and resolves its module's runtime dependencies
pub struct DependencyResolver {
    tool: Arc<dyn BuildTool>,
    repository: PathBuf,
}

impl DependencyResolver {
    pub fn new(tool: Arc<dyn BuildTool>, repository: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            repository: repository.into(),
        }
    }

    pub fn repository(&self) -> &Path {
        &self.repository
    }

    /// Compile and install the project, then list and resolve the module's
    /// dependencies
    pub async fn resolve(
        &self,
        project_dir: &Path,
        module_path: &str,
    ) -> Result<Vec<DependencyDescriptor>, DeployError> {
        run_checked(self.tool.as_ref(), "compile", project_dir).await?;
        run_checked(self.tool.as_ref(), "install", project_dir).await?;

        let module_dir = project_dir.join(module_path);
        let report = run_checked(self.tool.as_ref(), "dependency:list", &module_dir).await?;

        let dependencies = parse_dependency_report(&report)?;
        let descriptors = resolve_artifacts(&self.repository, dependencies).await?;

        info!(
            "Resolved {} dependencies ({} artifacts) for module '{}'",
            descriptors.len(),
            descriptors.iter().map(|d| d.artifact_files.len()).sum::<usize>(),
            module_path
        );
        Ok(descriptors)
    }
}
