//! Dependency models

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One dependency line from the build tool's report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyCoordinates {
    pub group_id: String,
    pub artifact_id: String,
    pub packaging: String,
    pub classifier: Option<String>,
    pub version: String,
    pub scope: String,
}

impl DependencyCoordinates {
    /// Repository-relative directory holding this dependency's artifacts
    pub fn repository_dir(&self) -> PathBuf {
        let mut dir: PathBuf = self.group_id.split('.').collect();
        dir.push(&self.artifact_id);
        dir.push(&self.version);
        dir
    }
}

/// A dependency resolved against the local artifact repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyDescriptor {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub packaging: String,

    /// Directory relative to the repository root
    pub repository_dir: PathBuf,

    /// Artifact files relative to the repository root, in classpath order
    pub artifact_files: Vec<PathBuf>,
}

impl DependencyDescriptor {
    pub fn new(coordinates: DependencyCoordinates, artifact_files: Vec<PathBuf>) -> Self {
        let repository_dir = coordinates.repository_dir();
        Self {
            group_id: coordinates.group_id,
            artifact_id: coordinates.artifact_id,
            version: coordinates.version,
            packaging: coordinates.packaging,
            repository_dir,
            artifact_files,
        }
    }
}
