//! Per-project deployment workspaces

use std::time::Instant;

use tracing::{debug, info};

use crate::errors::DeployError;
use crate::filesys::archive;
use crate::filesys::dir::Dir;
use crate::models::deployment::ProjectIdentity;
use crate::storage::layout::StorageLayout;

/// Materializes uploaded archives under the storage layout
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    layout: StorageLayout,
}

impl WorkspaceManager {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    /// Canonical workspace of a project, independent of the client path
    pub fn workspace(&self, identity: &ProjectIdentity) -> Dir {
        self.layout.workspace_dir(identity)
    }

    /// Wipe the project's workspace and unpack `archive` into it.
    ///
    /// Must only be called once the previous process of the project is gone.
    pub async fn prepare(&self, identity: &ProjectIdentity, archive: Vec<u8>) -> Result<Dir, DeployError> {
        let dir = self.workspace(identity);
        let started = Instant::now();

        dir.recreate().await.map_err(|e| {
            DeployError::Workspace(format!("failed to reset {}: {}", dir.path().display(), e))
        })?;
        debug!("Reset workspace {}", dir.path().display());

        let destination = dir.path().to_path_buf();
        let entries = tokio::task::spawn_blocking(move || archive::unpack(&archive, &destination))
            .await
            .map_err(|e| DeployError::Internal(format!("unpack task failed: {}", e)))?
            .map_err(|e| match e {
                DeployError::Workspace(_) => e,
                other => DeployError::Workspace(format!("failed to unpack archive: {}", other)),
            })?;

        info!(
            "Unpacked {} entries into {} in {}ms",
            entries,
            dir.path().display(),
            started.elapsed().as_millis()
        );
        Ok(dir)
    }
}
