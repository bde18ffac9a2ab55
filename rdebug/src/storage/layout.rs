//! Storage layout on the deployment host

use std::path::PathBuf;

use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::deployment::ProjectIdentity;

/// Storage layout for the server
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Parent of every project workspace
    pub fn workspaces_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("workspaces"))
    }

    /// Workspace of one project
    pub fn workspace_dir(&self, identity: &ProjectIdentity) -> Dir {
        self.workspaces_dir().subdir(identity.as_str())
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Output log of a project's launched process
    pub fn project_log_file(&self, identity: &ProjectIdentity) -> File {
        self.logs_dir().file(&format!("{}.log", identity))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), crate::errors::DeployError> {
        self.workspaces_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new(home_dir().join("remote-debug"))
    }
}

/// Home directory of the user running the server
pub fn home_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let (Some(drive), Some(path)) =
            (std::env::var_os("HOMEDRIVE"), std::env::var_os("HOMEPATH"))
        {
            let mut home = std::ffi::OsString::from(drive);
            home.push(path);
            return PathBuf::from(home);
        }
    }

    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}
