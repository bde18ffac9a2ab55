//! Application state management

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::app::options::AppOptions;
use crate::deploy::launcher::Launcher;
use crate::deploy::maven::{BuildTool, MavenTool};
use crate::deploy::registry::ProcessRegistry;
use crate::deploy::resolver::DependencyResolver;
use crate::deploy::workspace::WorkspaceManager;
use crate::errors::DeployError;
use crate::storage::layout::StorageLayout;

/// State shared by every session
pub struct AppState {
    /// Storage layout on this host
    pub layout: StorageLayout,

    /// Supervised processes, one per project
    pub registry: Arc<ProcessRegistry>,

    /// Workspace preparation
    pub workspace: WorkspaceManager,

    /// Build and dependency resolution
    pub resolver: DependencyResolver,

    /// Process launcher
    pub launcher: Launcher,

    /// Largest frame accepted from a client
    pub max_frame_bytes: u32,

    /// Deadline for the archive frame
    pub archive_timeout: Duration,
}

impl AppState {
    /// Build the state with Maven as the build tool
    pub async fn init(options: &AppOptions) -> Result<Self, DeployError> {
        let tool = MavenTool::new(&options.toolchain.mvn);
        info!("Build tool: {}", tool.executable().display());
        Self::with_build_tool(options, Arc::new(tool)).await
    }

    /// Build the state around an arbitrary build tool
    pub async fn with_build_tool(
        options: &AppOptions,
        tool: Arc<dyn BuildTool>,
    ) -> Result<Self, DeployError> {
        info!("Initializing application state...");

        let layout = options.layout.clone();
        layout.setup().await?;
        info!("Storage base directory: {}", layout.base_dir.display());

        let toolchain = &options.toolchain;
        let resolver = DependencyResolver::new(tool, &toolchain.repository);
        let launcher = Launcher::new(&toolchain.java, &toolchain.repository);
        info!(
            "Runtime: {}, artifact repository: {}",
            launcher.java().display(),
            resolver.repository().display()
        );

        Ok(Self {
            registry: Arc::new(ProcessRegistry::new(options.preempt.clone())),
            workspace: WorkspaceManager::new(layout.clone()),
            resolver,
            launcher,
            max_frame_bytes: options.max_frame_bytes,
            archive_timeout: options.archive_timeout,
            layout,
        })
    }

    /// Shutdown application state
    pub async fn shutdown(&self, stop_processes: bool) -> Result<(), DeployError> {
        info!("Shutting down application state...");

        let running = self.registry.snapshot().await;
        if stop_processes {
            let stopped = self.registry.stop_all().await;
            info!("Stopped {} of {} supervised processes", stopped, running.len());
        } else {
            for (identity, pid) in running {
                info!("Leaving {} (pid {}) running", identity, pid);
            }
        }
        Ok(())
    }
}
