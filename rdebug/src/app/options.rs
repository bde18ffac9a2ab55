//! Application configuration options

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::deploy::registry::PreemptPolicy;
use crate::errors::DeployError;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{Settings, ToolchainSettings};
use crate::transport::frame::DEFAULT_MAX_FRAME_LEN;

const DEFAULT_ARCHIVE_TIMEOUT: Duration = Duration::from_secs(300);

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage layout paths
    pub layout: StorageLayout,

    /// Listener configuration
    pub server: ServerOptions,

    /// External executables
    pub toolchain: ToolchainSettings,

    /// Replacement policy for running deployments
    pub preempt: PreemptPolicy,

    /// Largest frame accepted from a client
    pub max_frame_bytes: u32,

    /// Deadline for the archive frame once the request has been read
    pub archive_timeout: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            layout: StorageLayout::default(),
            server: ServerOptions::default(),
            toolchain: ToolchainSettings::default(),
            preempt: PreemptPolicy::default(),
            max_frame_bytes: DEFAULT_MAX_FRAME_LEN,
            archive_timeout: DEFAULT_ARCHIVE_TIMEOUT,
        }
    }
}

impl From<&Settings> for AppOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            lifecycle: LifecycleOptions {
                stop_processes_on_shutdown: settings.stop_processes_on_shutdown,
                ..LifecycleOptions::default()
            },
            layout: settings
                .base_dir
                .clone()
                .map(StorageLayout::new)
                .unwrap_or_default(),
            server: ServerOptions {
                host: settings.listen.host.clone(),
                port: settings.listen.port,
            },
            toolchain: settings.toolchain.clone(),
            preempt: PreemptPolicy::from(&settings.preempt),
            max_frame_bytes: settings.max_frame_bytes,
            archive_timeout: Duration::from_secs(settings.archive_timeout_secs),
        }
    }
}

/// Lifecycle options for the server
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,

    /// Stop every supervised process on shutdown
    pub stop_processes_on_shutdown: bool,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(60),
            stop_processes_on_shutdown: false,
        }
    }
}

/// Deploy listener options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl ServerOptions {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 50005,
        }
    }
}

/// Check that the configured executables and repository exist.
///
/// Missing build or runtime executables are fatal; a missing repository
/// is only logged since the first install creates it.
pub fn verify_toolchain(toolchain: &ToolchainSettings) -> Result<(), DeployError> {
    for (name, path) in [
        ("java", &toolchain.java),
        ("javac", &toolchain.javac),
        ("mvn", &toolchain.mvn),
    ] {
        let resolved = locate_executable(path).ok_or_else(|| {
            DeployError::Config(format!("{} not found at '{}'", name, path.display()))
        })?;
        info!("Using {}: {}", name, resolved.display());
    }

    if !toolchain.repository.is_dir() {
        warn!(
            "Artifact repository {} does not exist yet",
            toolchain.repository.display()
        );
    }
    Ok(())
}

/// Resolve bare names through PATH, keep explicit paths as they are
fn locate_executable(path: &Path) -> Option<PathBuf> {
    if path.components().count() > 1 || path.is_absolute() {
        return path.is_file().then(|| path.to_path_buf());
    }

    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .flat_map(|dir| executable_candidates(&dir.join(path)))
        .find(|candidate| candidate.is_file())
}

fn executable_candidates(path: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![path.to_path_buf()];
    if cfg!(windows) {
        for ext in ["exe", "cmd", "bat"] {
            candidates.push(path.with_extension(ext));
        }
    }
    candidates
}
