//! Process launch for a deployed module

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::models::dependency::DependencyDescriptor;
use crate::models::deployment::DeploymentRequest;

/// Compiled classes of the deployed module, relative to the module directory
const CLASSES_DIR: [&str; 2] = ["target", "classes"];

/// Module output directory followed by every resolved artifact
pub fn classpath_entries(
    workspace: &Path,
    module_path: &str,
    repository: &Path,
    dependencies: &[DependencyDescriptor],
) -> Vec<PathBuf> {
    let mut classes = workspace.join(module_path);
    classes.extend(CLASSES_DIR);

    let mut entries = vec![classes];
    entries.extend(
        dependencies
            .iter()
            .flat_map(|dep| dep.artifact_files.iter())
            .map(|file| repository.join(file)),
    );
    entries
}

/// Join classpath entries with the host platform's separator
pub fn build_classpath(entries: &[PathBuf]) -> Result<OsString, DeployError> {
    std::env::join_paths(entries)
        .map_err(|e| DeployError::Launch(format!("invalid classpath entry: {}", e)))
}

/// A process started for a deployment
#[derive(Debug)]
pub struct LaunchedProcess {
    pub pid: u32,
    pub child: Child,
}

impl LaunchedProcess {
    /// Kill a process that will not be supervised and reap it
    pub async fn abort(mut self) {
        match self.child.kill().await {
            Ok(()) => debug!("Aborted pid {}", self.pid),
            Err(e) => warn!("Failed to abort pid {}: {}", self.pid, e),
        }
    }
}

/// Starts the runtime for a deployed module
#[derive(Debug, Clone)]
pub struct Launcher {
    java: PathBuf,
    repository: PathBuf,
}

impl Launcher {
    pub fn new(java: impl Into<PathBuf>, repository: impl Into<PathBuf>) -> Self {
        Self {
            java: java.into(),
            repository: repository.into(),
        }
    }

    pub fn java(&self) -> &Path {
        &self.java
    }

    /// Spawn the entry point with the module's classpath, appending its
    /// output to `log_file`
    pub async fn launch(
        &self,
        request: &DeploymentRequest,
        workspace: &Path,
        dependencies: &[DependencyDescriptor],
        log_file: &File,
    ) -> Result<LaunchedProcess, DeployError> {
        let module_path = request.normalized_module_path();
        let entries = classpath_entries(workspace, &module_path, &self.repository, dependencies);
        let classpath = build_classpath(&entries)?;
        debug!("Classpath has {} entries", entries.len());

        let mut stdout = log_file.open_append().await.map_err(|e| {
            DeployError::Launch(format!(
                "failed to open log {}: {}",
                log_file.path().display(),
                e
            ))
        })?;
        writeln!(
            stdout,
            "\n===== {} deploy {} ({}) =====",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            request.identity(),
            request.entry_point
        )?;
        let stderr = stdout.try_clone()?;

        let mut command = Command::new(&self.java);
        command
            .arg("-Dfile.encoding=UTF-8")
            .args(request.launch_args())
            .arg("-classpath")
            .arg(&classpath)
            .arg(&request.entry_point)
            .current_dir(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        let child = command.spawn().map_err(|e| {
            DeployError::Launch(format!("failed to start {}: {}", self.java.display(), e))
        })?;

        let pid = child
            .id()
            .ok_or_else(|| DeployError::Launch("process exited before reporting a pid".to_string()))?;

        info!(
            "Launched {} for {} (pid {}), output in {}",
            request.entry_point,
            request.identity(),
            pid,
            log_file.path().display()
        );
        Ok(LaunchedProcess { pid, child })
    }
}
