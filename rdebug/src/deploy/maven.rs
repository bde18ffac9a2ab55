//! External build tool invocation

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::DeployError;

/// Marker the build tool prints when a goal succeeded
pub const SUCCESS_MARKER: &str = "BUILD SUCCESS";

/// Build tool trait
#[async_trait]
pub trait BuildTool: Send + Sync {
    /// Run one goal in `working_dir` and return its captured standard output
    async fn run_goal(&self, goal: &str, working_dir: &Path) -> Result<String, DeployError>;

    /// Get the tool name
    fn name(&self) -> &str;
}

/// Maven executed as a subprocess
#[derive(Debug, Clone)]
pub struct MavenTool {
    executable: PathBuf,
}

impl MavenTool {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

#[async_trait]
impl BuildTool for MavenTool {
    async fn run_goal(&self, goal: &str, working_dir: &Path) -> Result<String, DeployError> {
        debug!("Running {} {} in {}", self.executable.display(), goal, working_dir.display());
        let started = Instant::now();

        let output = Command::new(&self.executable)
            .arg(goal)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| DeployError::Build(format!("failed to run mvn {}: {}", goal, e)))?;

        info!(
            "mvn {} finished in {}ms ({})",
            goal,
            started.elapsed().as_millis(),
            output.status
        );

        let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.stderr.is_empty() && !captured.contains(SUCCESS_MARKER) {
            captured.push('\n');
            captured.push_str(&String::from_utf8_lossy(&output.stderr));
        }
        Ok(captured)
    }

    fn name(&self) -> &str {
        "mvn"
    }
}

/// Run a goal and require the success marker in its output
pub async fn run_checked(
    tool: &dyn BuildTool,
    goal: &str,
    working_dir: &Path,
) -> Result<String, DeployError> {
    let output = tool.run_goal(goal, working_dir).await?;
    if !output.contains(SUCCESS_MARKER) {
        return Err(DeployError::Build(format!(
            "{} {} failed:\n{}",
            tool.name(),
            goal,
            output
        )));
    }
    Ok(output)
}
