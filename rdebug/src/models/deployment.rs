//! Deployment models

use std::fmt;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// Result code reported for a successful deployment
pub const CODE_SUCCESS: i32 = 200;

/// Result code reported for any failed deployment
pub const CODE_FAILURE: i32 = 500;

/// Deployment metadata sent by the client as the first frame.
///
/// Field names on the wire follow the deploy client's JSON keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    /// Absolute project path on the client host, only used to derive the identity
    #[serde(rename = "ProjectPath", default)]
    pub project_path: String,

    /// Buildable module, relative to the project root
    #[serde(rename = "ModulePath", default)]
    pub module_path: String,

    /// Fully-qualified main class
    #[serde(rename = "RunClass", default)]
    pub entry_point: String,

    /// Extra runtime arguments, e.g. the debug agent options
    #[serde(rename = "Params", default)]
    pub launch_params: String,

    /// Time the client spent packaging the project
    #[serde(rename = "ZipTime", default)]
    pub archive_time_millis: i64,
}

impl DeploymentRequest {
    /// Derive the preemption key from the client-side project path
    pub fn identity(&self) -> ProjectIdentity {
        ProjectIdentity::from_project_path(&self.project_path)
    }

    /// Module path with client-side separators normalized to `/`
    pub fn normalized_module_path(&self) -> String {
        self.module_path.replace('\\', "/")
    }

    /// Runtime arguments split on whitespace, empty when no params were given
    pub fn launch_args(&self) -> Vec<String> {
        self.launch_params
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    /// Reject requests that cannot be deployed safely
    pub fn validate(&self) -> Result<(), DeployError> {
        let identity = self.identity();
        if !identity.is_valid() {
            return Err(DeployError::InvalidRequest(format!(
                "cannot derive a project name from path '{}'",
                self.project_path
            )));
        }

        if self.entry_point.trim().is_empty() {
            return Err(DeployError::InvalidRequest("entry point is empty".to_string()));
        }

        let module = self.normalized_module_path();
        let escapes = Path::new(&module).components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(DeployError::InvalidRequest(format!(
                "module path '{}' must stay inside the project",
                self.module_path
            )));
        }

        Ok(())
    }
}

/// Stable key naming one logical service
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectIdentity(String);

impl ProjectIdentity {
    /// Take the last segment after either `/` or `\`, whichever comes later
    pub fn from_project_path(project_path: &str) -> Self {
        let start = match (project_path.rfind('/'), project_path.rfind('\\')) {
            (Some(a), Some(b)) => a.max(b) + 1,
            (Some(i), None) | (None, Some(i)) => i + 1,
            (None, None) => 0,
        };
        Self(project_path[start..].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An identity must be usable as a single directory name
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0 != "." && self.0 != ".." && !self.0.contains('\0')
    }
}

impl fmt::Display for ProjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Terminal answer sent back to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    #[serde(rename = "Code")]
    pub code: i32,

    #[serde(rename = "Msg")]
    pub message: String,
}

impl DeploymentResult {
    pub fn success(pid: u32) -> Self {
        Self {
            code: CODE_SUCCESS,
            message: pid.to_string(),
        }
    }

    pub fn failure(err: &DeployError) -> Self {
        Self {
            code: CODE_FAILURE,
            message: err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == CODE_SUCCESS
    }

    /// Pid of the launched process for a successful result
    pub fn pid(&self) -> Option<u32> {
        if self.is_success() {
            self.message.trim().parse().ok()
        } else {
            None
        }
    }
}
