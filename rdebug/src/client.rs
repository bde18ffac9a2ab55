//! Deploy client: packs a local project and submits it to a server

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::errors::DeployError;
use crate::filesys::archive::{self, DEFAULT_EXCLUDES};
use crate::models::deployment::{DeploymentRequest, DeploymentResult};
use crate::transport::frame::{self, DEFAULT_MAX_FRAME_LEN};

/// Options of one client invocation
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Server address, `host:port`
    pub server: String,

    /// Project root on this machine
    pub project: PathBuf,

    /// Module relative to the project root
    pub module: String,

    /// Fully-qualified main class
    pub entry: String,

    /// Runtime arguments passed through to the launched process
    pub params: String,

    /// Comma-separated names left out of the archive
    pub ignore: String,
}

impl ClientOptions {
    /// Build options from `--key=value` command line arguments
    pub fn from_args(args: &HashMap<String, String>) -> Result<Self, DeployError> {
        let required = |key: &str| {
            args.get(key)
                .filter(|value| !value.is_empty())
                .cloned()
                .ok_or_else(|| DeployError::InvalidRequest(format!("missing --{}=<value>", key)))
        };

        Ok(Self {
            server: args
                .get("server")
                .cloned()
                .unwrap_or_else(|| "127.0.0.1:50005".to_string()),
            project: PathBuf::from(required("project")?),
            module: required("module")?,
            entry: required("entry")?,
            params: args.get("params").cloned().unwrap_or_default(),
            ignore: args
                .get("ignore")
                .cloned()
                .unwrap_or_else(|| DEFAULT_EXCLUDES.to_string()),
        })
    }

    /// Source file the entry point is expected in
    pub fn entry_source(&self) -> PathBuf {
        let mut source = self.project.join(&self.module);
        source.extend(["src", "main", "java"]);
        source.push(format!("{}.java", self.entry.replace('.', "/")));
        source
    }

    /// Check that the project, module and entry point exist locally
    pub fn validate(&self) -> Result<(), DeployError> {
        require_exists(&self.project, "project path")?;
        require_exists(&self.project.join(&self.module), "module path")?;
        require_exists(&self.entry_source(), "entry point source")?;
        Ok(())
    }
}

fn require_exists(path: &Path, what: &str) -> Result<(), DeployError> {
    if path.exists() {
        Ok(())
    } else {
        Err(DeployError::InvalidRequest(format!(
            "{} not found: {}",
            what,
            path.display()
        )))
    }
}

/// Pack the project and run one deployment against the server
pub async fn deploy(options: &ClientOptions) -> Result<DeploymentResult, DeployError> {
    options.validate()?;

    let started = Instant::now();
    let root = options.project.clone();
    let excludes = archive::parse_excludes(&options.ignore);
    let data = tokio::task::spawn_blocking(move || archive::pack(&root, &excludes))
        .await
        .map_err(|e| DeployError::Internal(format!("pack task failed: {}", e)))??;
    let archive_time_millis = started.elapsed().as_millis() as i64;
    info!("Packed {} bytes in {}ms", data.len(), archive_time_millis);

    let request = DeploymentRequest {
        project_path: options.project.to_string_lossy().into_owned(),
        module_path: options.module.clone(),
        entry_point: options.entry.clone(),
        launch_params: options.params.clone(),
        archive_time_millis,
    };

    let mut stream = TcpStream::connect(options.server.as_str()).await?;
    debug!("Connected to {}", options.server);

    frame::send_message(&mut stream, &request).await?;
    frame::send_data(&mut stream, &data).await?;
    let result: DeploymentResult = frame::receive_message(&mut stream, DEFAULT_MAX_FRAME_LEN).await?;
    Ok(result)
}
