//! Settings file management

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::logs::LogLevel;
use crate::storage::layout::home_dir;
use crate::transport::frame::DEFAULT_MAX_FRAME_LEN;

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON logs on stdout
    #[serde(default)]
    pub json_logs: bool,

    /// Also write the server log to a rolling file under the logs directory
    #[serde(default = "default_true")]
    pub log_to_file: bool,

    /// Listener configuration
    #[serde(default)]
    pub listen: ListenSettings,

    /// Base directory for workspaces and logs, defaults to ~/remote-debug
    #[serde(default)]
    pub base_dir: Option<PathBuf>,

    /// External build tool and runtime
    #[serde(default)]
    pub toolchain: ToolchainSettings,

    /// Replacement policy for running deployments
    #[serde(default)]
    pub preempt: PreemptSettings,

    /// Largest frame accepted from a client
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: u32,

    /// How long a client may take to send the archive after its request
    #[serde(default = "default_archive_timeout")]
    pub archive_timeout_secs: u64,

    /// Stop every supervised process when the server shuts down
    #[serde(default)]
    pub stop_processes_on_shutdown: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_frame_bytes() -> u32 {
    DEFAULT_MAX_FRAME_LEN
}

fn default_archive_timeout() -> u64 {
    300
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            log_to_file: true,
            listen: ListenSettings::default(),
            base_dir: None,
            toolchain: ToolchainSettings::default(),
            preempt: PreemptSettings::default(),
            max_frame_bytes: default_max_frame_bytes(),
            archive_timeout_secs: default_archive_timeout(),
            stop_processes_on_shutdown: false,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file, or defaults when no file is given
    pub async fn load(path: Option<PathBuf>) -> Result<Self, DeployError> {
        match path {
            Some(path) => File::new(path).read_json::<Settings>().await,
            None => Ok(Settings::default()),
        }
    }

    /// Apply `--key=value` command line overrides
    pub fn apply_overrides(&mut self, args: &HashMap<String, String>) -> Result<(), DeployError> {
        if let Some(port) = args.get("port") {
            self.listen.port = port
                .parse()
                .map_err(|_| DeployError::Config(format!("invalid port: {}", port)))?;
        }
        if let Some(host) = args.get("host") {
            self.listen.host = host.clone();
        }
        if let Some(level) = args.get("log-level") {
            self.log_level = level.parse().map_err(DeployError::Config)?;
        }
        if let Some(dir) = args.get("base-dir") {
            self.base_dir = Some(PathBuf::from(dir));
        }
        if let Some(java) = args.get("java") {
            self.toolchain.java = PathBuf::from(java);
        }
        if let Some(javac) = args.get("javac") {
            self.toolchain.javac = PathBuf::from(javac);
        }
        if let Some(mvn) = args.get("mvn") {
            self.toolchain.mvn = PathBuf::from(mvn);
        }
        if let Some(repository) = args.get("repository").or_else(|| args.get("r")) {
            self.toolchain.repository = PathBuf::from(repository);
        }
        Ok(())
    }
}

/// Listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    50005
}

impl Default for ListenSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Paths of the external tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainSettings {
    #[serde(default = "default_java")]
    pub java: PathBuf,

    #[serde(default = "default_javac")]
    pub javac: PathBuf,

    #[serde(default = "default_mvn")]
    pub mvn: PathBuf,

    /// Local artifact repository
    #[serde(default = "default_repository")]
    pub repository: PathBuf,
}

#[cfg(not(windows))]
fn default_java() -> PathBuf {
    PathBuf::from("/usr/bin/java")
}

#[cfg(windows)]
fn default_java() -> PathBuf {
    java_home().join("bin").join("java.exe")
}

#[cfg(not(windows))]
fn default_javac() -> PathBuf {
    PathBuf::from("/usr/bin/javac")
}

#[cfg(windows)]
fn default_javac() -> PathBuf {
    java_home().join("bin").join("javac.exe")
}

#[cfg(not(windows))]
fn default_mvn() -> PathBuf {
    PathBuf::from("/usr/bin/mvn")
}

#[cfg(windows)]
fn default_mvn() -> PathBuf {
    std::env::var_os("MAVEN_HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join("bin")
        .join("mvn")
}

#[cfg(windows)]
fn java_home() -> PathBuf {
    std::env::var_os("JAVA_HOME").map(PathBuf::from).unwrap_or_default()
}

fn default_repository() -> PathBuf {
    home_dir().join(".m2").join("repository")
}

impl Default for ToolchainSettings {
    fn default() -> Self {
        Self {
            java: default_java(),
            javac: default_javac(),
            mvn: default_mvn(),
            repository: default_repository(),
        }
    }
}

/// Preemption timings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreemptSettings {
    /// How long a process gets to exit after the termination signal
    #[serde(default = "default_graceful_timeout")]
    pub graceful_timeout_secs: u64,

    /// How long to wait for a force-killed process to disappear
    #[serde(default = "default_kill_timeout")]
    pub kill_timeout_secs: u64,

    /// Process table polling interval
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_graceful_timeout() -> u64 {
    30
}

fn default_kill_timeout() -> u64 {
    5
}

fn default_poll_interval() -> u64 {
    500
}

impl Default for PreemptSettings {
    fn default() -> Self {
        Self {
            graceful_timeout_secs: default_graceful_timeout(),
            kill_timeout_secs: default_kill_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}
