//! End-to-end deployment sessions against fake build and runtime tools

#![cfg(unix)]

use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};

use rdebug::app::options::AppOptions;
use rdebug::app::state::AppState;
use rdebug::client::{self, ClientOptions};
use rdebug::deploy::proctable;
use rdebug::deploy::registry::PreemptPolicy;
use rdebug::models::deployment::{DeploymentRequest, DeploymentResult, ProjectIdentity};
use rdebug::server::serve::accept_loop;
use rdebug::storage::layout::StorageLayout;
use rdebug::storage::settings::ToolchainSettings;
use rdebug::transport::frame;

const MVN_OK: &str = r#"#!/bin/sh
if [ "$1" = "dependency:list" ]; then
  echo "[INFO] --- dependency:3.6.1:list (default-cli) @ app ---"
  echo "[INFO] The following files have been resolved:"
  echo "[INFO]    none"
  echo "[INFO]"
fi
echo "[INFO] BUILD SUCCESS"
"#;

const MVN_BROKEN: &str = r#"#!/bin/sh
echo "[ERROR] COMPILATION ERROR : Main.java cannot find symbol"
echo "[INFO] BUILD FAILURE"
exit 1
"#;

const JAVA_SERVICE: &str = "#!/bin/sh\necho \"java $*\"\nexec sleep 30\n";

const JAVA_ONESHOT: &str = "#!/bin/sh\necho \"java $*\"\n";

struct Harness {
    tmp: TempDir,
    state: Arc<AppState>,
    addr: SocketAddr,
}

fn script(path: &Path, body: &str) -> PathBuf {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_path_buf()
}

impl Harness {
    async fn start(mvn: &str, java: &str) -> Self {
        Self::start_with_archive_timeout(mvn, java, Duration::from_secs(30)).await
    }

    async fn start_with_archive_timeout(mvn: &str, java: &str, archive_timeout: Duration) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let bin = tmp.path().join("bin");

        let options = AppOptions {
            layout: StorageLayout::new(tmp.path().join("base")),
            toolchain: ToolchainSettings {
                java: script(&bin.join("java"), java),
                javac: script(&bin.join("javac"), "#!/bin/sh\n"),
                mvn: script(&bin.join("mvn"), mvn),
                repository: tmp.path().join("m2"),
            },
            preempt: PreemptPolicy {
                graceful_timeout: Duration::from_secs(5),
                kill_timeout: Duration::from_secs(5),
                poll_interval: Duration::from_millis(50),
            },
            archive_timeout,
            ..AppOptions::default()
        };
        let state = Arc::new(AppState::init(&options).await.unwrap());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(accept_loop(listener, state.clone(), std::future::pending()));

        let project = tmp.path().join("src").join("shop");
        std::fs::create_dir_all(project.join("app/src/main/java/com/acme")).unwrap();
        std::fs::write(project.join("pom.xml"), "<project/>").unwrap();
        std::fs::write(project.join("app/pom.xml"), "<project/>").unwrap();
        std::fs::write(
            project.join("app/src/main/java/com/acme/Main.java"),
            "class Main {}",
        )
        .unwrap();
        std::fs::create_dir_all(project.join("app/target")).unwrap();
        std::fs::write(project.join("app/target/stale.class"), "stale").unwrap();

        Self { tmp, state, addr }
    }

    fn client_options(&self) -> ClientOptions {
        ClientOptions {
            server: self.addr.to_string(),
            project: self.tmp.path().join("src").join("shop"),
            module: "app".to_string(),
            entry: "com.acme.Main".to_string(),
            params: "-Xmx64m -Dmode=test".to_string(),
            ignore: ".git,.idea,target".to_string(),
        }
    }

    fn identity(&self) -> ProjectIdentity {
        ProjectIdentity::from_project_path("shop")
    }

    async fn cleanup(&self) {
        self.state.registry.stop_all().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_deploy_then_redeploy_replaces_process() {
    let harness = Harness::start(MVN_OK, JAVA_SERVICE).await;
    let options = harness.client_options();

    let first = client::deploy(&options).await.unwrap();
    assert!(first.is_success(), "{:?}", first);
    let first_pid = first.pid().unwrap();
    assert!(first_pid > 0);
    assert!(proctable::is_alive(first_pid));

    let second = client::deploy(&options).await.unwrap();
    assert!(second.is_success(), "{:?}", second);
    let second_pid = second.pid().unwrap();
    assert_ne!(first_pid, second_pid);
    assert!(!proctable::is_alive(first_pid));
    assert!(proctable::is_alive(second_pid));

    assert_eq!(
        harness.state.registry.current_pid(&harness.identity()).await,
        Some(second_pid)
    );

    // Workspace holds the fresh upload without excluded directories
    let workspace = harness.state.layout.workspace_dir(&harness.identity());
    assert!(workspace.path().join("app/src/main/java/com/acme/Main.java").exists());
    assert!(!workspace.path().join("app/target/stale.class").exists());

    // Output of both launches is appended to the project log
    let log = std::fs::read_to_string(
        harness.state.layout.project_log_file(&harness.identity()).path(),
    )
    .unwrap();
    assert_eq!(log.matches("deploy shop").count(), 2);
    assert!(log.contains("-Dfile.encoding=UTF-8 -Xmx64m -Dmode=test -classpath"));
    assert!(log.contains("com.acme.Main"));

    harness.cleanup().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_build_failure_reports_500() {
    let harness = Harness::start(MVN_BROKEN, JAVA_SERVICE).await;

    let result = client::deploy(&harness.client_options()).await.unwrap();
    assert_eq!(result.code, 500);
    assert!(result.message.contains("COMPILATION ERROR"), "{}", result.message);
    assert_eq!(harness.state.registry.current_pid(&harness.identity()).await, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_corrupt_archive_reports_500() {
    let harness = Harness::start(MVN_OK, JAVA_SERVICE).await;

    let request = DeploymentRequest {
        project_path: "/home/dev/shop".to_string(),
        module_path: "app".to_string(),
        entry_point: "com.acme.Main".to_string(),
        ..Default::default()
    };
    let mut stream = TcpStream::connect(harness.addr).await.unwrap();
    frame::send_message(&mut stream, &request).await.unwrap();
    frame::send_data(&mut stream, b"definitely not a zip").await.unwrap();

    let result: DeploymentResult = frame::receive_message(&mut stream, 1 << 20).await.unwrap();
    assert_eq!(result.code, 500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_invalid_request_rejected_before_archive() {
    let harness = Harness::start(MVN_OK, JAVA_SERVICE).await;

    let request = DeploymentRequest {
        project_path: "/home/dev/".to_string(),
        module_path: "../escape".to_string(),
        entry_point: "com.acme.Main".to_string(),
        ..Default::default()
    };
    let mut stream = TcpStream::connect(harness.addr).await.unwrap();
    frame::send_message(&mut stream, &request).await.unwrap();

    // No archive sent; the server answers straight away
    let result: DeploymentResult = frame::receive_message(&mut stream, 1 << 20).await.unwrap();
    assert_eq!(result.code, 500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_supervisor_clears_slot_after_exit() {
    let harness = Harness::start(MVN_OK, JAVA_ONESHOT).await;

    let result = client::deploy(&harness.client_options()).await.unwrap();
    assert!(result.is_success(), "{:?}", result);

    let identity = harness.identity();
    let mut cleared = false;
    for _ in 0..100 {
        if harness.state.registry.current_pid(&identity).await.is_none() {
            cleared = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(cleared, "registry still holds the exited process");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stalled_archive_releases_the_project() {
    let harness =
        Harness::start_with_archive_timeout(MVN_OK, JAVA_SERVICE, Duration::from_millis(300)).await;

    let request = DeploymentRequest {
        project_path: harness.client_options().project.to_string_lossy().into_owned(),
        module_path: "app".to_string(),
        entry_point: "com.acme.Main".to_string(),
        ..Default::default()
    };
    let mut stalled = TcpStream::connect(harness.addr).await.unwrap();
    frame::send_message(&mut stalled, &request).await.unwrap();

    // The connection stays open but the archive never comes
    let result: DeploymentResult = tokio::time::timeout(
        Duration::from_secs(5),
        frame::receive_message(&mut stalled, 1 << 20),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(result.code, 500);
    assert!(result.message.contains("timed out"), "{}", result.message);

    // A later deployment of the same project is not blocked
    let next = tokio::time::timeout(Duration::from_secs(20), client::deploy(&harness.client_options()))
        .await
        .unwrap()
        .unwrap();
    assert!(next.is_success(), "{:?}", next);

    drop(stalled);
    harness.cleanup().await;
}
