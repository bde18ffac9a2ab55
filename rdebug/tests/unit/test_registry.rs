//! Process registry tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rdebug::deploy::proctable::{self, ProcessTable};
use rdebug::deploy::registry::{PreemptPolicy, ProcessRecord, ProcessRegistry};
use rdebug::errors::{DeployError, FailureKind};
use rdebug::models::deployment::ProjectIdentity;

fn fast_policy() -> PreemptPolicy {
    PreemptPolicy {
        graceful_timeout: Duration::from_secs(1),
        kill_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(50),
    }
}

#[tokio::test]
async fn test_claims_serialize_same_identity() {
    let registry = Arc::new(ProcessRegistry::new(fast_policy()));
    let shop = ProjectIdentity::from_project_path("/p/shop");
    let blog = ProjectIdentity::from_project_path("/p/blog");

    let held = registry.claim(&shop).await;

    // Another project is not blocked
    let other = tokio::time::timeout(Duration::from_millis(200), registry.claim(&blog)).await;
    assert!(other.is_ok());

    // The same project waits for the first claim
    let waiting = tokio::time::timeout(Duration::from_millis(200), registry.claim(&shop)).await;
    assert!(waiting.is_err());

    drop(held);
    let after = tokio::time::timeout(Duration::from_millis(200), registry.claim(&shop)).await;
    assert!(after.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deploys_never_share_a_slot() {
    let registry = Arc::new(ProcessRegistry::new(fast_policy()));
    let identity = ProjectIdentity::from_project_path("/p/shop");

    let mut tasks = Vec::new();
    for i in 0..16u32 {
        let registry = registry.clone();
        let identity = identity.clone();
        tasks.push(tokio::spawn(async move {
            let mut claim = registry.claim(&identity).await;
            claim.preempt().await.unwrap();
            assert!(claim.current().is_none());
            tokio::task::yield_now().await;
            // Pids above the kernel limit never exist, so preemption is instant
            claim.register(ProcessRecord::new(identity, 4_194_400 + i))
        }));
    }

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(registry.snapshot().await.len(), 1);
}

#[cfg(unix)]
mod unix {
    use super::*;

    use tokio::process::{Child, Command};

    fn spawn(script: &str) -> Child {
        Command::new("sh")
            .arg("-c")
            .arg(script)
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    /// Reap the child in the background the way the supervisor does
    fn reap(mut child: Child, record: &ProcessRecord) {
        let exit = record.exit_flag();
        tokio::spawn(async move {
            let _ = child.wait().await;
            exit.mark();
        });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_preempt_terminates_running_process() {
        let registry = ProcessRegistry::new(fast_policy());
        let identity = ProjectIdentity::from_project_path("/p/shop");

        let child = spawn("exec sleep 30");
        let pid = child.id().unwrap();
        let record = ProcessRecord::new(identity.clone(), pid);
        reap(child, &record);
        registry.claim(&identity).await.register(record).unwrap();
        assert!(proctable::is_alive(pid));

        assert_eq!(registry.preempt(&identity).await.unwrap(), Some(pid));
        assert!(!proctable::is_alive(pid));
        assert_eq!(registry.current_pid(&identity).await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_preempt_escalates_when_term_is_ignored() {
        let registry = ProcessRegistry::new(fast_policy());
        let identity = ProjectIdentity::from_project_path("/p/stubborn");

        let child = spawn("trap '' TERM; exec sleep 30");
        let pid = child.id().unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let record = ProcessRecord::new(identity.clone(), pid);
        reap(child, &record);
        registry.claim(&identity).await.register(record).unwrap();

        let started = std::time::Instant::now();
        assert_eq!(registry.preempt(&identity).await.unwrap(), Some(pid));
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(!proctable::is_alive(pid));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_natural_exit_clears_slot() {
        let registry = Arc::new(ProcessRegistry::new(fast_policy()));
        let identity = ProjectIdentity::from_project_path("/p/oneshot");

        let mut child = spawn("exit 0");
        let pid = child.id().unwrap();
        registry
            .claim(&identity)
            .await
            .register(ProcessRecord::new(identity.clone(), pid))
            .unwrap();

        child.wait().await.unwrap();
        assert!(registry.observe_exit(&identity, pid).await);
        assert!(registry.snapshot().await.is_empty());
    }
}

/// A process table in which every pid survives any signal
#[derive(Default)]
struct UnkillableTable {
    terminations: AtomicUsize,
    kills: AtomicUsize,
}

impl ProcessTable for UnkillableTable {
    fn is_alive(&self, _pid: u32) -> bool {
        true
    }

    fn terminate(&self, _pid: u32) -> bool {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn force_kill(&self, _pid: u32) -> bool {
        self.kills.fetch_add(1, Ordering::SeqCst);
        true
    }
}

#[tokio::test]
async fn test_preempt_times_out_when_kill_does_not_take() {
    let table = Arc::new(UnkillableTable::default());
    let policy = PreemptPolicy {
        graceful_timeout: Duration::from_millis(200),
        kill_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(20),
    };
    let registry = ProcessRegistry::with_process_table(policy, table.clone());
    let identity = ProjectIdentity::from_project_path("/p/shop");

    let mut claim = registry.claim(&identity).await;
    claim.register(ProcessRecord::new(identity.clone(), 77)).unwrap();

    let started = Instant::now();
    let err = claim.preempt().await.unwrap_err();
    assert!(started.elapsed() >= Duration::from_millis(400));
    assert!(matches!(err, DeployError::PreemptTimeout(_)));
    assert_eq!(err.kind(), FailureKind::PreemptTimeout);

    assert_eq!(table.terminations.load(Ordering::SeqCst), 1);
    assert_eq!(table.kills.load(Ordering::SeqCst), 1);

    // The old record stays registered so a later attempt can retry
    assert_eq!(claim.current().map(|record| record.pid), Some(77));
    drop(claim);
    assert_eq!(registry.current_pid(&identity).await, Some(77));
}
