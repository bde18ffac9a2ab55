//! FSM unit tests

use rdebug::deploy::fsm::{SessionEvent, SessionFsm, SessionState};
use rdebug::errors::FailureKind;

fn fail(kind: FailureKind) -> SessionEvent {
    SessionEvent::Fail {
        kind,
        message: format!("{:?} failed", kind),
    }
}

#[test]
fn test_fsm_initial_state() {
    let fsm = SessionFsm::new();
    assert_eq!(fsm.state(), SessionState::AwaitMetadata);
    assert!(fsm.error().is_none());
    assert!(fsm.pid().is_none());
}

#[test]
fn test_fsm_deploy_success_flow() {
    let mut fsm = SessionFsm::new();

    // AwaitMetadata -> Preempting -> AwaitArchive
    fsm.process(SessionEvent::RequestReceived).unwrap();
    assert_eq!(fsm.state(), SessionState::Preempting);
    fsm.process(SessionEvent::Preempted).unwrap();
    assert_eq!(fsm.state(), SessionState::AwaitArchive);

    // AwaitArchive -> Unpacking -> Resolving -> Launching
    fsm.process(SessionEvent::ArchiveReceived).unwrap();
    assert_eq!(fsm.state(), SessionState::Unpacking);
    fsm.process(SessionEvent::Unpacked).unwrap();
    assert_eq!(fsm.state(), SessionState::Resolving);
    fsm.process(SessionEvent::Resolved).unwrap();
    assert_eq!(fsm.state(), SessionState::Launching);

    // Launching -> Reporting -> Supervising
    fsm.process(SessionEvent::Launched { pid: 4242 }).unwrap();
    assert_eq!(fsm.state(), SessionState::Reporting);
    fsm.process(SessionEvent::Reported).unwrap();
    assert_eq!(fsm.state(), SessionState::Supervising);
    assert_eq!(fsm.pid(), Some(4242));
}

#[test]
fn test_fsm_failure_from_every_active_state() {
    let steps = [
        SessionEvent::RequestReceived,
        SessionEvent::Preempted,
        SessionEvent::ArchiveReceived,
        SessionEvent::Unpacked,
        SessionEvent::Resolved,
        SessionEvent::Launched { pid: 1 },
        SessionEvent::Reported,
    ];

    for depth in 0..=steps.len() {
        let mut fsm = SessionFsm::new();
        for step in steps.iter().take(depth) {
            fsm.process(step.clone()).unwrap();
        }

        fsm.process(fail(FailureKind::Build)).unwrap();
        assert_eq!(fsm.state(), SessionState::Failed(FailureKind::Build));
        assert_eq!(fsm.error(), Some("Build failed"));
    }
}

#[test]
fn test_fsm_failed_is_absorbing() {
    let mut fsm = SessionFsm::new();
    fsm.process(fail(FailureKind::Protocol)).unwrap();

    assert!(fsm.process(SessionEvent::RequestReceived).is_err());
    assert!(fsm.process(fail(FailureKind::Internal)).is_err());
    assert_eq!(fsm.state(), SessionState::Failed(FailureKind::Protocol));
}

#[test]
fn test_fsm_closed_after_exit() {
    let mut fsm = SessionFsm::new();
    for event in [
        SessionEvent::RequestReceived,
        SessionEvent::Preempted,
        SessionEvent::ArchiveReceived,
        SessionEvent::Unpacked,
        SessionEvent::Resolved,
        SessionEvent::Launched { pid: 7 },
        SessionEvent::Reported,
        SessionEvent::ProcessExited,
    ] {
        fsm.process(event).unwrap();
    }

    assert_eq!(fsm.state(), SessionState::Closed);
    assert!(fsm.process(fail(FailureKind::Launch)).is_err());
}

#[test]
fn test_fsm_invalid_transition() {
    let mut fsm = SessionFsm::new();

    // Cannot skip preemption
    let result = fsm.process(SessionEvent::ArchiveReceived);
    assert!(result.is_err());
    assert_eq!(fsm.state(), SessionState::AwaitMetadata);
}
