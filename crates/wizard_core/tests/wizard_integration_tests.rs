//! Integration tests for the wizard engine.
//!
//! These drive the public API end to end: reconciliation against a changing
//! step list, forward/backward navigation, deferred commits through the
//! async session, and host notification on finish.

use std::sync::Arc;
use std::time::Duration;

use mockall::mock;
use mockall::predicate::eq;
use parking_lot::Mutex;

use wizard_core::{
    reconcile, AdvanceOptions, CommitHandle, CoreError, FinishOptions, PendingPolicy,
    StepContent, StepDescriptor, StepStatus, Transition, WizardConfig, WizardController,
    WizardHost, WizardSession,
};

mock! {
    pub Host {}

    impl WizardHost for Host {
        fn on_close(&self, show_detail: bool);
        fn show_detail_available(&self) -> bool;
    }
}

/// Holds its commit handle until the test releases it.
#[derive(Default)]
struct ManualCommit {
    handle: Mutex<Option<CommitHandle>>,
}

impl ManualCommit {
    fn release(&self) -> bool {
        match self.handle.lock().take() {
            Some(handle) => handle.commit(),
            None => false,
        }
    }
}

impl StepContent for ManualCommit {
    fn defers_commit(&self) -> bool {
        true
    }

    fn request_commit(&self, handle: CommitHandle) {
        *self.handle.lock() = Some(handle);
    }
}

fn descriptors(ids: &[&str]) -> Vec<StepDescriptor> {
    ids.iter().map(|id| StepDescriptor::new(*id, *id)).collect()
}

fn active_id(controller: &WizardController) -> String {
    controller.active_step().unwrap().id().to_string()
}

/// Alpha, Beta, Gamma: forward, skip, back.
#[test]
fn test_three_step_walkthrough() {
    let mut wizard =
        WizardController::with_steps(WizardConfig::default(), descriptors(&["Alpha", "Beta", "Gamma"]))
            .unwrap();

    assert_eq!(active_id(&wizard), "Alpha");
    assert!(wizard.step("Alpha").unwrap().is_first);

    wizard.next(AdvanceOptions::new()).unwrap();
    assert_eq!(active_id(&wizard), "Beta");
    assert!(wizard.step("Alpha").unwrap().is_done);

    wizard.next(AdvanceOptions::new().skip()).unwrap();
    assert_eq!(active_id(&wizard), "Gamma");
    assert!(!wizard.step("Beta").unwrap().is_done);
    assert!(wizard.step("Gamma").unwrap().is_last);

    wizard.previous().unwrap();
    assert_eq!(active_id(&wizard), "Beta");
    assert!(!wizard.step("Beta").unwrap().is_first);

    let snapshot = wizard.snapshot();
    assert_eq!(snapshot.step("Alpha").unwrap().status, StepStatus::Done);
    assert_eq!(snapshot.step("Beta").unwrap().status, StepStatus::Active);
    assert_eq!(snapshot.step("Gamma").unwrap().status, StepStatus::NotStarted);
}

/// [A(active), B, C] merged with [A, B, D].
#[test]
fn test_reconcile_replaces_dropped_step() {
    let mut existing = reconcile(&[], descriptors(&["A", "B", "C"])).unwrap();
    existing[1].is_done = true;

    let merged = reconcile(&existing, descriptors(&["A", "B", "D"])).unwrap();

    let ids: Vec<&str> = merged.iter().map(|s| s.id().as_str()).collect();
    assert_eq!(ids, vec!["A", "B", "D"]);
    assert!(merged[0].is_active);
    assert!(merged[0].is_first);
    assert!(merged[1].is_done);
    assert!(!merged[2].is_active);
    assert!(!merged[2].is_done);
    assert!(merged[2].is_last);
}

/// Progress survives a re-derivation that reorders and inserts steps.
#[test]
fn test_reconcile_through_controller_keeps_progress() {
    let mut wizard =
        WizardController::with_steps(WizardConfig::default(), descriptors(&["source", "review"]))
            .unwrap();
    wizard.next(AdvanceOptions::new()).unwrap();

    wizard
        .reconcile(descriptors(&["source", "schema", "review"]))
        .unwrap();

    assert_eq!(active_id(&wizard), "review");
    assert!(wizard.step("source").unwrap().is_done);
    assert_eq!(wizard.step("schema").unwrap().status(), StepStatus::NotStarted);
    assert!(wizard.step("review").unwrap().is_last);
    assert!(!wizard.step("source").unwrap().is_last);

    assert!(matches!(
        wizard.reconcile(descriptors(&["x", "x"])),
        Err(CoreError::DuplicateStep(_))
    ));
    assert_eq!(wizard.steps().len(), 3);
}

/// A deferring step: nothing moves until the continuation, and only once.
#[test]
fn test_deferred_commit_single_advance() {
    let content = Arc::new(ManualCommit::default());
    let mut steps = descriptors(&["a", "b", "c"]);
    steps[0] = StepDescriptor::new("a", "a").with_content(content.clone());
    let mut wizard = WizardController::with_steps(WizardConfig::default(), steps).unwrap();
    let before = wizard.snapshot().steps;

    let pending = wizard
        .next(AdvanceOptions::new())
        .unwrap()
        .into_pending()
        .unwrap();
    assert_eq!(wizard.snapshot().steps, before);

    assert!(content.release());
    // The controller applies the move only when told the commit landed.
    assert_eq!(wizard.snapshot().steps, before);

    assert!(wizard.complete(pending.token()).unwrap().is_applied());
    assert_eq!(active_id(&wizard), "b");

    assert!(wizard.complete(pending.token()).is_err());
    assert_eq!(active_id(&wizard), "b");
    assert!(!wizard.step("b").unwrap().is_done);
}

#[tokio::test]
async fn test_session_releases_on_commit() {
    let content = Arc::new(ManualCommit::default());
    let mut steps = descriptors(&["a", "b"]);
    steps[0] = StepDescriptor::new("a", "a").with_content(content.clone());
    let session = WizardSession::new(
        WizardController::with_steps(WizardConfig::default(), steps).unwrap(),
    );

    let waiting = {
        let session = session.clone();
        tokio::spawn(async move { session.next(AdvanceOptions::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let snapshot = session.snapshot();
    assert_eq!(snapshot.active.as_ref().unwrap(), "a");
    assert_eq!(snapshot.pending.as_ref().unwrap(), "a");
    assert!(snapshot.loading);

    assert!(content.release());
    let transition = waiting.await.unwrap().unwrap();
    assert!(matches!(transition, Transition::Advanced(_)));
    assert_eq!(session.snapshot().active.unwrap(), "b");
}

#[tokio::test]
async fn test_previous_cancel_policy_discards_late_commit() {
    let content = Arc::new(ManualCommit::default());
    let mut steps = descriptors(&["a", "b", "c"]);
    steps[1] = StepDescriptor::new("b", "b").with_content(content.clone());
    let config = WizardConfig::new().pending_previous(PendingPolicy::Cancel);
    let session = WizardSession::new(WizardController::with_steps(config, steps).unwrap());

    session.next(AdvanceOptions::new()).await.unwrap();
    let waiting = {
        let session = session.clone();
        tokio::spawn(async move { session.next(AdvanceOptions::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(matches!(session.previous().unwrap(), Transition::Retreated(_)));
    assert!(content.release());

    let late = waiting.await.unwrap();
    assert!(matches!(late, Err(CoreError::StaleCommit { .. })));
    assert_eq!(session.snapshot().active.unwrap(), "a");
}

#[test]
fn test_finish_closes_with_detail() {
    let mut host = MockHost::new();
    host.expect_show_detail_available().return_const(true);
    host.expect_on_close()
        .with(eq(true))
        .times(1)
        .return_const(());

    let mut wizard =
        WizardController::with_steps(WizardConfig::default(), descriptors(&["a", "b"]))
            .unwrap()
            .with_host(Arc::new(host));
    wizard.next(AdvanceOptions::new()).unwrap();

    assert!(matches!(
        wizard.next(AdvanceOptions::new()).unwrap(),
        Transition::AtEnd { .. }
    ));

    let transition = wizard.finish(FinishOptions::new().show_detail()).unwrap();
    assert!(matches!(transition, Transition::Finished { show_detail: true, .. }));
    assert!(wizard.is_closed());
    assert!(matches!(wizard.previous(), Err(CoreError::SessionClosed)));
}

#[tokio::test]
async fn test_finish_waits_for_commit_before_closing() {
    let content = Arc::new(ManualCommit::default());
    let mut host = MockHost::new();
    host.expect_show_detail_available().return_const(false);
    host.expect_on_close()
        .with(eq(false))
        .times(1)
        .return_const(());

    let steps = vec![StepDescriptor::new("only", "Only").with_content(content.clone())];
    let session = WizardSession::new(
        WizardController::with_steps(WizardConfig::default(), steps)
            .unwrap()
            .with_host(Arc::new(host)),
    );

    let waiting = {
        let session = session.clone();
        tokio::spawn(async move { session.finish(FinishOptions::new().show_detail()).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!session.is_closed());

    content.release();
    let transition = waiting.await.unwrap().unwrap();
    assert!(matches!(transition, Transition::Finished { show_detail: false, .. }));
    assert!(session.is_closed());
    assert!(session.snapshot().step("only").unwrap().status == StepStatus::Done);
}
