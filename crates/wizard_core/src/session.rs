//! Async wizard session.
//!
//! [`WizardSession`] wraps a [`WizardController`] so that a forward move
//! which needs a step commit can simply be awaited: the session parks the
//! move, waits on the commit channel (and the step's pre-advance action),
//! then completes or abandons it. The controller lock is never held across
//! an await, so other callers observe `Busy` while a commit is outstanding.
//! Step content and host callbacks run with the lock released, so they may
//! call back into the session.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::controller::{
    AdvanceOptions, FinishOptions, Request, Transition, Validation, WizardController,
};
use crate::error::{CoreError, CoreResult};
use crate::provider::StepProvider;
use crate::snapshot::WizardSnapshot;
use crate::step::{StepDescriptor, StepId};

/// Shared handle to a wizard, cheap to clone.
#[derive(Clone)]
pub struct WizardSession {
    controller: Arc<Mutex<WizardController>>,
}

impl WizardSession {
    pub fn new(controller: WizardController) -> Self {
        Self {
            controller: Arc::new(Mutex::new(controller)),
        }
    }

    /// Move forward, waiting for the active step to commit if it defers.
    ///
    /// Resolves to the applied transition, `Abandoned` when the step rejected
    /// its commit, its pre-advance action failed or the commit timed out, or
    /// the immediate outcome (`Blocked`, `Busy`, ...) when nothing was parked.
    pub async fn next(&self, options: AdvanceOptions) -> CoreResult<Transition> {
        let transition = self.begin(Request::next(options))?;
        self.drive(transition).await
    }

    /// Like [`next`](Self::next), but closes the wizard once applied.
    pub async fn finish(&self, options: FinishOptions) -> CoreResult<Transition> {
        let transition = self.begin(Request::finish(options))?;
        self.drive(transition).await
    }

    pub fn previous(&self) -> CoreResult<Transition> {
        self.controller.lock().previous()
    }

    pub fn reconcile(&self, descriptors: Vec<StepDescriptor>) -> CoreResult<()> {
        self.controller.lock().reconcile(descriptors)
    }

    pub fn refresh<C, P>(&self, provider: &P, context: &C) -> CoreResult<()>
    where
        P: StepProvider<C> + ?Sized,
    {
        let descriptors = provider.steps(context);
        self.reconcile(descriptors)
    }

    pub fn set_loading(&self, loading: bool) {
        self.controller.lock().set_loading(loading);
    }

    pub fn close(&self) {
        self.controller.lock().close();
    }

    pub fn is_closed(&self) -> bool {
        self.controller.lock().is_closed()
    }

    pub fn snapshot(&self) -> WizardSnapshot {
        self.controller.lock().snapshot()
    }

    /// Run `f` against the controller under the lock.
    pub fn inspect<R>(&self, f: impl FnOnce(&WizardController) -> R) -> R {
        f(&self.controller.lock())
    }

    fn begin(&self, request: Request) -> CoreResult<Transition> {
        let validation = Validation::Checked(self.validate_active());
        let (mut transition, effects) = self.controller.lock().begin(request, validation)?;
        effects.run(&mut transition);
        Ok(transition)
    }

    /// Ask the active step's content to validate, without holding the lock.
    fn validate_active(&self) -> Option<(StepId, bool)> {
        let (step, content) = {
            let controller = self.controller.lock();
            let active = controller.active_step()?;
            (active.id().clone(), active.content().cloned())
        };
        let valid = content.map_or(true, |content| content.validate());
        Some((step, valid))
    }

    async fn drive(&self, transition: Transition) -> CoreResult<Transition> {
        let mut pending = match transition {
            Transition::Deferred(pending) => pending,
            other => return Ok(other),
        };

        let token = pending.token();
        let step = pending.step().to_string();
        let timeout = self.controller.lock().config().commit_timeout_duration();
        debug!("Awaiting commit {} on step {}", token, step);

        let settled = match timeout {
            Some(limit) => match tokio::time::timeout(limit, pending.settle()).await {
                Ok(result) => result,
                Err(_) => Err(CoreError::ActionFailed {
                    step,
                    message: format!("commit timed out after {}ms", limit.as_millis()),
                }),
            },
            None => pending.settle().await,
        };

        let outcome = {
            let mut controller = self.controller.lock();
            match settled {
                Ok(()) => controller.settle_commit(token),
                Err(CoreError::ActionFailed { message, .. }) => controller
                    .abandon(token, message)
                    .map(|transition| (transition, Default::default())),
                Err(other) => {
                    info!("Commit {} failed: {}", token, other);
                    controller
                        .abandon(token, other.to_string())
                        .map(|transition| (transition, Default::default()))
                }
            }
        };

        let (mut transition, effects) = outcome?;
        effects.run(&mut transition);
        Ok(transition)
    }
}

impl std::fmt::Debug for WizardSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WizardSession")
            .field("controller", &*self.controller.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::CommitHandle;
    use crate::config::WizardConfig;
    use crate::controller::WizardHost;
    use crate::step::StepContent;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Commits from a spawned task after a short delay.
    struct SlowSave {
        delay: Duration,
        fail: bool,
    }

    impl StepContent for SlowSave {
        fn defers_commit(&self) -> bool {
            true
        }

        fn request_commit(&self, handle: CommitHandle) {
            let delay = self.delay;
            let fail = self.fail;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if fail {
                    handle.reject("backend refused");
                } else {
                    handle.commit();
                }
            });
        }
    }

    /// Never resolves its handle.
    struct Silent;

    impl StepContent for Silent {
        fn defers_commit(&self) -> bool {
            true
        }

        fn request_commit(&self, handle: CommitHandle) {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                handle.commit();
            });
        }
    }

    struct RemoteAction;

    #[async_trait]
    impl StepContent for RemoteAction {
        fn has_before_advance(&self) -> bool {
            true
        }

        async fn before_advance(&self) -> CoreResult<()> {
            Err(CoreError::ActionFailed {
                step: "deploy".to_string(),
                message: "remote action failed".to_string(),
            })
        }
    }

    /// Host that reads the session from inside its callbacks.
    #[derive(Default)]
    struct ReentrantHost {
        session: Mutex<Option<WizardSession>>,
        seen: Mutex<Option<WizardSnapshot>>,
    }

    impl WizardHost for ReentrantHost {
        fn on_close(&self, _show_detail: bool) {
            let session = self.session.lock().clone();
            if let Some(session) = session {
                *self.seen.lock() = Some(session.snapshot());
            }
        }

        fn show_detail_available(&self) -> bool {
            let session = self.session.lock().clone();
            session.is_some_and(|session| session.is_closed())
        }
    }

    /// Content that reads the session while validating and committing.
    #[derive(Default)]
    struct ReentrantContent {
        session: Mutex<Option<WizardSession>>,
        pending_seen: Mutex<Option<bool>>,
    }

    impl StepContent for ReentrantContent {
        fn validate(&self) -> bool {
            let session = self.session.lock().clone();
            session.map_or(true, |session| !session.is_closed())
        }

        fn defers_commit(&self) -> bool {
            true
        }

        fn request_commit(&self, handle: CommitHandle) {
            let session = self.session.lock().clone();
            if let Some(session) = session {
                *self.pending_seen.lock() = Some(session.snapshot().pending.is_some());
            }
            handle.commit();
        }
    }

    fn session(config: WizardConfig, first: Arc<dyn StepContent>) -> WizardSession {
        let controller = WizardController::with_steps(
            config,
            vec![
                StepDescriptor::new("a", "A").with_content(first),
                StepDescriptor::new("b", "B"),
            ],
        )
        .unwrap();
        WizardSession::new(controller)
    }

    fn active(session: &WizardSession) -> String {
        session.inspect(|c| c.active_step().unwrap().id().to_string())
    }

    #[tokio::test]
    async fn test_next_waits_for_commit() {
        let session = session(
            WizardConfig::default(),
            Arc::new(SlowSave {
                delay: Duration::from_millis(20),
                fail: false,
            }),
        );

        let t = session.next(AdvanceOptions::new()).await.unwrap();
        assert!(matches!(t, Transition::Advanced(_)));
        assert_eq!(active(&session), "b");
        assert!(!session.snapshot().loading);
    }

    #[tokio::test]
    async fn test_rejected_commit_stays() {
        let session = session(
            WizardConfig::default(),
            Arc::new(SlowSave {
                delay: Duration::from_millis(5),
                fail: true,
            }),
        );

        let t = session.next(AdvanceOptions::new()).await.unwrap();
        assert!(matches!(t, Transition::Abandoned { ref reason, .. } if reason == "backend refused"));
        assert_eq!(active(&session), "a");
    }

    #[tokio::test]
    async fn test_concurrent_next_is_busy() {
        let session = session(
            WizardConfig::default(),
            Arc::new(SlowSave {
                delay: Duration::from_millis(50),
                fail: false,
            }),
        );

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.next(AdvanceOptions::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = session.next(AdvanceOptions::new()).await.unwrap();
        assert!(matches!(second, Transition::Busy { .. }));

        let first = first.await.unwrap().unwrap();
        assert!(first.is_applied());
        assert_eq!(active(&session), "b");
    }

    #[tokio::test]
    async fn test_commit_timeout_abandons() {
        let session = session(
            WizardConfig::new().commit_timeout(Duration::from_millis(20)),
            Arc::new(Silent),
        );

        let t = session.next(AdvanceOptions::new()).await.unwrap();
        assert!(matches!(t, Transition::Abandoned { ref reason, .. } if reason.contains("timed out")));
        assert_eq!(active(&session), "a");
        assert!(session.snapshot().pending.is_none());
    }

    #[tokio::test]
    async fn test_close_during_commit_is_stale() {
        let session = session(
            WizardConfig::default(),
            Arc::new(SlowSave {
                delay: Duration::from_millis(30),
                fail: false,
            }),
        );

        let waiting = {
            let session = session.clone();
            tokio::spawn(async move { session.next(AdvanceOptions::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        session.close();

        let result = waiting.await.unwrap();
        assert!(matches!(result, Err(CoreError::StaleCommit { .. })));
        assert!(session.inspect(|c| c.step("a").unwrap().is_active));
    }

    #[tokio::test]
    async fn test_failed_before_advance_abandons() {
        let session = session(WizardConfig::default(), Arc::new(RemoteAction));

        let t = session.next(AdvanceOptions::new()).await.unwrap();
        assert!(matches!(t, Transition::Abandoned { ref reason, .. } if reason == "remote action failed"));
        assert_eq!(active(&session), "a");
    }

    #[tokio::test]
    async fn test_immediate_transitions_pass_through() {
        let session = session(WizardConfig::default(), Arc::new(RemoteAction));

        let t = session.next(AdvanceOptions::new().skip()).await.unwrap();
        assert!(t.is_applied());
        assert!(matches!(session.previous().unwrap(), Transition::Retreated(_)));
        assert!(session.inspect(|c| c.step("a").unwrap().is_first));
    }

    #[tokio::test]
    async fn test_host_callbacks_can_read_session() {
        let host = Arc::new(ReentrantHost::default());
        let controller = WizardController::with_steps(
            WizardConfig::default(),
            vec![StepDescriptor::new("a", "A"), StepDescriptor::new("b", "B")],
        )
        .unwrap()
        .with_host(host.clone());
        let session = WizardSession::new(controller);
        *host.session.lock() = Some(session.clone());

        let t = session.finish(FinishOptions::new().show_detail()).await.unwrap();

        assert!(matches!(t, Transition::Finished { show_detail: true, .. }));
        let seen = host.seen.lock().clone().unwrap();
        assert!(seen.closed);
        assert_eq!(seen.active.unwrap(), "b");
    }

    #[tokio::test]
    async fn test_content_and_completion_can_read_session() {
        let content = Arc::new(ReentrantContent::default());
        let session = session(WizardConfig::default(), content.clone());
        *content.session.lock() = Some(session.clone());

        let observed = Arc::new(Mutex::new(None));
        let on_complete = {
            let session = session.clone();
            let observed = observed.clone();
            move || *observed.lock() = Some(session.snapshot().active)
        };

        let t = session
            .next(AdvanceOptions::new().on_complete(on_complete))
            .await
            .unwrap();

        assert!(matches!(t, Transition::Advanced(_)));
        assert_eq!(*content.pending_seen.lock(), Some(true));
        let active = observed.lock().clone().unwrap();
        assert_eq!(active.unwrap(), "b");
    }
}
