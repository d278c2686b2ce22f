//! Wizard controller: the step state machine.
//!
//! The controller owns the ordered step list and is the only thing that
//! mutates it. Every operation runs synchronously and returns a
//! [`Transition`] describing what happened. A forward move that has to wait
//! for step content is parked and returned as [`Transition::Deferred`]; it is
//! applied later by [`WizardController::complete`] or dropped by
//! [`WizardController::abandon`].

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::commit::{CommitHandle, CommitToken, PendingTransition, TransitionKind};
use crate::config::{PendingPolicy, WizardConfig};
use crate::error::{CoreError, CoreResult};
use crate::navigation;
use crate::provider::StepProvider;
use crate::reconcile::{reconcile, refresh_last};
use crate::snapshot::{StepSnapshot, WizardSnapshot};
use crate::step::{StepContent, StepDescriptor, StepId, StepState};

/// Callbacks the host implements to learn when the wizard closes.
pub trait WizardHost: Send + Sync {
    /// Called once when `finish` completes. `show_detail` is true only when
    /// the caller asked for it and [`show_detail_available`](Self::show_detail_available) agreed.
    fn on_close(&self, show_detail: bool);

    fn show_detail_available(&self) -> bool {
        false
    }
}

/// Callback run after a forward move has been applied.
pub type Completion = Box<dyn FnOnce() + Send>;

/// Options for [`WizardController::next`].
#[derive(Default)]
pub struct AdvanceOptions {
    /// Leave the step without marking it done
    pub skip: bool,
    /// Move without asking the step content to commit
    pub only_go_next: bool,
    pub on_complete: Option<Completion>,
}

impl AdvanceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip(mut self) -> Self {
        self.skip = true;
        self
    }

    pub fn only_go_next(mut self) -> Self {
        self.only_go_next = true;
        self
    }

    pub fn on_complete(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for AdvanceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvanceOptions")
            .field("skip", &self.skip)
            .field("only_go_next", &self.only_go_next)
            .field("has_on_complete", &self.on_complete.is_some())
            .finish()
    }
}

/// Options for [`WizardController::finish`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FinishOptions {
    pub skip: bool,
    pub only_go_next: bool,
    /// Ask the host to show the detail view after closing
    pub show_detail: bool,
}

impl FinishOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip(mut self) -> Self {
        self.skip = true;
        self
    }

    pub fn only_go_next(mut self) -> Self {
        self.only_go_next = true;
        self
    }

    pub fn show_detail(mut self) -> Self {
        self.show_detail = true;
        self
    }
}

/// A move of the active flag from one step to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepChange {
    pub from: StepId,
    /// `None` when the wizard moved past its last step
    pub to: Option<StepId>,
    pub skipped: bool,
    pub at: DateTime<Utc>,
}

/// Result of a controller operation.
#[derive(Debug)]
pub enum Transition {
    /// Forward move applied
    Advanced(StepChange),
    /// Backward move applied
    Retreated(StepChange),
    /// Finish applied; the session is closed and the host was notified
    Finished { change: StepChange, show_detail: bool },
    /// Forward move parked until the step commits
    Deferred(PendingTransition),
    /// The active step refused to validate
    Blocked { step: StepId },
    /// `next` on a step with no successor
    AtEnd { step: StepId },
    /// `previous` on the first step
    AtStart { step: StepId },
    /// A commit is outstanding (or the loading lock is on)
    Busy { pending: Option<StepId> },
    /// A parked move was given up; nothing changed
    Abandoned { step: StepId, reason: String },
    /// No active step
    Idle,
}

impl Transition {
    /// Whether step state changed.
    pub fn is_applied(&self) -> bool {
        matches!(
            self,
            Self::Advanced(_) | Self::Retreated(_) | Self::Finished { .. }
        )
    }

    pub fn change(&self) -> Option<&StepChange> {
        match self {
            Self::Advanced(change) | Self::Retreated(change) | Self::Finished { change, .. } => {
                Some(change)
            }
            _ => None,
        }
    }

    pub fn into_pending(self) -> Option<PendingTransition> {
        match self {
            Self::Deferred(pending) => Some(pending),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Advanced(_) => "advanced",
            Self::Retreated(_) => "retreated",
            Self::Finished { .. } => "finished",
            Self::Deferred(_) => "deferred",
            Self::Blocked { .. } => "blocked",
            Self::AtEnd { .. } => "at_end",
            Self::AtStart { .. } => "at_start",
            Self::Busy { .. } => "busy",
            Self::Abandoned { .. } => "abandoned",
            Self::Idle => "idle",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Advanced(change) | Self::Retreated(change) => match &change.to {
                Some(to) => write!(f, "{} {} -> {}", self.name(), change.from, to),
                None => write!(f, "{} {} -> (end)", self.name(), change.from),
            },
            Self::Finished { change, show_detail } => {
                write!(f, "finished at {} (show_detail={})", change.from, show_detail)
            }
            Self::Deferred(pending) => {
                write!(f, "deferred {} on {}", pending.kind(), pending.step())
            }
            Self::Blocked { step } => write!(f, "blocked by {}", step),
            Self::AtEnd { step } => write!(f, "at end ({})", step),
            Self::AtStart { step } => write!(f, "at start ({})", step),
            Self::Busy { pending: Some(step) } => write!(f, "busy (commit pending on {})", step),
            Self::Busy { pending: None } => write!(f, "busy (loading)"),
            Self::Abandoned { step, reason } => write!(f, "abandoned {}: {}", step, reason),
            Self::Idle => write!(f, "idle"),
        }
    }
}

/// A forward move as requested by the caller.
pub(crate) struct Request {
    kind: TransitionKind,
    skip: bool,
    only_go_next: bool,
    show_detail: bool,
    on_complete: Option<Completion>,
}

impl Request {
    pub(crate) fn next(options: AdvanceOptions) -> Self {
        Self {
            kind: TransitionKind::Next,
            skip: options.skip,
            only_go_next: options.only_go_next,
            show_detail: false,
            on_complete: options.on_complete,
        }
    }

    pub(crate) fn finish(options: FinishOptions) -> Self {
        Self {
            kind: TransitionKind::Finish,
            skip: options.skip,
            only_go_next: options.only_go_next,
            show_detail: options.show_detail,
            on_complete: None,
        }
    }
}

/// Where the active step's `validate()` answer comes from.
pub(crate) enum Validation {
    /// Ask the content while holding `&mut self`
    Inline,
    /// Asked beforehand; `None` when there was no active step then
    Checked(Option<(StepId, bool)>),
}

/// Host code a transition still has to run.
///
/// The session runs these after releasing its lock so callbacks may use the
/// session again.
#[must_use]
#[derive(Default)]
pub(crate) struct Effects {
    commit_request: Option<(Arc<dyn StepContent>, CommitHandle)>,
    on_complete: Option<Completion>,
    on_close: Option<(Arc<dyn WizardHost>, bool)>,
}

impl Effects {
    pub(crate) fn run(self, transition: &mut Transition) {
        if let Some((content, handle)) = self.commit_request {
            content.request_commit(handle);
        }
        if let Some(callback) = self.on_complete {
            callback();
        }
        if let Some((host, requested)) = self.on_close {
            let show_detail = requested && host.show_detail_available();
            if let Transition::Finished {
                show_detail: shown, ..
            } = transition
            {
                *shown = show_detail;
            }
            host.on_close(show_detail);
        }
    }
}

fn idle(transition: Transition) -> (Transition, Effects) {
    (transition, Effects::default())
}

/// A parked forward move.
struct PendingSlot {
    token: CommitToken,
    step: StepId,
    request: Request,
}

/// The wizard state machine.
pub struct WizardController {
    session_id: Uuid,
    steps: Vec<StepState>,
    pending: Option<PendingSlot>,
    next_seq: u64,
    loading: bool,
    closed: bool,
    config: WizardConfig,
    host: Option<Arc<dyn WizardHost>>,
}

impl Default for WizardController {
    fn default() -> Self {
        Self::new(WizardConfig::default())
    }
}

impl WizardController {
    /// Create an empty controller. Steps arrive through [`reconcile`](Self::reconcile).
    pub fn new(config: WizardConfig) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            steps: Vec::new(),
            pending: None,
            next_seq: 0,
            loading: false,
            closed: false,
            config,
            host: None,
        }
    }

    pub fn with_host(mut self, host: Arc<dyn WizardHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Create a controller and run the first reconciliation.
    pub fn with_steps(config: WizardConfig, descriptors: Vec<StepDescriptor>) -> CoreResult<Self> {
        let mut controller = Self::new(config);
        controller.reconcile(descriptors)?;
        Ok(controller)
    }

    // Accessors

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &WizardConfig {
        &self.config
    }

    pub fn steps(&self) -> &[StepState] {
        &self.steps
    }

    pub fn step(&self, id: &str) -> Option<&StepState> {
        self.steps.iter().find(|s| s.id() == id)
    }

    pub fn active_step(&self) -> Option<&StepState> {
        navigation::active_step(&self.steps)
    }

    /// Step whose forward move is waiting on a commit.
    pub fn pending_step(&self) -> Option<&StepId> {
        self.pending.as_ref().map(|slot| &slot.step)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Toggle the busy indicator. Only blocks navigation when
    /// `loading_blocks_navigation` is configured.
    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn snapshot(&self) -> WizardSnapshot {
        WizardSnapshot {
            session_id: self.session_id,
            taken_at: Utc::now(),
            steps: self.steps.iter().map(StepSnapshot::from).collect(),
            active: self.active_step().map(|s| s.id().clone()),
            pending: self.pending_step().cloned(),
            loading: self.loading,
            closed: self.closed,
        }
    }

    // Step list

    /// Merge a freshly derived step list into the current state.
    ///
    /// A parked move whose step vanished or lost the active flag is dropped.
    pub fn reconcile(&mut self, descriptors: Vec<StepDescriptor>) -> CoreResult<()> {
        self.ensure_open()?;
        self.steps = reconcile(&self.steps, descriptors)?;

        if let Some(slot) = &self.pending {
            let still_active = navigation::position(&self.steps, &slot.step)
                .is_some_and(|index| self.steps[index].is_active);
            if !still_active {
                warn!(
                    "Dropping pending commit {} (step {} is no longer active)",
                    slot.token, slot.step
                );
                self.pending = None;
                self.loading = false;
            }
        }

        debug!("Reconciled {} steps", self.steps.len());
        Ok(())
    }

    /// Re-derive the steps from `provider` and reconcile them.
    pub fn refresh<C, P>(&mut self, provider: &P, context: &C) -> CoreResult<()>
    where
        P: StepProvider<C> + ?Sized,
    {
        let descriptors = provider.steps(context);
        self.reconcile(descriptors)
    }

    // Transitions

    /// Move forward from the active step.
    pub fn next(&mut self, options: AdvanceOptions) -> CoreResult<Transition> {
        let (mut transition, effects) = self.begin(Request::next(options), Validation::Inline)?;
        effects.run(&mut transition);
        Ok(transition)
    }

    /// Move forward and close the wizard, notifying the host.
    pub fn finish(&mut self, options: FinishOptions) -> CoreResult<Transition> {
        let (mut transition, effects) =
            self.begin(Request::finish(options), Validation::Inline)?;
        effects.run(&mut transition);
        Ok(transition)
    }

    /// Move back to the predecessor of the active step.
    pub fn previous(&mut self) -> CoreResult<Transition> {
        self.ensure_open()?;

        if let Some(slot) = &self.pending {
            match self.config.pending_previous {
                PendingPolicy::Reject => {
                    debug!("previous() refused, commit pending on {}", slot.step);
                    return Ok(Transition::Busy {
                        pending: Some(slot.step.clone()),
                    });
                }
                PendingPolicy::Cancel => {
                    info!("Discarding pending commit {} on {}", slot.token, slot.step);
                    self.pending = None;
                    self.loading = false;
                }
            }
        }

        if self.config.loading_blocks_navigation && self.loading {
            return Ok(Transition::Busy { pending: None });
        }

        let Some(index) = navigation::active_index(&self.steps) else {
            return Ok(Transition::Idle);
        };
        let from = self.steps[index].id().clone();
        if index == 0 {
            return Ok(Transition::AtStart { step: from });
        }

        let target = index - 1;
        if target == 0 {
            for state in &mut self.steps {
                state.is_first = false;
            }
        }
        self.steps[index].is_active = false;
        self.steps[target].activate();
        self.steps[target].is_first = target == 0;
        let to = self.steps[target].id().clone();

        info!("Step {} -> {} (back)", from, to);
        Ok(Transition::Retreated(StepChange {
            from,
            to: Some(to),
            skipped: false,
            at: Utc::now(),
        }))
    }

    /// Apply a parked move once its step has committed.
    ///
    /// Fails with [`CoreError::StaleCommit`] when the token no longer matches
    /// the parked move, the step lost the active flag, or the session closed.
    /// A token is honoured at most once.
    pub fn complete(&mut self, token: CommitToken) -> CoreResult<Transition> {
        let (mut transition, effects) = self.settle_commit(token)?;
        effects.run(&mut transition);
        Ok(transition)
    }

    /// Give up on a parked move. Step state is left untouched.
    pub fn abandon(&mut self, token: CommitToken, reason: impl Into<String>) -> CoreResult<Transition> {
        let slot = self.take_pending(token)?;
        let reason = reason.into();
        self.loading = false;

        warn!("Commit {} on step {} abandoned: {}", token, slot.step, reason);
        Ok(Transition::Abandoned {
            step: slot.step,
            reason,
        })
    }

    /// End the session. Later commits are rejected as stale.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Some(slot) = self.pending.take() {
            debug!("Closing with pending commit {} on {}", slot.token, slot.step);
        }
        self.closed = true;
        self.loading = false;
        info!("Wizard session {} closed", self.session_id);
    }

    /// Start a forward move. Host code the move triggers is returned in
    /// [`Effects`] rather than called.
    pub(crate) fn begin(
        &mut self,
        request: Request,
        validation: Validation,
    ) -> CoreResult<(Transition, Effects)> {
        self.ensure_open()?;

        if let Some(slot) = &self.pending {
            debug!("{}() refused, commit pending on {}", request.kind, slot.step);
            return Ok(idle(Transition::Busy {
                pending: Some(slot.step.clone()),
            }));
        }
        if self.config.loading_blocks_navigation && self.loading {
            return Ok(idle(Transition::Busy { pending: None }));
        }

        let Some(index) = navigation::active_index(&self.steps) else {
            return Ok(idle(Transition::Idle));
        };
        let current = &self.steps[index];
        let step = current.id().clone();
        let content = current.content().cloned();
        let terminal = current.is_last || index + 1 >= self.steps.len();

        let valid = match validation {
            Validation::Inline => content.as_ref().map_or(true, |content| content.validate()),
            Validation::Checked(Some((checked, valid))) if checked == step => valid,
            Validation::Checked(_) => {
                debug!("Active step changed to {} during validation", step);
                return Ok(idle(Transition::Busy { pending: None }));
            }
        };
        if !valid {
            debug!("Step {} did not validate", step);
            return Ok(idle(Transition::Blocked { step }));
        }

        if request.kind == TransitionKind::Next && terminal {
            debug!("next() on final step {}", step);
            return Ok(idle(Transition::AtEnd { step }));
        }

        let content = match content {
            Some(content) if !(request.only_go_next || request.skip) => content,
            _ => return Ok(self.apply(index, request)),
        };

        let defers = content.defers_commit();
        let before_advance = content.has_before_advance();
        if !defers && !before_advance {
            return Ok(self.apply(index, request));
        }

        let token = CommitToken::new(self.session_id, self.next_seq);
        self.next_seq += 1;
        let kind = request.kind;
        self.pending = Some(PendingSlot {
            token,
            step: step.clone(),
            request,
        });
        self.loading = true;
        info!("Step {} waiting on commit {} ({})", step, token, kind);

        let mut effects = Effects::default();
        let receiver = if defers {
            let (handle, receiver) = CommitHandle::channel(token, step.clone());
            effects.commit_request = Some((content.clone(), handle));
            Some(receiver)
        } else {
            None
        };

        let pending = PendingTransition::new(
            token,
            step,
            kind,
            receiver,
            before_advance.then_some(content),
        );
        Ok((Transition::Deferred(pending), effects))
    }

    /// Apply the parked move for `token`, returning the host code it triggers.
    pub(crate) fn settle_commit(&mut self, token: CommitToken) -> CoreResult<(Transition, Effects)> {
        if self.closed {
            warn!("Ignoring commit {} for a closed wizard", token);
            return Err(CoreError::stale(token, "wizard session is closed"));
        }

        let slot = self.take_pending(token)?;
        let Some(index) = navigation::position(&self.steps, &slot.step)
            .filter(|index| self.steps[*index].is_active)
        else {
            self.loading = false;
            return Err(CoreError::stale(
                token,
                format!("step {} is no longer active", slot.step),
            ));
        };

        Ok(self.apply(index, slot.request))
    }

    fn apply(&mut self, index: usize, request: Request) -> (Transition, Effects) {
        let Request {
            kind,
            skip,
            show_detail,
            on_complete,
            ..
        } = request;

        let from = self.steps[index].id().clone();
        let stops_here = kind == TransitionKind::Finish && self.steps[index].is_last;
        self.steps[index].leave(skip);

        let to = if stops_here {
            None
        } else {
            self.steps.get_mut(index + 1).map(|next| {
                next.activate();
                next.id().clone()
            })
        };
        refresh_last(&mut self.steps);
        self.pending = None;
        self.loading = false;

        match &to {
            Some(to) => info!("Step {} -> {}{}", from, to, if skip { " (skipped)" } else { "" }),
            None => info!("Step {} completed, no further steps", from),
        }

        let mut effects = Effects {
            on_complete,
            ..Effects::default()
        };
        let change = StepChange {
            from,
            to,
            skipped: skip,
            at: Utc::now(),
        };

        let transition = match kind {
            TransitionKind::Next => Transition::Advanced(change),
            TransitionKind::Finish => {
                self.closed = true;
                info!("Wizard session {} finished", self.session_id);
                effects.on_close = self.host.clone().map(|host| (host, show_detail));
                Transition::Finished {
                    change,
                    show_detail: show_detail && self.host.is_some(),
                }
            }
        };
        (transition, effects)
    }

    fn take_pending(&mut self, token: CommitToken) -> CoreResult<PendingSlot> {
        match self.pending.take() {
            Some(slot) if slot.token == token => Ok(slot),
            Some(other) => {
                self.pending = Some(other);
                Err(CoreError::stale(token, "superseded by a newer commit"))
            }
            None => Err(CoreError::stale(token, "no commit pending")),
        }
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.closed {
            Err(CoreError::SessionClosed)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for WizardController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WizardController")
            .field("session_id", &self.session_id)
            .field("steps", &self.steps.iter().map(|s| s.id()).collect::<Vec<_>>())
            .field("pending", &self.pending_step())
            .field("loading", &self.loading)
            .field("closed", &self.closed)
            .finish()
    }
}
