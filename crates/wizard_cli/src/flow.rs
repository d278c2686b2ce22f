//! Flow files: YAML descriptions of a wizard and a script to drive it.
//!
//! ```yaml
//! name: connector-setup
//! detail_available: true
//! config:
//!   pending_previous: cancel
//!   commit_timeout_ms: 2000
//! context:
//!   source: postgres
//! steps:
//!   - id: source
//!     label: Select source
//!   - id: schema
//!     label: Edit schema
//!     when: { source: postgres }
//!     skippable: true
//!     content:
//!       commit: delayed
//!       delay_ms: 50
//!   - id: review
//!     label: Review
//!     content:
//!       before_advance: ok
//! script:
//!   - next
//!   - skip
//!   - previous
//!   - set source=s3
//!   - finish --detail
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use wizard_core::{
    CommitHandle, CoreError, CoreResult, StepContent, StepDescriptor, StepProvider, WizardConfig,
};

/// Host context the steps are derived from.
pub type FlowContext = BTreeMap<String, String>;

/// A parsed flow file.
#[derive(Debug, Clone, Deserialize)]
pub struct FlowFile {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Whether the host offers a detail view after finishing
    #[serde(default)]
    pub detail_available: bool,
    #[serde(default)]
    pub config: WizardConfig,
    #[serde(default)]
    pub context: FlowContext,
    pub steps: Vec<StepSpec>,
    #[serde(default)]
    pub script: Vec<String>,
}

/// One step definition in a flow file.
#[derive(Debug, Clone, Deserialize)]
pub struct StepSpec {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub help: Option<String>,
    #[serde(default)]
    pub skippable: bool,
    #[serde(default)]
    pub last: Option<bool>,
    #[serde(default)]
    pub hide_finish: bool,
    #[serde(default)]
    pub hide_footer: bool,
    /// Context entries that must all match for the step to be derived
    #[serde(default)]
    pub when: BTreeMap<String, String>,
    #[serde(default)]
    pub content: Option<ContentSpec>,
}

impl StepSpec {
    pub fn applies_to(&self, context: &FlowContext) -> bool {
        self.when
            .iter()
            .all(|(key, value)| context.get(key) == Some(value))
    }
}

/// How a step's scripted content behaves.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContentSpec {
    pub valid: bool,
    pub commit: CommitMode,
    pub delay_ms: u64,
    pub before_advance: Option<ActionMode>,
}

impl Default for ContentSpec {
    fn default() -> Self {
        Self {
            valid: true,
            commit: CommitMode::None,
            delay_ms: 0,
            before_advance: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// The step has nothing to commit
    #[default]
    None,
    Immediate,
    Reject,
    Delayed,
    /// Holds the handle forever
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionMode {
    Ok,
    Fail,
}

/// One scripted user action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Next,
    Skip,
    GoNext,
    Previous,
    Finish { show_detail: bool },
    Set { key: String, value: String },
    Loading(bool),
}

impl Action {
    pub fn parse(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or_default();
        let rest: Vec<&str> = words.collect();

        let action = match (verb, rest.as_slice()) {
            ("next", []) => Self::Next,
            ("skip", []) => Self::Skip,
            ("go-next", []) | ("go_next", []) => Self::GoNext,
            ("previous", []) | ("back", []) => Self::Previous,
            ("finish", []) => Self::Finish { show_detail: false },
            ("finish", ["--detail"]) => Self::Finish { show_detail: true },
            ("set", [assignment]) => {
                let (key, value) = parse_assignment(assignment)?;
                Self::Set { key, value }
            }
            ("loading", ["on"]) => Self::Loading(true),
            ("loading", ["off"]) => Self::Loading(false),
            _ => bail!("Unknown script action: '{}'", line.trim()),
        };
        Ok(action)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Next => write!(f, "next"),
            Self::Skip => write!(f, "skip"),
            Self::GoNext => write!(f, "go-next"),
            Self::Previous => write!(f, "previous"),
            Self::Finish { show_detail: false } => write!(f, "finish"),
            Self::Finish { show_detail: true } => write!(f, "finish --detail"),
            Self::Set { key, value } => write!(f, "set {}={}", key, value),
            Self::Loading(true) => write!(f, "loading on"),
            Self::Loading(false) => write!(f, "loading off"),
        }
    }
}

/// Split `key=value`.
pub fn parse_assignment(input: &str) -> Result<(String, String)> {
    match input.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => bail!("Invalid assignment '{}', expected key=value", input),
    }
}

/// Problems found in a flow file.
#[derive(Debug, Default)]
pub struct FlowReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl FlowReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl FlowFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Flow file not found: {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid flow file: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let flow: Self = serde_yaml::from_str(content)?;
        debug!("Loaded flow '{}' with {} steps", flow.name, flow.steps.len());
        Ok(flow)
    }

    pub fn actions(&self) -> Result<Vec<Action>> {
        self.script.iter().map(|line| Action::parse(line)).collect()
    }

    /// Check the flow for mistakes the engine would only report at run time.
    pub fn check(&self) -> FlowReport {
        let mut report = FlowReport::default();

        if self.steps.is_empty() {
            report.errors.push("Flow defines no steps".to_string());
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                report.errors.push(format!("Duplicate step id: {}", step.id));
            }
            for key in step.when.keys() {
                if !self.context.contains_key(key) && !self.sets_key(key) {
                    report.warnings.push(format!(
                        "Step '{}' depends on context key '{}' which is never set",
                        step.id, key
                    ));
                }
            }
            if let Some(content) = &step.content {
                if content.commit == CommitMode::Never && self.config.commit_timeout_ms.is_none() {
                    report.warnings.push(format!(
                        "Step '{}' never commits and no commit_timeout_ms is set; the run will hang",
                        step.id
                    ));
                }
                if content.commit != CommitMode::Delayed && content.delay_ms > 0 {
                    report.warnings.push(format!(
                        "Step '{}' sets delay_ms without commit: delayed",
                        step.id
                    ));
                }
            }
        }

        for line in &self.script {
            if let Err(e) = Action::parse(line) {
                report.errors.push(e.to_string());
            }
        }

        if !self.steps.is_empty() && FlowProvider::new(self).steps(&self.context).is_empty() {
            report
                .warnings
                .push("No step applies to the initial context".to_string());
        }

        report
    }

    fn sets_key(&self, key: &str) -> bool {
        self.actions()
            .map(|actions| {
                actions
                    .iter()
                    .any(|a| matches!(a, Action::Set { key: k, .. } if k == key))
            })
            .unwrap_or(false)
    }
}

/// Step content driven by a [`ContentSpec`].
pub struct ScriptedContent {
    step: String,
    behavior: ContentSpec,
}

impl ScriptedContent {
    pub fn new(step: impl Into<String>, behavior: ContentSpec) -> Self {
        Self {
            step: step.into(),
            behavior,
        }
    }
}

#[async_trait]
impl StepContent for ScriptedContent {
    fn validate(&self) -> bool {
        self.behavior.valid
    }

    fn defers_commit(&self) -> bool {
        self.behavior.commit != CommitMode::None
    }

    fn request_commit(&self, handle: CommitHandle) {
        match self.behavior.commit {
            CommitMode::None | CommitMode::Immediate => {
                handle.commit();
            }
            CommitMode::Reject => {
                handle.reject(format!("{} rejected its commit", self.step));
            }
            CommitMode::Delayed => {
                let delay = Duration::from_millis(self.behavior.delay_ms);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    handle.commit();
                });
            }
            CommitMode::Never => {
                tokio::spawn(async move {
                    std::future::pending::<()>().await;
                    drop(handle);
                });
            }
        }
    }

    fn has_before_advance(&self) -> bool {
        self.behavior.before_advance.is_some()
    }

    async fn before_advance(&self) -> CoreResult<()> {
        match self.behavior.before_advance {
            Some(ActionMode::Fail) => Err(CoreError::ActionFailed {
                step: self.step.clone(),
                message: format!("pre-advance action of {} failed", self.step),
            }),
            _ => Ok(()),
        }
    }
}

/// Derives descriptors from a flow's step specs.
///
/// Content objects are created once so a step keeps the same content
/// across re-derivations.
pub struct FlowProvider {
    steps: Vec<(StepSpec, Option<Arc<dyn StepContent>>)>,
}

impl FlowProvider {
    pub fn new(flow: &FlowFile) -> Self {
        let steps = flow
            .steps
            .iter()
            .map(|spec| {
                let content = spec.content.clone().map(|content| {
                    Arc::new(ScriptedContent::new(&spec.id, content)) as Arc<dyn StepContent>
                });
                (spec.clone(), content)
            })
            .collect();
        Self { steps }
    }
}

impl StepProvider<FlowContext> for FlowProvider {
    fn steps(&self, context: &FlowContext) -> Vec<StepDescriptor> {
        self.steps
            .iter()
            .filter(|(spec, _)| spec.applies_to(context))
            .map(|(spec, content)| {
                let mut descriptor = StepDescriptor::new(spec.id.as_str(), spec.label.as_str());
                descriptor.help_text = spec.help.clone();
                descriptor.is_skippable = spec.skippable;
                descriptor.is_last_override = spec.last;
                descriptor.hide_finish_button = spec.hide_finish;
                descriptor.hide_footer = spec.hide_footer;
                descriptor.content = content.clone();
                descriptor
            })
            .collect()
    }
}
