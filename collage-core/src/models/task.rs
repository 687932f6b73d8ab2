use std::fmt;

use serde::{Deserialize, Serialize};

use super::audio_models::SourceUrl;
use super::error::CollageError;

/// Identifier assigned by the processing service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Processing task lifecycle.
///
/// ```text
/// queued → running → completed
///    └────────┴────→ failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[serde(alias = "pending")]
    Queued,
    #[serde(alias = "progress", alias = "started")]
    Running,
    #[serde(alias = "success")]
    Completed,
    #[serde(alias = "failure")]
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Running => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Whether moving to `next` keeps the lifecycle moving forward.
    pub fn can_advance_to(&self, next: TaskStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

/// Counter attached to a stage, e.g. voice 2 of 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub current: u32,
    pub total: u32,
}

impl TaskProgress {
    /// Completed fraction in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (f64::from(self.current) / f64::from(self.total)).clamp(0.0, 1.0)
    }
}

/// One status answer from the processing service.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: TaskStatus,
    pub stage: Option<String>,
    pub progress: Option<TaskProgress>,
    pub error: Option<String>,
}

impl StatusReport {
    pub fn new(status: TaskStatus) -> Self {
        Self {
            status,
            stage: None,
            progress: None,
            error: None,
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_progress(mut self, current: u32, total: u32) -> Self {
        self.progress = Some(TaskProgress { current, total });
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// A server-side combination job for one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingTask {
    pub task_id: TaskId,
    pub collection_id: String,
    pub status: TaskStatus,
    /// Free-text label of the current stage.
    pub stage: Option<String>,
    pub progress: Option<TaskProgress>,
    /// Present only once the task is `Failed`.
    pub error: Option<CollageError>,
    /// Every status answer that was applied, in request order.
    pub history: Vec<StatusReport>,
    /// Where the combined artifact can be loaded from, once `Completed`.
    pub artifact: Option<SourceUrl>,
}

impl ProcessingTask {
    pub fn queued(task_id: TaskId, collection_id: impl Into<String>) -> Self {
        Self {
            task_id,
            collection_id: collection_id.into(),
            status: TaskStatus::Queued,
            stage: Some("queued".into()),
            progress: None,
            error: None,
            history: Vec::new(),
            artifact: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Stage labels in the order they were observed.
    pub fn stage_history(&self) -> Vec<Option<&str>> {
        self.history.iter().map(|r| r.stage.as_deref()).collect()
    }

    /// Apply a status answer. Regressions are ignored and nothing changes once terminal.
    /// Returns whether the answer was applied.
    pub(crate) fn apply(&mut self, report: StatusReport) -> bool {
        if !self.status.can_advance_to(report.status) {
            return false;
        }
        self.status = report.status;
        if report.stage.is_some() {
            self.stage = report.stage.clone();
        }
        if report.progress.is_some() {
            self.progress = report.progress;
        }
        if report.status == TaskStatus::Failed {
            let message = report
                .error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string());
            self.error = Some(CollageError::Processing(message));
        }
        self.history.push(report);
        true
    }

    /// Force the task into `Failed` with a locally derived error (e.g. timeout).
    pub(crate) fn fail(&mut self, error: CollageError) {
        if self.is_terminal() {
            return;
        }
        self.status = TaskStatus::Failed;
        self.stage = Some("failed".into());
        self.error = Some(error);
    }
}
