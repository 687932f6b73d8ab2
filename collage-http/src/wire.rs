//! Request and response bodies that have no direct counterpart in the core models.

use collage_core::{StatusReport, TaskId, TaskProgress, TaskStatus};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct TaskCreated {
    pub task_id: TaskId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TaskStatusBody {
    pub status: TaskStatus,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub current: Option<u32>,
    #[serde(default)]
    pub total: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
}

impl From<TaskStatusBody> for StatusReport {
    fn from(body: TaskStatusBody) -> Self {
        let progress = match (body.current, body.total) {
            (Some(current), Some(total)) => Some(TaskProgress { current, total }),
            _ => None,
        };
        StatusReport {
            status: body.status,
            stage: body.stage,
            progress,
            error: body.error,
        }
    }
}

/// Error payload; `detail` is a string for most failures and a list for
/// field validation errors.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub detail: serde_json::Value,
}

impl ErrorBody {
    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
