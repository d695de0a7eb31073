use std::time::Duration;

use derive_more::{Display, From};
use log::warn;
use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::{Error, Result};

/// How long the platform keeps generated media around. Informational only.
pub const GENERATED_MEDIA_VALIDITY: Duration = Duration::from_secs(24 * 60 * 60);

/// Opaque id of a server-side task. The only thing needed to poll it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskHandle(String);

impl TaskHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskHandle {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Statuses DashScope documents for `output.task_status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Suspended,
    Succeeded,
    Failed,
    Canceled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskResult {
    Pending,
    Running,
    Succeeded(TaskOutput),
    Failed { reason: String },
    /// A status string we don't know. Treated as non-terminal, so the
    /// polling loop keeps going until it reaches its deadline.
    Unrecognized(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutput {
    pub task_id: TaskHandle,
    pub assets: Vec<Asset>,
    /// Items of a batch that failed while the task as a whole succeeded.
    pub failures: Vec<ItemFailure>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub url: String,
    /// The prompt after the platform's rewriting, when it reports one.
    pub actual_prompt: Option<String>,
    pub validity: Duration,
}

impl Asset {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            actual_prompt: None,
            validity: GENERATED_MEDIA_VALIDITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Usage {
    pub image_count: Option<u32>,
    pub video_count: Option<u32>,
    pub video_duration: Option<f64>,
    pub video_ratio: Option<String>,
}

// ---------------------------------------------------------------------------
// Wire format of `POST .../image-synthesis` and `GET /tasks/{id}`
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct TaskEnvelope {
    pub request_id: Option<String>,
    pub output: Option<WireOutput>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireOutput {
    pub task_id: Option<String>,
    pub task_status: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub results: Vec<WireResult>,
    pub video_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireResult {
    pub url: Option<String>,
    pub actual_prompt: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
}

impl TaskEnvelope {
    pub(crate) fn into_handle(self) -> Result<TaskHandle> {
        self.output
            .and_then(|o| o.task_id)
            .map(TaskHandle::new)
            .ok_or_else(|| {
                Error::MalformedResponse(format!(
                    "no output.task_id in submit response (request {})",
                    self.request_id.as_deref().unwrap_or("?")
                ))
            })
    }

    pub(crate) fn into_result(self, handle: &TaskHandle) -> Result<TaskResult> {
        let output = self.output.ok_or_else(|| {
            Error::MalformedResponse(format!("no output in status of task {handle}"))
        })?;
        let status = output.task_status.as_deref().ok_or_else(|| {
            Error::MalformedResponse(format!("no output.task_status for task {handle}"))
        })?;

        let Ok(status) = status.parse::<TaskStatus>() else {
            warn!("Task {handle} reported unrecognized status {status:?}");
            return Ok(TaskResult::Unrecognized(status.to_string()));
        };

        Ok(match status {
            TaskStatus::Pending | TaskStatus::Suspended => TaskResult::Pending,
            TaskStatus::Running => TaskResult::Running,
            TaskStatus::Failed => TaskResult::Failed {
                reason: output
                    .message
                    .or(output.code)
                    .unwrap_or_else(|| "unknown error".into()),
            },
            TaskStatus::Canceled => TaskResult::Failed {
                reason: output.message.unwrap_or_else(|| "task was canceled".into()),
            },
            TaskStatus::Succeeded => {
                let mut assets = vec![];
                let mut failures = vec![];
                for item in output.results {
                    match item.url {
                        Some(url) => assets.push(Asset {
                            actual_prompt: item.actual_prompt,
                            ..Asset::new(url)
                        }),
                        None => failures.push(ItemFailure {
                            code: item.code.unwrap_or_default(),
                            message: item.message.unwrap_or_default(),
                        }),
                    }
                }
                if let Some(url) = output.video_url {
                    assets.push(Asset::new(url));
                }
                TaskResult::Succeeded(TaskOutput {
                    task_id: handle.clone(),
                    assets,
                    failures,
                    usage: self.usage,
                })
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(json: &str) -> Result<TaskResult> {
        serde_json::from_str::<TaskEnvelope>(json)
            .unwrap()
            .into_result(&TaskHandle::new("T1"))
    }

    #[test]
    fn image_results_become_assets_and_failures() {
        let result = parse(
            r#"{
                "request_id": "r",
                "output": {
                    "task_id": "T1",
                    "task_status": "SUCCEEDED",
                    "results": [
                        {"url": "http://x/1.png", "orig_prompt": "a rose", "actual_prompt": "a red rose"},
                        {"code": "DataInspectionFailed", "message": "blocked"}
                    ]
                },
                "usage": {"image_count": 1}
            }"#,
        )
        .unwrap();

        let TaskResult::Succeeded(output) = result else {
            panic!("expected success, got {result:?}");
        };
        assert_eq!(output.assets.len(), 1);
        assert_eq!(output.assets[0].url, "http://x/1.png");
        assert_eq!(output.assets[0].actual_prompt.as_deref(), Some("a red rose"));
        assert_eq!(output.assets[0].validity, GENERATED_MEDIA_VALIDITY);
        assert_eq!(
            output.failures,
            vec![ItemFailure {
                code: "DataInspectionFailed".into(),
                message: "blocked".into()
            }]
        );
        assert_eq!(output.usage.unwrap().image_count, Some(1));
    }

    #[test]
    fn video_url_becomes_single_asset() {
        let result = parse(
            r#"{"output": {"task_id": "T1", "task_status": "SUCCEEDED", "video_url": "http://x/v.mp4"}}"#,
        )
        .unwrap();
        let TaskResult::Succeeded(output) = result else {
            panic!("expected success");
        };
        assert_eq!(output.assets, vec![Asset::new("http://x/v.mp4")]);
    }

    #[test]
    fn failed_message_is_surfaced_verbatim() {
        let result = parse(
            r#"{"output": {"task_id": "T1", "task_status": "FAILED", "code": "Throttling", "message": "quota exceeded"}}"#,
        )
        .unwrap();
        assert_eq!(
            result,
            TaskResult::Failed {
                reason: "quota exceeded".into()
            }
        );
    }

    #[test]
    fn unknown_status_is_kept() {
        let result =
            parse(r#"{"output": {"task_id": "T1", "task_status": "WARMING_UP"}}"#).unwrap();
        assert_eq!(result, TaskResult::Unrecognized("WARMING_UP".into()));
    }

    #[test]
    fn missing_status_is_malformed() {
        let err = parse(r#"{"output": {"task_id": "T1"}}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)), "{err:?}");
    }

    #[test]
    fn submit_without_task_id_is_malformed() {
        let envelope: TaskEnvelope =
            serde_json::from_str(r#"{"request_id": "r-9", "output": {}}"#).unwrap();
        let err = envelope.into_handle().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Malformed response: no output.task_id in submit response (request r-9)"
        );
    }
}
