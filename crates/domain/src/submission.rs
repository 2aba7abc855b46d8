use engine_core::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

/// 调用方提交的任务请求
///
/// 只能通过 [`TaskSubmissionBuilder`] 构建，`uuid` 与 `task_type` 在 `build()` 时校验。
/// 反序列化同样经过 `build()`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SubmissionFields")]
pub struct TaskSubmission {
    uuid: String,
    task_type: String,
    component_uuid: Option<String>,
    submitter_login: Option<String>,
}

impl TaskSubmission {
    pub fn builder(uuid: impl Into<String>) -> TaskSubmissionBuilder {
        TaskSubmissionBuilder::new(uuid)
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    pub fn component_uuid(&self) -> Option<&str> {
        self.component_uuid.as_deref()
    }

    pub fn submitter_login(&self) -> Option<&str> {
        self.submitter_login.as_deref()
    }
}

/// 反序列化时的原始字段
#[derive(Deserialize)]
struct SubmissionFields {
    uuid: String,
    task_type: Option<String>,
    component_uuid: Option<String>,
    submitter_login: Option<String>,
}

impl TryFrom<SubmissionFields> for TaskSubmission {
    type Error = EngineError;

    fn try_from(fields: SubmissionFields) -> EngineResult<Self> {
        TaskSubmissionBuilder {
            uuid: fields.uuid,
            task_type: fields.task_type,
            component_uuid: fields.component_uuid,
            submitter_login: fields.submitter_login,
        }
        .build()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskSubmissionBuilder {
    uuid: String,
    task_type: Option<String>,
    component_uuid: Option<String>,
    submitter_login: Option<String>,
}

impl TaskSubmissionBuilder {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            ..Self::default()
        }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    pub fn with_component_uuid(mut self, component_uuid: Option<impl Into<String>>) -> Self {
        self.component_uuid = component_uuid.map(Into::into);
        self
    }

    pub fn with_submitter_login(mut self, submitter_login: Option<impl Into<String>>) -> Self {
        self.submitter_login = submitter_login.map(Into::into);
        self
    }

    pub fn build(self) -> EngineResult<TaskSubmission> {
        if self.uuid.trim().is_empty() {
            return Err(EngineError::MissingField { field: "uuid" });
        }
        let task_type = non_empty(self.task_type).ok_or(EngineError::MissingField { field: "type" })?;

        Ok(TaskSubmission {
            uuid: self.uuid,
            task_type,
            component_uuid: non_empty(self.component_uuid),
            submitter_login: non_empty(self.submitter_login),
        })
    }
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_with_all_fields() {
        let submission = TaskSubmission::builder("T1")
            .with_task_type("REPORT")
            .with_component_uuid(Some("C1"))
            .with_submitter_login(Some("admin"))
            .build()
            .unwrap();

        assert_eq!(submission.uuid(), "T1");
        assert_eq!(submission.task_type(), "REPORT");
        assert_eq!(submission.component_uuid(), Some("C1"));
        assert_eq!(submission.submitter_login(), Some("admin"));
    }

    #[test]
    fn test_missing_type_fails_with_named_field() {
        let err = TaskSubmission::builder("T1").build().unwrap_err();
        assert!(matches!(err, EngineError::MissingField { field: "type" }));

        let err = TaskSubmission::builder("T1").with_task_type("").build().unwrap_err();
        assert!(matches!(err, EngineError::MissingField { field: "type" }));
    }

    #[test]
    fn test_missing_uuid_fails_with_named_field() {
        let err = TaskSubmission::builder("")
            .with_task_type("REPORT")
            .build()
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingField { field: "uuid" }));
        assert!(err.is_precondition_violation());
    }

    #[test]
    fn test_empty_optional_fields_become_none() {
        let submission = TaskSubmission::builder("T1")
            .with_task_type("REPORT")
            .with_component_uuid(Some(""))
            .with_submitter_login(None::<String>)
            .build()
            .unwrap();

        assert_eq!(submission.component_uuid(), None);
        assert_eq!(submission.submitter_login(), None);
    }

    #[test]
    fn test_deserialize_goes_through_build() {
        let submission: TaskSubmission = serde_json::from_str(
            r#"{"uuid":"T1","task_type":"REPORT","component_uuid":"","submitter_login":"admin"}"#,
        )
        .unwrap();
        assert_eq!(submission.uuid(), "T1");
        assert_eq!(submission.component_uuid(), None);
        assert_eq!(submission.submitter_login(), Some("admin"));

        let empty_uuid =
            serde_json::from_str::<TaskSubmission>(r#"{"uuid":"","task_type":"REPORT"}"#);
        assert!(empty_uuid.unwrap_err().to_string().contains("uuid can't be empty"));

        let missing_type = serde_json::from_str::<TaskSubmission>(r#"{"uuid":"T1"}"#);
        assert!(missing_type.unwrap_err().to_string().contains("type can't be empty"));
    }
}
