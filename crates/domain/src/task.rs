use engine_core::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

use crate::submission::non_empty;

/// 运行时任务描述，入队成功后返回给调用方，不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    organization_uuid: String,
    uuid: String,
    task_type: String,
    component_uuid: Option<String>,
    component_key: Option<String>,
    component_name: Option<String>,
    submitter_login: Option<String>,
}

impl Task {
    pub fn builder() -> TaskBuilder {
        TaskBuilder::default()
    }

    pub fn organization_uuid(&self) -> &str {
        &self.organization_uuid
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

    pub fn component_key(&self) -> Option<&str> {
        self.component_key.as_deref()
    }

    pub fn component_name(&self) -> Option<&str> {
        self.component_name.as_deref()
    }

    pub fn submitter_login(&self) -> Option<&str> {
        self.submitter_login.as_deref()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskBuilder {
    organization_uuid: Option<String>,
    uuid: Option<String>,
    task_type: Option<String>,
    component_uuid: Option<String>,
    component_key: Option<String>,
    component_name: Option<String>,
    submitter_login: Option<String>,
}

impl TaskBuilder {
    pub fn with_organization_uuid(mut self, organization_uuid: impl Into<String>) -> Self {
        self.organization_uuid = Some(organization_uuid.into());
        self
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    pub fn with_component_uuid(mut self, component_uuid: Option<String>) -> Self {
        self.component_uuid = component_uuid;
        self
    }

    pub fn with_component_key(mut self, component_key: Option<String>) -> Self {
        self.component_key = component_key;
        self
    }

    pub fn with_component_name(mut self, component_name: Option<String>) -> Self {
        self.component_name = component_name;
        self
    }

    pub fn with_submitter_login(mut self, submitter_login: Option<String>) -> Self {
        self.submitter_login = submitter_login;
        self
    }

    pub fn build(self) -> EngineResult<Task> {
        let organization_uuid = non_empty(self.organization_uuid).ok_or(EngineError::MissingField {
            field: "organizationUuid",
        })?;
        let uuid = non_empty(self.uuid).ok_or(EngineError::MissingField { field: "uuid" })?;
        let task_type = non_empty(self.task_type).ok_or(EngineError::MissingField { field: "type" })?;

        Ok(Task {
            organization_uuid,
            uuid,
            task_type,
            component_uuid: non_empty(self.component_uuid),
            component_key: non_empty(self.component_key),
            component_name: non_empty(self.component_name),
            submitter_login: non_empty(self.submitter_login),
        })
    }
}
