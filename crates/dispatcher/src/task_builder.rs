//! 队列记录到运行时 `Task` 的转换

use engine_core::EngineResult;
use engine_domain::{ComponentMetadata, QueuedTaskRecord, Task};
use std::collections::HashMap;

/// 由队列记录和组件查找表构建 `Task`
///
/// 组件命中时使用其 key、name 和组织；记录没有组件或查找未命中时，
/// 组织取 `default_organization_uuid`，key 与 name 留空。
pub fn build_task(
    record: &QueuedTaskRecord,
    default_organization_uuid: &str,
    components: &HashMap<String, ComponentMetadata>,
) -> EngineResult<Task> {
    let component = record
        .component_uuid
        .as_ref()
        .and_then(|uuid| components.get(uuid));

    let builder = Task::builder()
        .with_uuid(record.uuid.clone())
        .with_task_type(record.task_type.clone())
        .with_component_uuid(record.component_uuid.clone())
        .with_submitter_login(record.submitter_login.clone());

    let builder = match component {
        Some(component) => builder
            .with_organization_uuid(component.organization_uuid.clone())
            .with_component_key(Some(component.key.clone()))
            .with_component_name(Some(component.name.clone())),
        None => builder.with_organization_uuid(default_organization_uuid),
    };

    builder.build()
}
