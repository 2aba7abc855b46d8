//! 表结构。时间字段统一以毫秒时间戳存储，保证按创建时间排序的稳定性。

pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS queued_tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        uuid TEXT NOT NULL UNIQUE,
        task_type TEXT NOT NULL,
        component_uuid TEXT,
        status TEXT NOT NULL,
        submitter_login TEXT,
        worker_uuid TEXT,
        execution_count INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        started_at INTEGER
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_queued_tasks_component ON queued_tasks (component_uuid)",
    "CREATE INDEX IF NOT EXISTS idx_queued_tasks_created ON queued_tasks (created_at, id)",
    r#"
    CREATE TABLE IF NOT EXISTS task_activities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        uuid TEXT NOT NULL UNIQUE,
        task_type TEXT NOT NULL,
        component_uuid TEXT,
        status TEXT NOT NULL,
        submitter_login TEXT,
        worker_uuid TEXT,
        execution_count INTEGER NOT NULL DEFAULT 0,
        analysis_uuid TEXT,
        submitted_at INTEGER NOT NULL,
        started_at INTEGER,
        executed_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS task_inputs (
        task_uuid TEXT PRIMARY KEY,
        input_data BLOB,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS components (
        uuid TEXT PRIMARY KEY,
        component_key TEXT NOT NULL,
        name TEXT NOT NULL,
        organization_uuid TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS internal_properties (
        kee TEXT PRIMARY KEY,
        text_value TEXT NOT NULL
    )
    "#,
];
