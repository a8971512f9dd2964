//! Version-tracked database migrations.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS permissions (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                category TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS roles (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT '',
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS role_permissions (
                role_id TEXT NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
                permission_id TEXT NOT NULL REFERENCES permissions(id),
                PRIMARY KEY (role_id, permission_id)
            );

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                role_id TEXT REFERENCES roles(id),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_role ON users(role_id);

            CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                phone TEXT,
                license_number TEXT,
                status TEXT NOT NULL DEFAULT 'active',
                commission_split TEXT,
                banking_info TEXT,
                emergency_contact TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_agents_status ON agents(status);

            CREATE TABLE IF NOT EXISTS pipelines (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'active',
                access_mode TEXT NOT NULL DEFAULT 'all',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS stages (
                id TEXT PRIMARY KEY,
                pipeline_id TEXT NOT NULL REFERENCES pipelines(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                position INTEGER NOT NULL,
                color TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_stages_pipeline ON stages(pipeline_id);

            CREATE TABLE IF NOT EXISTS task_templates (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL,
                priority TEXT NOT NULL DEFAULT 'medium',
                default_due_days INTEGER,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS task_sets (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS task_set_templates (
                task_set_id TEXT NOT NULL REFERENCES task_sets(id) ON DELETE CASCADE,
                template_id TEXT NOT NULL REFERENCES task_templates(id),
                position INTEGER NOT NULL,
                PRIMARY KEY (task_set_id, template_id)
            );

            CREATE TABLE IF NOT EXISTS stage_task_sets (
                stage_id TEXT NOT NULL REFERENCES stages(id) ON DELETE CASCADE,
                task_set_id TEXT NOT NULL REFERENCES task_sets(id),
                PRIMARY KEY (stage_id, task_set_id)
            );

            -- tasks.stage_id is deliberately NOT a foreign key: deleting a
            -- stage must leave historical tasks intact, carrying an id that
            -- reads resolve as "orphaned".
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
                stage_id TEXT,
                task_set_id TEXT,
                template_id TEXT,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL,
                priority TEXT NOT NULL DEFAULT 'medium',
                status TEXT NOT NULL DEFAULT 'pending',
                is_completed INTEGER NOT NULL DEFAULT 0,
                due_date TEXT,
                completed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_agent ON tasks(agent_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_stage ON tasks(stage_id);

            CREATE TABLE IF NOT EXISTS onboarding_records (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
                pipeline_id TEXT NOT NULL REFERENCES pipelines(id),
                current_stage_id TEXT,
                stage_entered_at TEXT,
                stage_completed_at TEXT,
                status TEXT NOT NULL DEFAULT 'onboarding_started',
                version INTEGER NOT NULL DEFAULT 1,
                approved_by TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (agent_id, pipeline_id)
            );
            CREATE INDEX IF NOT EXISTS idx_onboarding_agent ON onboarding_records(agent_id);
            CREATE INDEX IF NOT EXISTS idx_onboarding_status ON onboarding_records(status);
        "#,
    },
    Migration {
        version: 2,
        name: "seed_permission_catalog",
        sql: r#"
            INSERT OR IGNORE INTO permissions (id, name, category) VALUES
                ('6f1a2b3c-0001-4000-8000-000000000001', 'agents.view', 'agents'),
                ('6f1a2b3c-0001-4000-8000-000000000002', 'agents.manage', 'agents'),
                ('6f1a2b3c-0001-4000-8000-000000000003', 'pipelines.view', 'pipelines'),
                ('6f1a2b3c-0001-4000-8000-000000000004', 'pipelines.manage', 'pipelines'),
                ('6f1a2b3c-0001-4000-8000-000000000005', 'tasks.view', 'tasks'),
                ('6f1a2b3c-0001-4000-8000-000000000006', 'tasks.manage', 'tasks'),
                ('6f1a2b3c-0001-4000-8000-000000000007', 'onboarding.view', 'onboarding'),
                ('6f1a2b3c-0001-4000-8000-000000000008', 'onboarding.manage', 'onboarding'),
                ('6f1a2b3c-0001-4000-8000-000000000009', 'roles.manage', 'admin'),
                ('6f1a2b3c-0001-4000-8000-00000000000a', 'users.manage', 'admin'),
                ('6f1a2b3c-0001-4000-8000-00000000000b', 'reports.view', 'reports');
        "#,
    },
];

/// Run all pending migrations.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations: {e}")))?;

    let current = get_current_version(conn).await?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        conn.execute_batch(migration.sql).await.map_err(|e| {
            DatabaseError::Migration(format!(
                "Migration V{} ({}) failed: {e}",
                migration.version, migration.name
            ))
        })?;
        conn.execute(
            "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
            libsql::params![migration.version, migration.name],
        )
        .await
        .map_err(|e| {
            DatabaseError::Migration(format!(
                "Failed to record migration V{}: {e}",
                migration.version
            ))
        })?;
        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applied migration"
        );
    }

    Ok(())
}

/// Get the highest applied migration version (0 if none).
pub async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read version: {e}")))?;
    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?
        .ok_or_else(|| DatabaseError::Migration("No version row".into()))?;
    row.get(0)
        .map_err(|e| DatabaseError::Migration(e.to_string()))
}
