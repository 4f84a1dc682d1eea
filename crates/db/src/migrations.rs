use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Outcome of one migration pass: which versions this call applied, and the
/// schema version the database ended up at.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MigrationRun {
    pub newly_applied: Vec<i64>,
    pub current_version: Option<i64>,
}

pub async fn run_pending(pool: &DbPool) -> Result<MigrationRun, MigrateError> {
    let before = applied_versions(pool).await;
    MIGRATOR.run(pool).await?;
    let after = applied_versions(pool).await;

    let newly_applied =
        after.iter().copied().filter(|version| !before.contains(version)).collect();
    Ok(MigrationRun { newly_applied, current_version: after.last().copied() })
}

/// The ledger table does not exist before the first pass; treat that as an
/// empty history.
async fn applied_versions(pool: &DbPool) -> Vec<i64> {
    sqlx::query_scalar("SELECT version FROM _sqlx_migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use crewflow_core::config::DatabaseConfig;

    use super::run_pending;
    use crate::{connect, migrations::MIGRATOR};

    async fn memory_pool() -> sqlx::SqlitePool {
        let database = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            timeout_secs: 30,
        };
        connect(&database).await.expect("connect")
    }

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "workflow_config",
        "org_user",
        "org_user_scope",
        "employee",
        "workflow_request",
        "audit_event",
        "idx_org_user_scope_user_id",
        "idx_workflow_request_status",
        "idx_workflow_request_kind",
        "idx_workflow_request_employee_id",
        "idx_audit_event_request_id",
        "idx_audit_event_event_type",
    ];

    #[tokio::test]
    async fn run_pending_reports_newly_applied_versions() {
        let pool = memory_pool().await;

        let first = run_pending(&pool).await.expect("first pass");
        assert_eq!(first.newly_applied, vec![1]);
        assert_eq!(first.current_version, Some(1));

        let second = run_pending(&pool).await.expect("second pass");
        assert!(second.newly_applied.is_empty());
        assert_eq!(second.current_version, Some(1));
    }

    #[tokio::test]
    async fn migrations_create_baseline_tables() {
        let pool = memory_pool().await;
        run_pending(&pool).await.expect("run migrations");

        for table in ["workflow_config", "org_user", "employee", "workflow_request", "audit_event"]
        {
            let count = sqlx::query(
                "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .expect("check table")
            .get::<i64, _>("count");
            assert_eq!(count, 1, "missing table {table}");
        }
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = memory_pool().await;
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let count = sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master
             WHERE type = 'table' AND name = 'workflow_request'",
        )
        .fetch_one(&pool)
        .await
        .expect("check workflow_request removed")
        .get::<i64, _>("count");

        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = memory_pool().await;
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            MANAGED_SCHEMA_OBJECTS.len(),
            "initial migration pass should create all managed schema objects",
        );

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let after_down_signature = managed_schema_signature(&pool).await;
        assert!(
            after_down_signature.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");

        let after_second_up_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            after_second_up_signature, initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if MANAGED_SCHEMA_OBJECTS.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
