use chrono::Utc;
use sqlx::Row;

use crewflow_core::chain::{ConfigStep, WorkflowConfig};
use crewflow_core::domain::request::RequestKind;
use crewflow_core::domain::workflow::FinalAuthority;

use super::{RepositoryError, WorkflowConfigRepository};
use crate::DbPool;

pub struct SqlWorkflowConfigRepository {
    pool: DbPool,
}

impl SqlWorkflowConfigRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_config(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowConfig, RepositoryError> {
    let kind_key: String =
        row.try_get("kind").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let is_enabled: i64 =
        row.try_get("is_enabled").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let use_dynamic_workflow: i64 =
        row.try_get("use_dynamic_workflow").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let steps_json: String =
        row.try_get("steps_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let final_authority_role: String =
        row.try_get("final_authority_role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let any_hr_can_approve: i64 =
        row.try_get("any_hr_can_approve").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let final_authority_user_id: Option<String> = row
        .try_get("final_authority_user_id")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let kind = RequestKind::parse(&kind_key)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown request kind `{kind_key}`")))?;
    let steps: Vec<ConfigStep> =
        serde_json::from_str(&steps_json).map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(WorkflowConfig {
        kind,
        is_enabled: is_enabled != 0,
        use_dynamic_workflow: use_dynamic_workflow != 0,
        steps,
        final_authority: FinalAuthority {
            role: final_authority_role,
            any_hr_can_approve: any_hr_can_approve != 0,
            user_id: final_authority_user_id,
        },
    })
}

#[async_trait::async_trait]
impl WorkflowConfigRepository for SqlWorkflowConfigRepository {
    async fn get(&self, kind: RequestKind) -> Result<Option<WorkflowConfig>, RepositoryError> {
        let row = sqlx::query(
            "SELECT kind, is_enabled, use_dynamic_workflow, steps_json,
                    final_authority_role, any_hr_can_approve, final_authority_user_id
             FROM workflow_config WHERE kind = ?",
        )
        .bind(kind.as_key())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_config(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, config: &WorkflowConfig) -> Result<(), RepositoryError> {
        let steps_json = serde_json::to_string(&config.steps)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO workflow_config (kind, is_enabled, use_dynamic_workflow, steps_json,
                                          final_authority_role, any_hr_can_approve,
                                          final_authority_user_id, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(kind) DO UPDATE SET
                 is_enabled = excluded.is_enabled,
                 use_dynamic_workflow = excluded.use_dynamic_workflow,
                 steps_json = excluded.steps_json,
                 final_authority_role = excluded.final_authority_role,
                 any_hr_can_approve = excluded.any_hr_can_approve,
                 final_authority_user_id = excluded.final_authority_user_id,
                 updated_at = excluded.updated_at",
        )
        .bind(config.kind.as_key())
        .bind(config.is_enabled as i64)
        .bind(config.use_dynamic_workflow as i64)
        .bind(&steps_json)
        .bind(&config.final_authority.role)
        .bind(config.final_authority.any_hr_can_approve as i64)
        .bind(&config.final_authority.user_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crewflow_core::chain::{ConfigStep, WorkflowConfig};
    use crewflow_core::config::DatabaseConfig;
    use crewflow_core::domain::request::RequestKind;
    use crewflow_core::domain::workflow::FinalAuthority;

    use super::SqlWorkflowConfigRepository;
    use crate::repositories::WorkflowConfigRepository;
    use crate::{connect, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let database = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            timeout_secs: 30,
        };
        let pool = connect(&database).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_config() -> WorkflowConfig {
        WorkflowConfig {
            kind: RequestKind::Loan,
            is_enabled: true,
            use_dynamic_workflow: false,
            steps: vec![
                ConfigStep {
                    step_order: 1,
                    step_name: "HOD approval".to_string(),
                    approver_role: "hod".to_string(),
                },
                ConfigStep {
                    step_order: 2,
                    step_name: "HR approval".to_string(),
                    approver_role: "hr".to_string(),
                },
            ],
            final_authority: FinalAuthority::any_hr(),
        }
    }

    #[tokio::test]
    async fn save_and_get_round_trip() {
        let pool = setup().await;
        let repo = SqlWorkflowConfigRepository::new(pool);

        repo.save(&sample_config()).await.expect("save");
        let found = repo.get(RequestKind::Loan).await.expect("get").expect("some");

        assert_eq!(found, sample_config());
    }

    #[tokio::test]
    async fn missing_kind_returns_none() {
        let pool = setup().await;
        let repo = SqlWorkflowConfigRepository::new(pool);

        assert!(repo.get(RequestKind::Overtime).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn save_upserts_on_conflict() {
        let pool = setup().await;
        let repo = SqlWorkflowConfigRepository::new(pool);

        repo.save(&sample_config()).await.expect("save");

        let mut updated = sample_config();
        updated.is_enabled = false;
        updated.final_authority = FinalAuthority::specific_user("u-ceo");
        repo.save(&updated).await.expect("upsert");

        let found = repo.get(RequestKind::Loan).await.expect("get").expect("some");
        assert!(!found.is_enabled);
        assert_eq!(found.final_authority.user_id.as_deref(), Some("u-ceo"));
    }
}
