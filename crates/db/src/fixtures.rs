use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const SEED_CONFIG_KINDS: &[&str] =
    &["leave", "loan", "salary_advance", "od", "permission", "ot", "ccl"];

const SEED_USER_IDS: &[&str] = &["u-root", "u-hr", "u-hod", "u-mgr", "u-dir"];

const SEED_EMPLOYEE_IDS: &[&str] = &["emp-001", "emp-002"];

/// Deterministic fixtures for local runs and end-to-end tests: a small
/// organization plus one workflow configuration per exercised request kind.
pub struct BaselineSeedDataset;

impl BaselineSeedDataset {
    /// SQL fixture content for the baseline seed data.
    pub const SQL: &str = include_str!("../../../config/fixtures/seed_baseline.sql");

    /// Load the baseline dataset into the database.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            config_kinds: SEED_CONFIG_KINDS,
            user_ids: SEED_USER_IDS,
            employee_ids: SEED_EMPLOYEE_IDS,
        })
    }

    /// Verify that the seed data exists and matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for kind in SEED_CONFIG_KINDS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM workflow_config WHERE kind = ?1 AND is_enabled = 1)",
            )
            .bind(kind)
            .fetch_one(pool)
            .await?;
            checks.push((*kind, exists == 1));
        }

        let user_count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM org_user").fetch_one(pool).await?;
        checks.push(("org-users", user_count == SEED_USER_IDS.len() as i64));

        let employee_count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM employee").fetch_one(pool).await?;
        checks.push(("employees", employee_count == SEED_EMPLOYEE_IDS.len() as i64));

        let any_hr: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM workflow_config
             WHERE kind = 'loan' AND any_hr_can_approve = 1)",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("loan-any-hr-final-authority", any_hr == 1));

        let specific_user: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM workflow_config
             WHERE kind = 'salary_advance'
               AND final_authority_role = 'specific_user'
               AND final_authority_user_id = 'u-dir')",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("advance-specific-user-final-authority", specific_user == 1));

        let dynamic_od: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM workflow_config
             WHERE kind = 'od' AND use_dynamic_workflow = 1)",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("od-dynamic-workflow", dynamic_od == 1));

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub config_kinds: &'static [&'static str],
    pub user_ids: &'static [&'static str],
    pub employee_ids: &'static [&'static str],
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
