use chrono::{DateTime, Utc};
use sqlx::Row;

use crewflow_core::domain::request::{
    AdvanceTerms, EmployeeRef, LoanTerms, RequestId, RequestKind, RequestStatus, WorkflowRequest,
};
use crewflow_core::domain::workflow::{ChangeHistoryEntry, RequestWorkflowState};

use super::{RepositoryError, RequestRepository};
use crate::DbPool;

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Reconstructs a status enum from its persisted wire key. Role-level
/// approvals round-trip through the `{role}_approved` form.
fn parse_status(key: &str) -> RequestStatus {
    match key {
        "pending" => RequestStatus::Pending,
        "approved" => RequestStatus::Approved,
        "rejected" => RequestStatus::Rejected,
        other => match other.strip_suffix("_approved") {
            Some(role) => RequestStatus::RoleApproved { role: role.to_string() },
            None => RequestStatus::Pending,
        },
    }
}

fn decode<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(raw).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowRequest, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let kind_key: String =
        row.try_get("kind").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let employee_id: String =
        row.try_get("employee_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let division_id: String =
        row.try_get("division_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let department_id: String =
        row.try_get("department_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let requested_by: String =
        row.try_get("requested_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_key: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let workflow_json: String =
        row.try_get("workflow_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let loan_json: Option<String> =
        row.try_get("loan_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let advance_json: Option<String> =
        row.try_get("advance_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let change_history_json: String =
        row.try_get("change_history_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let detail: Option<String> =
        row.try_get("detail").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let version: i64 =
        row.try_get("version").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let kind = RequestKind::parse(&kind_key)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown request kind `{kind_key}`")))?;
    let workflow: RequestWorkflowState = decode(&workflow_json)?;
    let loan_config: Option<LoanTerms> =
        loan_json.as_deref().map(decode).transpose()?;
    let advance_config: Option<AdvanceTerms> =
        advance_json.as_deref().map(decode).transpose()?;
    let change_history: Vec<ChangeHistoryEntry> = decode(&change_history_json)?;

    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(WorkflowRequest {
        id: RequestId(id),
        kind,
        employee: EmployeeRef { employee_id, division_id, department_id },
        requested_by,
        status: parse_status(&status_key),
        workflow,
        loan_config,
        advance_config,
        change_history,
        detail,
        version,
        created_at,
        updated_at,
    })
}

const SELECT_COLUMNS: &str = "id, kind, employee_id, division_id, department_id, requested_by,
       status, stage, workflow_json, loan_json, advance_json, change_history_json,
       detail, version, created_at, updated_at";

#[async_trait::async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<WorkflowRequest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM workflow_request WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_request(r)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, request: &WorkflowRequest) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO workflow_request (id, kind, employee_id, division_id, department_id,
                                           requested_by, status, stage, workflow_json, loan_json,
                                           advance_json, change_history_json, detail, version,
                                           created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(request.kind.as_key())
        .bind(&request.employee.employee_id)
        .bind(&request.employee.division_id)
        .bind(&request.employee.department_id)
        .bind(&request.requested_by)
        .bind(request.status.as_key())
        .bind(request.workflow.stage.as_key())
        .bind(encode(&request.workflow)?)
        .bind(request.loan_config.as_ref().map(encode).transpose()?)
        .bind(request.advance_config.as_ref().map(encode).transpose()?)
        .bind(encode(&request.change_history)?)
        .bind(&request.detail)
        .bind(request.version)
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_versioned(&self, request: &WorkflowRequest) -> Result<i64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE workflow_request
             SET status = ?, stage = ?, workflow_json = ?, loan_json = ?, advance_json = ?,
                 change_history_json = ?, detail = ?, version = version + 1, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(request.status.as_key())
        .bind(request.workflow.stage.as_key())
        .bind(encode(&request.workflow)?)
        .bind(request.loan_config.as_ref().map(encode).transpose()?)
        .bind(request.advance_config.as_ref().map(encode).transpose()?)
        .bind(encode(&request.change_history)?)
        .bind(&request.detail)
        .bind(request.updated_at.to_rfc3339())
        .bind(&request.id.0)
        .bind(request.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::VersionConflict {
                request_id: request.id.0.clone(),
                expected_version: request.version,
            });
        }

        Ok(request.version + 1)
    }

    async fn list_by_status_key(
        &self,
        status: Option<&str>,
        limit: u32,
    ) -> Result<Vec<WorkflowRequest>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = if let Some(status) = status {
            sqlx::query(&format!(
                "SELECT {SELECT_COLUMNS} FROM workflow_request
                 WHERE status = ? ORDER BY created_at ASC LIMIT ?"
            ))
            .bind(status)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(&format!(
                "SELECT {SELECT_COLUMNS} FROM workflow_request
                 ORDER BY created_at ASC LIMIT ?"
            ))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };

        rows.iter().map(row_to_request).collect::<Result<Vec<_>, _>>()
    }
}
