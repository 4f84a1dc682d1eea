use std::collections::BTreeMap;

use sqlx::Row;

use crewflow_core::chain::HierarchyHolders;
use crewflow_core::domain::actor::{Actor, DivisionScope, HR_ROLE};
use crewflow_core::domain::request::EmployeeRef;

use super::{OrganizationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrganizationRepository {
    pool: DbPool,
}

impl SqlOrganizationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Groups raw scope rows into per-division grants. A row with a NULL
    /// department marks the whole division and wins over narrower rows.
    async fn division_mapping(&self, user_id: &str) -> Result<Vec<DivisionScope>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT division_id, department_id FROM org_user_scope WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: BTreeMap<String, (bool, Vec<String>)> = BTreeMap::new();
        for row in rows {
            let division_id: String =
                row.try_get("division_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let department_id: Option<String> = row
                .try_get("department_id")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?;

            let entry = grouped.entry(division_id).or_insert((false, Vec::new()));
            match department_id {
                None => entry.0 = true,
                Some(department) => entry.1.push(department),
            }
        }

        Ok(grouped
            .into_iter()
            .map(|(division_id, (whole, departments))| {
                if whole {
                    DivisionScope::whole_division(division_id)
                } else {
                    DivisionScope::departments(division_id, departments)
                }
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl OrganizationRepository for SqlOrganizationRepository {
    async fn actor(&self, user_id: &str) -> Result<Option<Actor>, RepositoryError> {
        let row = sqlx::query("SELECT user_id, role FROM org_user WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else { return Ok(None) };
        let user_id: String =
            row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let role: String =
            row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;

        let mapping = self.division_mapping(&user_id).await?;
        Ok(Some(Actor::new(user_id, role).with_mapping(mapping)))
    }

    async fn employee(&self, employee_id: &str) -> Result<Option<EmployeeRef>, RepositoryError> {
        let row = sqlx::query(
            "SELECT employee_id, division_id, department_id FROM employee WHERE employee_id = ?",
        )
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(EmployeeRef {
            employee_id: row
                .try_get("employee_id")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?,
            division_id: row
                .try_get("division_id")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?,
            department_id: row
                .try_get("department_id")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        }))
    }

    async fn hierarchy_holders(
        &self,
        employee: &EmployeeRef,
    ) -> Result<HierarchyHolders, RepositoryError> {
        let row = sqlx::query(
            "SELECT hod_user_id, manager_user_id FROM employee WHERE employee_id = ?",
        )
        .bind(&employee.employee_id)
        .fetch_optional(&self.pool)
        .await?;

        let (hod, manager) = match row {
            Some(row) => (
                row.try_get("hod_user_id")
                    .map_err(|e| RepositoryError::Decode(e.to_string()))?,
                row.try_get("manager_user_id")
                    .map_err(|e| RepositoryError::Decode(e.to_string()))?,
            ),
            None => (None, None),
        };

        // The HR slot is filled by the first HR user whose division mapping
        // covers the employee's coordinates.
        let hr_rows = sqlx::query("SELECT user_id FROM org_user WHERE role = ? ORDER BY user_id")
            .bind(HR_ROLE)
            .fetch_all(&self.pool)
            .await?;

        let mut hr_with_scope = None;
        for row in hr_rows {
            let user_id: String =
                row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let mapping = self.division_mapping(&user_id).await?;
            let covers = mapping
                .iter()
                .any(|scope| scope.covers(&employee.division_id, &employee.department_id));
            if covers {
                hr_with_scope = Some(user_id);
                break;
            }
        }

        Ok(HierarchyHolders { hod, manager, hr_with_scope })
    }
}
