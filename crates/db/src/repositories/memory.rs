use std::collections::HashMap;

use tokio::sync::RwLock;

use crewflow_core::audit::AuditEvent;
use crewflow_core::chain::{HierarchyHolders, WorkflowConfig};
use crewflow_core::domain::actor::Actor;
use crewflow_core::domain::request::{EmployeeRef, RequestId, RequestKind, WorkflowRequest};

use super::{
    AuditEventRepository, OrganizationRepository, RepositoryError, RequestRepository,
    WorkflowConfigRepository,
};

#[derive(Default)]
pub struct InMemoryRequestRepository {
    requests: RwLock<HashMap<String, WorkflowRequest>>,
}

#[async_trait::async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<WorkflowRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn insert(&self, request: &WorkflowRequest) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id.0.clone(), request.clone());
        Ok(())
    }

    async fn update_versioned(&self, request: &WorkflowRequest) -> Result<i64, RepositoryError> {
        let mut requests = self.requests.write().await;
        match requests.get_mut(&request.id.0) {
            Some(stored) if stored.version == request.version => {
                let mut next = request.clone();
                next.version += 1;
                let version = next.version;
                *stored = next;
                Ok(version)
            }
            _ => Err(RepositoryError::VersionConflict {
                request_id: request.id.0.clone(),
                expected_version: request.version,
            }),
        }
    }

    async fn list_by_status_key(
        &self,
        status: Option<&str>,
        limit: u32,
    ) -> Result<Vec<WorkflowRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut matched: Vec<WorkflowRequest> = requests
            .values()
            .filter(|request| status.map_or(true, |key| request.status.as_key() == key))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matched.truncate(limit as usize);
        Ok(matched)
    }
}

#[derive(Default)]
pub struct InMemoryWorkflowConfigRepository {
    configs: RwLock<HashMap<&'static str, WorkflowConfig>>,
}

#[async_trait::async_trait]
impl WorkflowConfigRepository for InMemoryWorkflowConfigRepository {
    async fn get(&self, kind: RequestKind) -> Result<Option<WorkflowConfig>, RepositoryError> {
        let configs = self.configs.read().await;
        Ok(configs.get(kind.as_key()).cloned())
    }

    async fn save(&self, config: &WorkflowConfig) -> Result<(), RepositoryError> {
        let mut configs = self.configs.write().await;
        configs.insert(config.kind.as_key(), config.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryOrganizationRepository {
    actors: RwLock<HashMap<String, Actor>>,
    employees: RwLock<HashMap<String, EmployeeRef>>,
    holders: RwLock<HashMap<String, HierarchyHolders>>,
}

impl InMemoryOrganizationRepository {
    pub async fn add_actor(&self, actor: Actor) {
        let mut actors = self.actors.write().await;
        actors.insert(actor.user_id.clone(), actor);
    }

    pub async fn add_employee(&self, employee: EmployeeRef, holders: HierarchyHolders) {
        let mut employees = self.employees.write().await;
        employees.insert(employee.employee_id.clone(), employee.clone());
        let mut map = self.holders.write().await;
        map.insert(employee.employee_id, holders);
    }
}

#[async_trait::async_trait]
impl OrganizationRepository for InMemoryOrganizationRepository {
    async fn actor(&self, user_id: &str) -> Result<Option<Actor>, RepositoryError> {
        let actors = self.actors.read().await;
        Ok(actors.get(user_id).cloned())
    }

    async fn employee(&self, employee_id: &str) -> Result<Option<EmployeeRef>, RepositoryError> {
        let employees = self.employees.read().await;
        Ok(employees.get(employee_id).cloned())
    }

    async fn hierarchy_holders(
        &self,
        employee: &EmployeeRef,
    ) -> Result<HierarchyHolders, RepositoryError> {
        let holders = self.holders.read().await;
        Ok(holders.get(&employee.employee_id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryAuditEventRepository {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditEventRepository {
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait::async_trait]
impl AuditEventRepository for InMemoryAuditEventRepository {
    async fn append(&self, event: &AuditEvent) -> Result<(), RepositoryError> {
        let mut events = self.events.write().await;
        events.push(event.clone());
        Ok(())
    }

    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|event| event.request_id.as_ref() == Some(request_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crewflow_core::domain::request::{
        EmployeeRef, RequestId, RequestKind, RequestStatus, WorkflowRequest,
    };
    use crewflow_core::domain::workflow::{
        ApprovalChainStep, FinalAuthority, RequestWorkflowState, StepStatus,
    };

    use crate::repositories::{
        InMemoryRequestRepository, RepositoryError, RequestRepository,
    };

    fn sample_request(id: &str) -> WorkflowRequest {
        let now = Utc::now();
        let chain = vec![ApprovalChainStep {
            step_order: 1,
            role: "manager".to_string(),
            label: "Manager approval".to_string(),
            status: StepStatus::Pending,
        }];
        WorkflowRequest {
            id: RequestId(id.to_string()),
            kind: RequestKind::Leave,
            employee: EmployeeRef {
                employee_id: "emp-001".to_string(),
                division_id: "div-tech".to_string(),
                department_id: "dept-eng".to_string(),
            },
            requested_by: "emp-001".to_string(),
            status: RequestStatus::Pending,
            workflow: RequestWorkflowState::new(chain, FinalAuthority::for_role("manager")),
            loan_config: None,
            advance_config: None,
            change_history: Vec::new(),
            detail: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn in_memory_request_repo_round_trip() {
        let repo = InMemoryRequestRepository::default();
        let request = sample_request("REQ-1");

        repo.insert(&request).await.expect("insert");
        let found = repo.find_by_id(&request.id).await.expect("find");

        assert_eq!(found, Some(request));
    }

    #[tokio::test]
    async fn in_memory_versioning_matches_sql_semantics() {
        let repo = InMemoryRequestRepository::default();
        let request = sample_request("REQ-1");
        repo.insert(&request).await.expect("insert");

        let new_version = repo.update_versioned(&request).await.expect("update");
        assert_eq!(new_version, 2);

        let error = repo.update_versioned(&request).await.expect_err("stale");
        assert!(matches!(error, RepositoryError::VersionConflict { expected_version: 1, .. }));
    }
}
