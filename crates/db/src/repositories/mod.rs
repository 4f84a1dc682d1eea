use async_trait::async_trait;
use thiserror::Error;

use crewflow_core::audit::AuditEvent;
use crewflow_core::chain::{HierarchyHolders, WorkflowConfig};
use crewflow_core::domain::actor::Actor;
use crewflow_core::domain::request::{EmployeeRef, RequestId, RequestKind, WorkflowRequest};

pub mod audit;
pub mod memory;
pub mod organization;
pub mod request;
pub mod workflow_config;

pub use audit::SqlAuditEventRepository;
pub use memory::{
    InMemoryAuditEventRepository, InMemoryOrganizationRepository, InMemoryRequestRepository,
    InMemoryWorkflowConfigRepository,
};
pub use organization::SqlOrganizationRepository;
pub use request::SqlRequestRepository;
pub use workflow_config::SqlWorkflowConfigRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("request `{request_id}` was updated concurrently (expected version {expected_version})")]
    VersionConflict { request_id: String, expected_version: i64 },
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<WorkflowRequest>, RepositoryError>;

    async fn insert(&self, request: &WorkflowRequest) -> Result<(), RepositoryError>;

    /// Persists a state transition guarded by the version the caller read.
    /// Returns the new version on success; a stale read surfaces as
    /// `VersionConflict` and must be retried from a fresh load.
    async fn update_versioned(&self, request: &WorkflowRequest) -> Result<i64, RepositoryError>;

    async fn list_by_status_key(
        &self,
        status: Option<&str>,
        limit: u32,
    ) -> Result<Vec<WorkflowRequest>, RepositoryError>;
}

#[async_trait]
pub trait WorkflowConfigRepository: Send + Sync {
    async fn get(&self, kind: RequestKind) -> Result<Option<WorkflowConfig>, RepositoryError>;
    async fn save(&self, config: &WorkflowConfig) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    async fn actor(&self, user_id: &str) -> Result<Option<Actor>, RepositoryError>;

    async fn employee(&self, employee_id: &str) -> Result<Option<EmployeeRef>, RepositoryError>;

    async fn hierarchy_holders(
        &self,
        employee: &EmployeeRef,
    ) -> Result<HierarchyHolders, RepositoryError>;
}

#[async_trait]
pub trait AuditEventRepository: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> Result<(), RepositoryError>;

    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<AuditEvent>, RepositoryError>;
}
