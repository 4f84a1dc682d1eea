pub mod audit;
pub mod chain;
pub mod config;
pub mod domain;
pub mod errors;
pub mod machine;
pub mod recalc;
pub mod scope;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use chain::{
    ConfigStep, HierarchyHolders, InMemoryOrganizationDirectory, OrganizationDirectory,
    ResolvedWorkflow, WorkflowConfig, WorkflowConfigResolver,
};
pub use config::{
    AppConfig, ConfigError, ConfigOverrides, DatabaseConfig, LoadOptions, LogFormat,
    LoggingConfig, PolicyConfig,
};
pub use domain::actor::{Actor, DivisionScope};
pub use domain::request::{
    AdvanceTerms, EmployeeRef, LoanTerms, RequestId, RequestKind, RequestStatus, WorkflowRequest,
};
pub use domain::workflow::{
    ApprovalChainStep, ChangeHistoryEntry, FinalAuthority, RequestWorkflowState, StepStatus,
    WorkflowStage,
};
pub use errors::{ApplicationError, InterfaceError, WorkflowError};
pub use machine::{ActionInput, WorkflowAction, WorkflowStateMachine};
pub use recalc::{FieldMutationRecalculator, FieldOverrides, OverridePolicy};
pub use scope::ScopeAuthorizer;
