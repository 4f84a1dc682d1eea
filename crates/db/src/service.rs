use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crewflow_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use crewflow_core::chain::{InMemoryOrganizationDirectory, WorkflowConfig, WorkflowConfigResolver};
use crewflow_core::domain::request::{
    AdvanceTerms, LoanTerms, RequestId, RequestKind, RequestStatus, WorkflowRequest,
};
use crewflow_core::errors::{ApplicationError, WorkflowError};
use crewflow_core::machine::{ActionInput, WorkflowStateMachine};
use crewflow_core::recalc::{emi_amount, OverridePolicy};

use crate::repositories::{
    AuditEventRepository, OrganizationRepository, RepositoryError, RequestRepository,
    WorkflowConfigRepository,
};

#[derive(Clone, Debug)]
pub struct LoanApplication {
    pub principal: Decimal,
    pub duration_months: u32,
    pub interest_rate_pct: Decimal,
}

#[derive(Clone, Debug)]
pub struct NewRequest {
    pub kind: RequestKind,
    pub employee_id: String,
    pub requested_by: String,
    pub detail: Option<String>,
    pub loan: Option<LoanApplication>,
    pub advance_amount: Option<Decimal>,
}

/// Orchestrates the pure state machine against the repositories.
///
/// Reads are plain; writes go through the versioned update so concurrent
/// approvers cannot both land on the same state.
pub struct WorkflowService {
    requests: Arc<dyn RequestRepository>,
    configs: Arc<dyn WorkflowConfigRepository>,
    organization: Arc<dyn OrganizationRepository>,
    audit_log: Arc<dyn AuditEventRepository>,
    machine: WorkflowStateMachine,
}

impl WorkflowService {
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        configs: Arc<dyn WorkflowConfigRepository>,
        organization: Arc<dyn OrganizationRepository>,
        audit_log: Arc<dyn AuditEventRepository>,
        policy: OverridePolicy,
    ) -> Self {
        Self {
            requests,
            configs,
            organization,
            audit_log,
            machine: WorkflowStateMachine::new(policy),
        }
    }

    /// Creates a request with its approval chain frozen from the workflow
    /// configuration as it stands right now. Later config edits never touch
    /// this request.
    pub async fn create_request(
        &self,
        new: NewRequest,
        correlation_id: &str,
    ) -> Result<WorkflowRequest, ApplicationError> {
        let (loan_config, advance_config) = resolve_economics(&new)?;

        let config = self
            .configs
            .get(new.kind)
            .await
            .map_err(map_repo_error)?
            .ok_or_else(|| {
                WorkflowError::Configuration {
                    kind: new.kind.as_key().to_string(),
                    message: "no workflow configuration for this request kind".to_string(),
                }
            })?;

        let employee = self
            .organization
            .employee(&new.employee_id)
            .await
            .map_err(map_repo_error)?
            .ok_or_else(|| WorkflowError::Validation {
                field: "employee_id".to_string(),
                message: format!("no such employee `{}`", new.employee_id),
            })?;

        let holders =
            self.organization.hierarchy_holders(&employee).await.map_err(map_repo_error)?;
        let directory = InMemoryOrganizationDirectory::with_holders(holders);
        let resolved = WorkflowConfigResolver::resolve_chain(&config, &employee, &directory)?;

        let now = Utc::now();
        let request = WorkflowRequest {
            id: RequestId(format!("REQ-{}", Uuid::new_v4())),
            kind: new.kind,
            employee,
            requested_by: new.requested_by,
            status: RequestStatus::Pending,
            workflow: resolved.into_state(),
            loan_config,
            advance_config,
            change_history: Vec::new(),
            detail: new.detail,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        self.requests.insert(&request).await.map_err(map_repo_error)?;

        self.audit_log
            .append(
                &AuditEvent::new(
                    Some(request.id.clone()),
                    correlation_id,
                    "workflow.request_created",
                    AuditCategory::Workflow,
                    request.requested_by.clone(),
                    AuditOutcome::Success,
                )
                .with_metadata("kind", request.kind.as_key())
                .with_metadata("stage", request.workflow.stage.as_key()),
            )
            .await
            .map_err(map_repo_error)?;

        info!(
            event_name = "workflow.request_created",
            request_id = %request.id.0,
            kind = request.kind.as_key(),
            stage = %request.workflow.stage.as_key(),
            correlation_id,
        );

        Ok(request)
    }

    /// Applies one approver action and persists the resulting state under
    /// optimistic concurrency. A lost race surfaces as a retryable conflict.
    pub async fn process_action(
        &self,
        request_id: &RequestId,
        actor_user_id: &str,
        input: &ActionInput,
        correlation_id: &str,
    ) -> Result<WorkflowRequest, ApplicationError> {
        let actor = self
            .organization
            .actor(actor_user_id)
            .await
            .map_err(map_repo_error)?
            .ok_or_else(|| WorkflowError::Validation {
                field: "actor".to_string(),
                message: format!("unknown user `{actor_user_id}`"),
            })?;

        let request = self
            .requests
            .find_by_id(request_id)
            .await
            .map_err(map_repo_error)?
            .ok_or_else(|| WorkflowError::Validation {
                field: "request_id".to_string(),
                message: format!("no such request `{}`", request_id.0),
            })?;

        let mut updated = match self.machine.process_action(&request, &actor, input, Utc::now()) {
            Ok(updated) => updated,
            Err(error) => {
                self.audit_log
                    .append(
                        &AuditEvent::new(
                            Some(request.id.clone()),
                            correlation_id,
                            "workflow.action_rejected",
                            AuditCategory::Workflow,
                            actor.user_id.clone(),
                            AuditOutcome::Rejected,
                        )
                        .with_metadata("action", input.action.as_key())
                        .with_metadata("error", error.to_string()),
                    )
                    .await
                    .map_err(map_repo_error)?;

                warn!(
                    event_name = "workflow.action_rejected",
                    request_id = %request.id.0,
                    actor = %actor.user_id,
                    action = input.action.as_key(),
                    error = %error,
                    correlation_id,
                );
                return Err(ApplicationError::Domain(error));
            }
        };

        updated.version = self.requests.update_versioned(&updated).await.map_err(map_repo_error)?;

        self.audit_log
            .append(
                &AuditEvent::new(
                    Some(updated.id.clone()),
                    correlation_id,
                    "workflow.action_applied",
                    AuditCategory::Workflow,
                    actor.user_id.clone(),
                    AuditOutcome::Success,
                )
                .with_metadata("action", input.action.as_key())
                .with_metadata("from", request.workflow.stage.as_key())
                .with_metadata("to", updated.workflow.stage.as_key()),
            )
            .await
            .map_err(map_repo_error)?;

        info!(
            event_name = "workflow.action_applied",
            request_id = %updated.id.0,
            actor = %actor.user_id,
            action = input.action.as_key(),
            from = %request.workflow.stage.as_key(),
            to = %updated.workflow.stage.as_key(),
            version = updated.version,
            correlation_id,
        );

        Ok(updated)
    }

    pub async fn get_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<WorkflowRequest>, ApplicationError> {
        self.requests.find_by_id(request_id).await.map_err(map_repo_error)
    }

    pub async fn list_requests(
        &self,
        status: Option<&str>,
        limit: u32,
    ) -> Result<Vec<WorkflowRequest>, ApplicationError> {
        self.requests.list_by_status_key(status, limit).await.map_err(map_repo_error)
    }

    pub async fn audit_trail(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<AuditEvent>, ApplicationError> {
        self.audit_log.list_for_request(request_id).await.map_err(map_repo_error)
    }

    pub async fn get_config(
        &self,
        kind: RequestKind,
    ) -> Result<Option<WorkflowConfig>, ApplicationError> {
        self.configs.get(kind).await.map_err(map_repo_error)
    }

    pub async fn upsert_config(&self, config: &WorkflowConfig) -> Result<(), ApplicationError> {
        self.configs.save(config).await.map_err(map_repo_error)?;
        info!(
            event_name = "workflow.config_saved",
            kind = config.kind.as_key(),
            is_enabled = config.is_enabled,
            use_dynamic_workflow = config.use_dynamic_workflow,
        );
        Ok(())
    }
}

/// Validates kind-specific economics and derives the loan schedule.
fn resolve_economics(
    new: &NewRequest,
) -> Result<(Option<LoanTerms>, Option<AdvanceTerms>), WorkflowError> {
    match new.kind {
        RequestKind::Loan => {
            let loan = new.loan.as_ref().ok_or_else(|| WorkflowError::Validation {
                field: "loan".to_string(),
                message: "loan requests require principal, duration and interest rate".to_string(),
            })?;
            if loan.principal <= Decimal::ZERO {
                return Err(WorkflowError::Validation {
                    field: "loan.principal".to_string(),
                    message: "principal must be positive".to_string(),
                });
            }
            if loan.duration_months == 0 {
                return Err(WorkflowError::Validation {
                    field: "loan.duration_months".to_string(),
                    message: "duration must be at least one month".to_string(),
                });
            }
            if loan.interest_rate_pct.is_sign_negative() {
                return Err(WorkflowError::Validation {
                    field: "loan.interest_rate_pct".to_string(),
                    message: "interest rate cannot be negative".to_string(),
                });
            }
            let emi = emi_amount(loan.principal, loan.duration_months, loan.interest_rate_pct);
            Ok((
                Some(LoanTerms {
                    principal: loan.principal,
                    duration_months: loan.duration_months,
                    interest_rate_pct: loan.interest_rate_pct,
                    emi_amount: emi,
                    total_amount: (emi * Decimal::from(loan.duration_months)).round_dp(2),
                }),
                None,
            ))
        }
        RequestKind::SalaryAdvance => {
            let amount = new.advance_amount.ok_or_else(|| WorkflowError::Validation {
                field: "advance_amount".to_string(),
                message: "salary advance requests require an amount".to_string(),
            })?;
            if amount <= Decimal::ZERO {
                return Err(WorkflowError::Validation {
                    field: "advance_amount".to_string(),
                    message: "amount must be positive".to_string(),
                });
            }
            Ok((None, Some(AdvanceTerms { total_amount: amount })))
        }
        _ => {
            if new.loan.is_some() || new.advance_amount.is_some() {
                return Err(WorkflowError::Validation {
                    field: "kind".to_string(),
                    message: format!(
                        "request kind `{}` carries no economic terms",
                        new.kind.as_key()
                    ),
                });
            }
            Ok((None, None))
        }
    }
}

fn map_repo_error(error: RepositoryError) -> ApplicationError {
    match error {
        RepositoryError::VersionConflict { request_id, expected_version } => {
            ApplicationError::Domain(WorkflowError::Conflict { request_id, expected_version })
        }
        other => ApplicationError::Persistence(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use crewflow_core::chain::{ConfigStep, HierarchyHolders, WorkflowConfig};
    use crewflow_core::domain::actor::{Actor, DivisionScope};
    use crewflow_core::domain::request::{EmployeeRef, RequestKind, RequestStatus};
    use crewflow_core::domain::workflow::{FinalAuthority, WorkflowStage};
    use crewflow_core::errors::{ApplicationError, WorkflowError};
    use crewflow_core::machine::{ActionInput, WorkflowAction};
    use crewflow_core::recalc::{FieldOverrides, OverridePolicy};

    use super::{map_repo_error, LoanApplication, NewRequest, WorkflowService};
    use crate::repositories::{
        InMemoryAuditEventRepository, InMemoryOrganizationRepository, InMemoryRequestRepository,
        InMemoryWorkflowConfigRepository, RepositoryError, WorkflowConfigRepository,
    };

    struct Harness {
        service: WorkflowService,
        configs: Arc<InMemoryWorkflowConfigRepository>,
        audit_log: Arc<InMemoryAuditEventRepository>,
    }

    async fn harness() -> Harness {
        let requests = Arc::new(InMemoryRequestRepository::default());
        let configs = Arc::new(InMemoryWorkflowConfigRepository::default());
        let organization = Arc::new(InMemoryOrganizationRepository::default());
        let audit_log = Arc::new(InMemoryAuditEventRepository::default());

        organization
            .add_employee(
                EmployeeRef {
                    employee_id: "emp-001".to_string(),
                    division_id: "div-tech".to_string(),
                    department_id: "dept-eng".to_string(),
                },
                HierarchyHolders {
                    hod: Some("u-hod".to_string()),
                    manager: Some("u-mgr".to_string()),
                    hr_with_scope: Some("u-hr".to_string()),
                },
            )
            .await;
        organization
            .add_actor(
                Actor::new("u-mgr", "manager")
                    .with_mapping(vec![DivisionScope::whole_division("div-tech")]),
            )
            .await;
        organization
            .add_actor(
                Actor::new("u-hod", "hod")
                    .with_mapping(vec![DivisionScope::whole_division("div-tech")]),
            )
            .await;
        organization.add_actor(Actor::new("u-root", "super_admin")).await;

        let service = WorkflowService::new(
            requests,
            configs.clone(),
            organization,
            audit_log.clone(),
            OverridePolicy::default(),
        );
        Harness { service, configs, audit_log }
    }

    fn single_manager_config(kind: RequestKind) -> WorkflowConfig {
        WorkflowConfig {
            kind,
            is_enabled: true,
            use_dynamic_workflow: false,
            steps: vec![ConfigStep {
                step_order: 1,
                step_name: "Manager approval".to_string(),
                approver_role: "manager".to_string(),
            }],
            final_authority: FinalAuthority::for_role("manager"),
        }
    }

    fn leave_request() -> NewRequest {
        NewRequest {
            kind: RequestKind::Leave,
            employee_id: "emp-001".to_string(),
            requested_by: "emp-001".to_string(),
            detail: Some("2 days casual leave".to_string()),
            loan: None,
            advance_amount: None,
        }
    }

    #[tokio::test]
    async fn single_step_request_completes_on_manager_approval() {
        let h = harness().await;
        h.configs.save(&single_manager_config(RequestKind::Leave)).await.expect("config");

        let created = h.service.create_request(leave_request(), "c-1").await.expect("create");
        assert_eq!(created.status, RequestStatus::Pending);
        assert_eq!(created.version, 1);

        let updated = h
            .service
            .process_action(
                &created.id,
                "u-mgr",
                &ActionInput::new(WorkflowAction::Approve),
                "c-2",
            )
            .await
            .expect("approve");

        assert_eq!(updated.status, RequestStatus::Approved);
        assert_eq!(updated.workflow.stage, WorkflowStage::Completed);
        assert_eq!(updated.version, 2);

        let trail = h.audit_log.events().await;
        let types: Vec<&str> = trail.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["workflow.request_created", "workflow.action_applied"]);
    }

    #[tokio::test]
    async fn chain_is_frozen_against_config_edits() {
        let h = harness().await;
        h.configs.save(&single_manager_config(RequestKind::Leave)).await.expect("config");

        let created = h.service.create_request(leave_request(), "c-1").await.expect("create");

        // Rewriting the config after creation must not reroute the request.
        let mut rewritten = single_manager_config(RequestKind::Leave);
        rewritten.steps = vec![
            ConfigStep {
                step_order: 1,
                step_name: "HOD approval".to_string(),
                approver_role: "hod".to_string(),
            },
            ConfigStep {
                step_order: 2,
                step_name: "Manager approval".to_string(),
                approver_role: "manager".to_string(),
            },
        ];
        h.service.upsert_config(&rewritten).await.expect("rewrite");

        let updated = h
            .service
            .process_action(
                &created.id,
                "u-mgr",
                &ActionInput::new(WorkflowAction::Approve),
                "c-2",
            )
            .await
            .expect("approve");

        assert_eq!(updated.workflow.stage, WorkflowStage::Completed);
        assert_eq!(updated.workflow.approval_chain.len(), 1);
    }

    #[tokio::test]
    async fn disabled_workflow_rejects_creation() {
        let h = harness().await;
        let mut config = single_manager_config(RequestKind::Leave);
        config.is_enabled = false;
        h.configs.save(&config).await.expect("config");

        let error = h.service.create_request(leave_request(), "c-1").await.expect_err("disabled");
        assert!(matches!(
            error,
            ApplicationError::Domain(WorkflowError::Configuration { ref message, .. })
                if message.contains("disabled")
        ));
    }

    #[tokio::test]
    async fn missing_config_rejects_creation() {
        let h = harness().await;
        let error = h.service.create_request(leave_request(), "c-1").await.expect_err("missing");
        assert!(matches!(
            error,
            ApplicationError::Domain(WorkflowError::Configuration { ref message, .. })
                if message.contains("no workflow configuration")
        ));
    }

    #[tokio::test]
    async fn unknown_actor_is_rejected_and_audited() {
        let h = harness().await;
        h.configs.save(&single_manager_config(RequestKind::Leave)).await.expect("config");
        let created = h.service.create_request(leave_request(), "c-1").await.expect("create");

        let error = h
            .service
            .process_action(
                &created.id,
                "u-ghost",
                &ActionInput::new(WorkflowAction::Approve),
                "c-2",
            )
            .await
            .expect_err("unknown user");

        assert!(matches!(
            error,
            ApplicationError::Domain(WorkflowError::Validation { ref field, .. })
                if field == "actor"
        ));
    }

    #[tokio::test]
    async fn unauthorized_action_is_audited_as_rejected() {
        let h = harness().await;
        h.configs.save(&single_manager_config(RequestKind::Leave)).await.expect("config");
        let created = h.service.create_request(leave_request(), "c-1").await.expect("create");

        let error = h
            .service
            .process_action(
                &created.id,
                "u-hod",
                &ActionInput::new(WorkflowAction::Approve),
                "c-2",
            )
            .await
            .expect_err("hod cannot act at manager step");

        assert!(matches!(
            error,
            ApplicationError::Domain(WorkflowError::UnauthorizedActor { .. })
        ));

        let trail = h.audit_log.events().await;
        assert_eq!(trail.last().map(|e| e.event_type.as_str()), Some("workflow.action_rejected"));
    }

    #[tokio::test]
    async fn super_admin_bypass_completes_from_any_position() {
        let h = harness().await;
        let mut config = single_manager_config(RequestKind::Permission);
        config.steps.push(ConfigStep {
            step_order: 2,
            step_name: "HR approval".to_string(),
            approver_role: "hr".to_string(),
        });
        h.configs.save(&config).await.expect("config");

        let mut new = leave_request();
        new.kind = RequestKind::Permission;
        let created = h.service.create_request(new, "c-1").await.expect("create");

        let updated = h
            .service
            .process_action(
                &created.id,
                "u-root",
                &ActionInput::new(WorkflowAction::Approve),
                "c-2",
            )
            .await
            .expect("bypass");

        assert_eq!(updated.status, RequestStatus::Approved);
        assert_eq!(updated.workflow.stage, WorkflowStage::Completed);
    }

    #[tokio::test]
    async fn loan_request_derives_emi_schedule_and_accepts_overrides() {
        let h = harness().await;
        h.configs.save(&single_manager_config(RequestKind::Loan)).await.expect("config");

        let new = NewRequest {
            kind: RequestKind::Loan,
            employee_id: "emp-001".to_string(),
            requested_by: "emp-001".to_string(),
            detail: None,
            loan: Some(LoanApplication {
                principal: Decimal::new(10_000, 0),
                duration_months: 10,
                interest_rate_pct: Decimal::new(10, 0),
            }),
            advance_amount: None,
        };
        let created = h.service.create_request(new, "c-1").await.expect("create");
        let before = created.loan_config.clone().expect("loan terms");
        assert!(before.emi_amount > Decimal::ZERO);

        let input = ActionInput::new(WorkflowAction::Approve)
            .with_overrides(FieldOverrides::amount(Decimal::new(8_000, 0)))
            .with_comments("budget cap");
        let updated =
            h.service.process_action(&created.id, "u-mgr", &input, "c-2").await.expect("approve");

        let after = updated.loan_config.expect("loan terms");
        assert_eq!(after.principal, Decimal::new(8_000, 0));
        assert!(after.emi_amount < before.emi_amount);
        assert!(updated.change_history.iter().any(|entry| entry.field == "amount"));
    }

    #[tokio::test]
    async fn loan_without_terms_is_rejected() {
        let h = harness().await;
        h.configs.save(&single_manager_config(RequestKind::Loan)).await.expect("config");

        let new = NewRequest {
            kind: RequestKind::Loan,
            employee_id: "emp-001".to_string(),
            requested_by: "emp-001".to_string(),
            detail: None,
            loan: None,
            advance_amount: None,
        };
        let error = h.service.create_request(new, "c-1").await.expect_err("no terms");
        assert!(matches!(
            error,
            ApplicationError::Domain(WorkflowError::Validation { ref field, .. })
                if field == "loan"
        ));
    }

    #[test]
    fn version_conflict_maps_to_domain_conflict() {
        let mapped = map_repo_error(RepositoryError::VersionConflict {
            request_id: "REQ-1".to_string(),
            expected_version: 3,
        });
        assert!(matches!(
            mapped,
            ApplicationError::Domain(WorkflowError::Conflict { expected_version: 3, .. })
        ));

        let mapped = map_repo_error(RepositoryError::Decode("bad json".to_string()));
        assert!(matches!(mapped, ApplicationError::Persistence(_)));
    }
}
