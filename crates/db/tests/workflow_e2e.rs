//! Full-stack walkthroughs over SQLite: migrations, baseline seed data, and
//! the workflow service driving the seeded approval chains end to end.

use std::sync::Arc;

use rust_decimal::Decimal;

use crewflow_core::config::DatabaseConfig;
use crewflow_core::domain::request::{RequestKind, RequestStatus};
use crewflow_core::domain::workflow::{StepStatus, WorkflowStage};
use crewflow_core::machine::{ActionInput, WorkflowAction};
use crewflow_core::recalc::{FieldOverrides, OverridePolicy};
use crewflow_db::repositories::{
    SqlAuditEventRepository, SqlOrganizationRepository, SqlRequestRepository,
    SqlWorkflowConfigRepository,
};
use crewflow_db::{
    connect, migrations, BaselineSeedDataset, LoanApplication, NewRequest, WorkflowService,
};

async fn seeded_service() -> WorkflowService {
    let database = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        timeout_secs: 30,
    };
    let pool = connect(&database).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    BaselineSeedDataset::load(&pool).await.expect("seed");

    WorkflowService::new(
        Arc::new(SqlRequestRepository::new(pool.clone())),
        Arc::new(SqlWorkflowConfigRepository::new(pool.clone())),
        Arc::new(SqlOrganizationRepository::new(pool.clone())),
        Arc::new(SqlAuditEventRepository::new(pool)),
        OverridePolicy::default(),
    )
}

fn new_request(kind: RequestKind) -> NewRequest {
    NewRequest {
        kind,
        employee_id: "emp-001".to_string(),
        requested_by: "emp-001".to_string(),
        detail: None,
        loan: None,
        advance_amount: None,
    }
}

#[tokio::test]
async fn leave_chain_walks_hod_then_manager_to_completion() {
    let service = seeded_service().await;

    let created = service.create_request(new_request(RequestKind::Leave), "c-1").await.expect("create");
    assert_eq!(created.workflow.stage, WorkflowStage::InProgress { role: "hod".to_string() });

    let after_hod = service
        .process_action(&created.id, "u-hod", &ActionInput::new(WorkflowAction::Approve), "c-2")
        .await
        .expect("hod approves");
    assert_eq!(after_hod.workflow.stage, WorkflowStage::InProgress { role: "manager".to_string() });
    assert_eq!(after_hod.status, RequestStatus::RoleApproved { role: "hod".to_string() });

    let after_manager = service
        .process_action(&after_hod.id, "u-mgr", &ActionInput::new(WorkflowAction::Approve), "c-3")
        .await
        .expect("manager approves");

    assert_eq!(after_manager.status, RequestStatus::Approved);
    assert_eq!(after_manager.workflow.stage, WorkflowStage::Completed);
    assert!(after_manager.workflow.is_completed);
    assert_eq!(after_manager.version, 3);

    let trail = service.audit_trail(&after_manager.id).await.expect("trail");
    let types: Vec<&str> = trail.iter().map(|event| event.event_type.as_str()).collect();
    assert_eq!(
        types,
        vec![
            "workflow.request_created",
            "workflow.action_applied",
            "workflow.action_applied",
        ]
    );
}

#[tokio::test]
async fn loan_with_override_completes_under_any_hr_final_authority() {
    let service = seeded_service().await;

    let mut new = new_request(RequestKind::Loan);
    new.loan = Some(LoanApplication {
        principal: Decimal::new(10_000, 0),
        duration_months: 10,
        interest_rate_pct: Decimal::new(10, 0),
    });
    let created = service.create_request(new, "c-1").await.expect("create");
    let before_emi = created.loan_config.as_ref().expect("loan").emi_amount;

    service
        .process_action(&created.id, "u-hod", &ActionInput::new(WorkflowAction::Approve), "c-2")
        .await
        .expect("hod approves");

    // The seeded HR approver reduces the amount while approving; the any-HR
    // final-authority rule lets the same approval complete the request.
    let input = ActionInput::new(WorkflowAction::Approve)
        .with_overrides(FieldOverrides::amount(Decimal::new(8_000, 0)))
        .with_comments("budget cap");
    let completed =
        service.process_action(&created.id, "u-hr", &input, "c-3").await.expect("hr approves");

    assert_eq!(completed.status, RequestStatus::Approved);
    assert_eq!(completed.workflow.stage, WorkflowStage::Completed);

    let loan = completed.loan_config.expect("loan");
    assert_eq!(loan.principal, Decimal::new(8_000, 0));
    assert!(loan.emi_amount < before_emi);
    assert!(completed.change_history.iter().any(|entry| entry.field == "amount"));
}

#[tokio::test]
async fn advance_waits_for_its_designated_final_authority() {
    let service = seeded_service().await;

    let mut new = new_request(RequestKind::SalaryAdvance);
    new.advance_amount = Some(Decimal::new(5_000, 0));
    let created = service.create_request(new, "c-1").await.expect("create");

    // The manager holds the last chain step but is not the designated final
    // authority, so the request parks awaiting that user.
    let parked = service
        .process_action(&created.id, "u-mgr", &ActionInput::new(WorkflowAction::Approve), "c-2")
        .await
        .expect("manager approves");
    assert_eq!(parked.workflow.stage, WorkflowStage::AwaitingFinalAuthority);
    assert_eq!(parked.status, RequestStatus::RoleApproved { role: "manager".to_string() });

    let completed = service
        .process_action(&created.id, "u-dir", &ActionInput::new(WorkflowAction::Approve), "c-3")
        .await
        .expect("designated user approves");
    assert_eq!(completed.status, RequestStatus::Approved);
    assert_eq!(completed.workflow.stage, WorkflowStage::Completed);
}

#[tokio::test]
async fn dynamic_od_chain_skips_missing_holders() {
    let service = seeded_service().await;

    // emp-002 has no HOD and sits outside the seeded HR user's scope, so the
    // dynamic chain collapses to a single manager step.
    let mut new = new_request(RequestKind::OnDuty);
    new.employee_id = "emp-002".to_string();
    new.requested_by = "emp-002".to_string();
    let created = service.create_request(new, "c-1").await.expect("create");

    let roles: Vec<&str> =
        created.workflow.approval_chain.iter().map(|step| step.role.as_str()).collect();
    assert_eq!(roles, vec!["manager"]);
}

#[tokio::test]
async fn super_admin_bypass_marks_pending_steps_bypassed() {
    let service = seeded_service().await;

    let created = service.create_request(new_request(RequestKind::Leave), "c-1").await.expect("create");

    let completed = service
        .process_action(&created.id, "u-root", &ActionInput::new(WorkflowAction::Approve), "c-2")
        .await
        .expect("bypass");

    assert_eq!(completed.status, RequestStatus::Approved);
    assert_eq!(completed.workflow.stage, WorkflowStage::Completed);
    assert!(completed
        .workflow
        .approval_chain
        .iter()
        .all(|step| step.status == StepStatus::Bypassed));
}

#[tokio::test]
async fn rejected_request_accepts_no_further_actions() {
    let service = seeded_service().await;

    let created = service.create_request(new_request(RequestKind::Leave), "c-1").await.expect("create");

    let rejected = service
        .process_action(&created.id, "u-hod", &ActionInput::new(WorkflowAction::Reject), "c-2")
        .await
        .expect("reject");
    assert_eq!(rejected.status, RequestStatus::Rejected);
    assert_eq!(rejected.workflow.stage, WorkflowStage::Rejected);

    let error = service
        .process_action(&created.id, "u-mgr", &ActionInput::new(WorkflowAction::Approve), "c-3")
        .await
        .expect_err("terminal");
    assert!(error.to_string().contains("terminal"));
}
