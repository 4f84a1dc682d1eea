use std::sync::Arc;

use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crewflow_core::config::{AppConfig, LoadOptions};
use crewflow_core::domain::request::{RequestId, RequestKind, WorkflowRequest};
use crewflow_core::errors::{ApplicationError, InterfaceError};
use crewflow_core::machine::{ActionInput, WorkflowAction};
use crewflow_core::recalc::FieldOverrides;
use crewflow_db::repositories::{
    SqlAuditEventRepository, SqlOrganizationRepository, SqlRequestRepository,
    SqlWorkflowConfigRepository,
};
use crewflow_db::{connect, DbPool, LoanApplication, NewRequest, WorkflowService};

use crate::commands::CommandResult;

#[derive(Debug, Args)]
pub struct SubmitArgs {
    #[arg(long, help = "Request kind key: leave, od, permission, loan, salary_advance, ot, ccl")]
    pub kind: String,
    #[arg(long, help = "Employee the request is raised for")]
    pub employee: String,
    #[arg(long = "requested-by", help = "User submitting the request")]
    pub requested_by: String,
    #[arg(long, help = "Kind-specific summary, e.g. a leave span")]
    pub detail: Option<String>,
    #[arg(long, help = "Loan principal (loan requests only)")]
    pub principal: Option<Decimal>,
    #[arg(long = "duration-months", help = "Loan duration in months")]
    pub duration_months: Option<u32>,
    #[arg(long = "interest-rate-pct", help = "Annual interest rate percentage")]
    pub interest_rate_pct: Option<Decimal>,
    #[arg(long, help = "Advance amount (salary advance requests only)")]
    pub amount: Option<Decimal>,
}

#[derive(Debug, Args)]
pub struct ActArgs {
    #[arg(help = "Request id, e.g. REQ-6f9c...")]
    pub request_id: String,
    #[arg(long, help = "Acting user id")]
    pub user: String,
    #[arg(long, help = "approve, reject, or forward")]
    pub action: String,
    #[arg(long)]
    pub comments: Option<String>,
    #[arg(long, help = "Override the economic amount while approving")]
    pub amount: Option<Decimal>,
    #[arg(long = "duration-months", help = "Override the loan duration while approving")]
    pub duration_months: Option<u32>,
    #[arg(long = "interest-rate-pct", help = "Override the interest rate while approving")]
    pub interest_rate_pct: Option<Decimal>,
}

#[derive(Debug, Serialize)]
struct RequestSummary {
    id: String,
    kind: &'static str,
    status: String,
    stage: String,
    next_approver: Option<String>,
    version: i64,
}

impl RequestSummary {
    fn from_request(request: &WorkflowRequest) -> Self {
        Self {
            id: request.id.0.clone(),
            kind: request.kind.as_key(),
            status: request.status.as_key(),
            stage: request.workflow.stage.as_key(),
            next_approver: request.workflow.next_approver.clone(),
            version: request.version,
        }
    }
}

pub fn submit(args: SubmitArgs) -> CommandResult {
    let Some(kind) = RequestKind::parse(&args.kind) else {
        return CommandResult::failure(
            "submit",
            "invalid_kind",
            format!("unknown request kind `{}`", args.kind),
            2,
        );
    };

    let loan = match (kind, args.principal, args.duration_months) {
        (RequestKind::Loan, Some(principal), Some(duration_months)) => Some(LoanApplication {
            principal,
            duration_months,
            interest_rate_pct: args.interest_rate_pct.unwrap_or(Decimal::ZERO),
        }),
        (RequestKind::Loan, _, _) => {
            return CommandResult::failure(
                "submit",
                "invalid_arguments",
                "loan requests require --principal and --duration-months",
                2,
            );
        }
        _ => None,
    };

    let new = NewRequest {
        kind,
        employee_id: args.employee,
        requested_by: args.requested_by,
        detail: args.detail,
        loan,
        advance_amount: args.amount,
    };

    run_with_service("submit", move |service, correlation_id| async move {
        let created = service.create_request(new, &correlation_id).await?;
        Ok(serde_json::json!({
            "request": RequestSummary::from_request(&created),
            "approval_chain": created.workflow.approval_chain,
        }))
    })
}

pub fn act(args: ActArgs) -> CommandResult {
    let action = match args.action.trim().to_ascii_lowercase().as_str() {
        "approve" => WorkflowAction::Approve,
        "reject" => WorkflowAction::Reject,
        "forward" => WorkflowAction::Forward,
        other => {
            return CommandResult::failure(
                "act",
                "invalid_action",
                format!("unknown action `{other}` (expected approve|reject|forward)"),
                2,
            );
        }
    };

    let mut input = ActionInput::new(action);
    if let Some(comments) = args.comments {
        input = input.with_comments(comments);
    }
    if args.amount.is_some() || args.duration_months.is_some() || args.interest_rate_pct.is_some()
    {
        input = input.with_overrides(FieldOverrides {
            amount: args.amount,
            duration_months: args.duration_months,
            interest_rate_pct: args.interest_rate_pct,
        });
    }

    let request_id = RequestId(args.request_id);
    let user = args.user;

    run_with_service("act", move |service, correlation_id| async move {
        let updated = service.process_action(&request_id, &user, &input, &correlation_id).await?;
        Ok(serde_json::json!({
            "request": RequestSummary::from_request(&updated),
            "change_history": updated.change_history,
        }))
    })
}

pub fn show(request_id: &str) -> CommandResult {
    let request_id = RequestId(request_id.to_string());

    run_with_service("show", move |service, _correlation_id| async move {
        let Some(request) = service.get_request(&request_id).await? else {
            return Err(ApplicationError::Domain(
                crewflow_core::errors::WorkflowError::Validation {
                    field: "request_id".to_string(),
                    message: format!("no such request `{}`", request_id.0),
                },
            ));
        };
        let trail = service.audit_trail(&request_id).await?;
        Ok(serde_json::json!({
            "request": request,
            "audit_trail": trail,
        }))
    })
}

pub fn list(status: Option<&str>, limit: u32) -> CommandResult {
    let status = status.map(str::to_string);

    run_with_service("list", move |service, _correlation_id| async move {
        let requests = service.list_requests(status.as_deref(), limit).await?;
        let summaries: Vec<RequestSummary> =
            requests.iter().map(RequestSummary::from_request).collect();
        Ok(serde_json::json!({ "requests": summaries }))
    })
}

/// Shared scaffold: load config, connect, build the service, and render the
/// command's JSON payload or a classified failure.
fn run_with_service<F, Fut>(command: &'static str, f: F) -> CommandResult
where
    F: FnOnce(WorkflowService, String) -> Fut,
    Fut: std::future::Future<Output = Result<serde_json::Value, ApplicationError>>,
{
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    runtime.block_on(async {
        let pool = match connect(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return CommandResult::failure(
                    command,
                    "db_connectivity",
                    error.to_string(),
                    4,
                );
            }
        };

        let service = build_service(&pool, &config);
        let correlation_id = Uuid::new_v4().to_string();
        let result = f(service, correlation_id.clone()).await;
        pool.close().await;

        match result {
            Ok(payload) => CommandResult {
                exit_code: 0,
                output: serde_json::to_string_pretty(&payload)
                    .unwrap_or_else(|error| format!("{{\"error\":\"{error}\"}}")),
            },
            Err(error) => {
                let interface = error.into_interface(correlation_id);
                let (error_class, exit_code) = classify(&interface);
                CommandResult::failure(command, error_class, interface.to_string(), exit_code)
            }
        }
    })
}

fn build_service(pool: &DbPool, config: &AppConfig) -> WorkflowService {
    WorkflowService::new(
        Arc::new(SqlRequestRepository::new(pool.clone())),
        Arc::new(SqlWorkflowConfigRepository::new(pool.clone())),
        Arc::new(SqlOrganizationRepository::new(pool.clone())),
        Arc::new(SqlAuditEventRepository::new(pool.clone())),
        config.policy.override_policy(),
    )
}

fn classify(error: &InterfaceError) -> (&'static str, u8) {
    match error {
        InterfaceError::BadRequest { .. } => ("bad_request", 6),
        InterfaceError::Conflict { .. } => ("conflict", 7),
        InterfaceError::ServiceUnavailable { .. } => ("service_unavailable", 8),
        InterfaceError::Internal { .. } => ("internal", 9),
    }
}
