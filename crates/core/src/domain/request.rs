use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::normalize_key;
use crate::domain::workflow::{ChangeHistoryEntry, RequestWorkflowState, WorkflowStage};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Leave,
    OnDuty,
    Permission,
    Loan,
    SalaryAdvance,
    Overtime,
    CompensatoryLeave,
}

impl RequestKind {
    pub const ALL: [RequestKind; 7] = [
        Self::Leave,
        Self::OnDuty,
        Self::Permission,
        Self::Loan,
        Self::SalaryAdvance,
        Self::Overtime,
        Self::CompensatoryLeave,
    ];

    pub fn as_key(&self) -> &'static str {
        match self {
            Self::Leave => "leave",
            Self::OnDuty => "od",
            Self::Permission => "permission",
            Self::Loan => "loan",
            Self::SalaryAdvance => "salary_advance",
            Self::Overtime => "ot",
            Self::CompensatoryLeave => "ccl",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match normalize_key(raw).as_str() {
            "leave" => Some(Self::Leave),
            "od" => Some(Self::OnDuty),
            "permission" => Some(Self::Permission),
            "loan" => Some(Self::Loan),
            "salary_advance" => Some(Self::SalaryAdvance),
            "ot" => Some(Self::Overtime),
            "ccl" => Some(Self::CompensatoryLeave),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    RoleApproved { role: String },
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_key(&self) -> String {
        match self {
            Self::Pending => "pending".to_string(),
            Self::RoleApproved { role } => format!("{}_approved", normalize_key(role)),
            Self::Approved => "approved".to_string(),
            Self::Rejected => "rejected".to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

/// The employee a request was raised for, with the organizational coordinates
/// scope checks run against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeRef {
    pub employee_id: String,
    pub division_id: String,
    pub department_id: String,
}

/// Interest-bearing loan terms. `emi_amount` and `total_amount` are derived
/// from the first three fields and recomputed on every override.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub principal: Decimal,
    pub duration_months: u32,
    pub interest_rate_pct: Decimal,
    pub emi_amount: Decimal,
    pub total_amount: Decimal,
}

/// Salary advance: repaid 1:1, no interest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceTerms {
    pub total_amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub id: RequestId,
    pub kind: RequestKind,
    pub employee: EmployeeRef,
    pub requested_by: String,
    pub status: RequestStatus,
    pub workflow: RequestWorkflowState,
    pub loan_config: Option<LoanTerms>,
    pub advance_config: Option<AdvanceTerms>,
    pub change_history: Vec<ChangeHistoryEntry>,
    /// Kind-specific summary (leave span, OT hours) carried opaquely.
    pub detail: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRequest {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal() || self.workflow.stage.is_terminal()
    }

    pub fn stage(&self) -> &WorkflowStage {
        &self.workflow.stage
    }
}

#[cfg(test)]
mod tests {
    use super::{RequestKind, RequestStatus};

    #[test]
    fn kind_keys_round_trip() {
        for kind in RequestKind::ALL {
            assert_eq!(RequestKind::parse(kind.as_key()), Some(kind));
        }
        assert_eq!(RequestKind::parse("payslip"), None);
    }

    #[test]
    fn role_approved_status_key_embeds_normalized_role() {
        let status = RequestStatus::RoleApproved { role: "Manager".to_string() };
        assert_eq!(status.as_key(), "manager_approved");
        assert!(!status.is_terminal());
        assert!(RequestStatus::Approved.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
    }
}
