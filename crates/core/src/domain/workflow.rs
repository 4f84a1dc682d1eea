use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::normalize_key;

/// Where a request currently sits in its approval chain.
///
/// `InProgress` always names a role present in the frozen chain. Terminal
/// stages never transition again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum WorkflowStage {
    InProgress { role: String },
    AwaitingFinalAuthority,
    Completed,
    Rejected,
}

impl WorkflowStage {
    pub fn as_key(&self) -> String {
        match self {
            Self::InProgress { role } => normalize_key(role),
            Self::AwaitingFinalAuthority => "final".to_string(),
            Self::Completed => "completed".to_string(),
            Self::Rejected => "rejected".to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Forwarded,
    Approved,
    Rejected,
    Bypassed,
}

impl StepStatus {
    pub fn as_key(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Forwarded => "forwarded",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Bypassed => "bypassed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalChainStep {
    pub step_order: u32,
    pub role: String,
    pub label: String,
    pub status: StepStatus,
}

/// The final-authority rule frozen into the request at creation time.
///
/// `role == "specific_user"` designates one user id rather than a role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalAuthority {
    pub role: String,
    pub any_hr_can_approve: bool,
    pub user_id: Option<String>,
}

pub const SPECIFIC_USER_AUTHORITY: &str = "specific_user";

impl FinalAuthority {
    pub fn for_role(role: impl Into<String>) -> Self {
        Self { role: role.into(), any_hr_can_approve: false, user_id: None }
    }

    pub fn specific_user(user_id: impl Into<String>) -> Self {
        Self {
            role: SPECIFIC_USER_AUTHORITY.to_string(),
            any_hr_can_approve: false,
            user_id: Some(user_id.into()),
        }
    }

    pub fn any_hr() -> Self {
        Self {
            role: super::actor::HR_ROLE.to_string(),
            any_hr_can_approve: true,
            user_id: None,
        }
    }
}

/// Snapshot of the approval workflow embedded in every request.
///
/// Chain membership is immutable once the request exists; only step statuses
/// and the stage move.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestWorkflowState {
    pub stage: WorkflowStage,
    pub next_approver: Option<String>,
    pub approval_chain: Vec<ApprovalChainStep>,
    pub final_authority: FinalAuthority,
    pub is_completed: bool,
}

impl RequestWorkflowState {
    pub fn new(chain: Vec<ApprovalChainStep>, final_authority: FinalAuthority) -> Self {
        let first_role = chain.first().map(|step| step.role.clone());
        let stage = match &first_role {
            Some(role) => WorkflowStage::InProgress { role: role.clone() },
            None => WorkflowStage::Completed,
        };
        Self {
            stage,
            next_approver: first_role,
            approval_chain: chain,
            final_authority,
            is_completed: false,
        }
    }

    /// Index of the chain step named by the current stage, if in progress.
    pub fn current_position(&self) -> Option<usize> {
        match &self.stage {
            WorkflowStage::InProgress { role } => self
                .approval_chain
                .iter()
                .position(|step| normalize_key(&step.role) == normalize_key(role)),
            _ => None,
        }
    }
}

/// Append-only audit record of one field mutation or workflow action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeHistoryEntry {
    pub field: String,
    pub old_value: String,
    pub new_value: String,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
    pub comments: Option<String>,
}
