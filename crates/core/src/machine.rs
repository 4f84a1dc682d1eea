use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::actor::{Actor, HR_ROLE};
use crate::domain::normalize_key;
use crate::domain::request::{RequestStatus, WorkflowRequest};
use crate::domain::workflow::{
    ChangeHistoryEntry, FinalAuthority, StepStatus, WorkflowStage, SPECIFIC_USER_AUTHORITY,
};
use crate::errors::WorkflowError;
use crate::recalc::{FieldMutationRecalculator, FieldOverrides, OverridePolicy};
use crate::scope::ScopeAuthorizer;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    Approve,
    Reject,
    Forward,
}

impl WorkflowAction {
    pub fn as_key(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Forward => "forward",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionInput {
    pub action: WorkflowAction,
    pub comments: Option<String>,
    pub overrides: Option<FieldOverrides>,
}

impl ActionInput {
    pub fn new(action: WorkflowAction) -> Self {
        Self { action, comments: None, overrides: None }
    }

    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }

    pub fn with_overrides(mut self, overrides: FieldOverrides) -> Self {
        self.overrides = Some(overrides);
        self
    }
}

/// The one transition algorithm shared by every request kind.
///
/// Pure: consumes the current request value and returns the next one, or a
/// typed error with no mutation. Persistence and atomicity are the calling
/// service's concern.
pub struct WorkflowStateMachine {
    policy: OverridePolicy,
}

impl Default for WorkflowStateMachine {
    fn default() -> Self {
        Self::new(OverridePolicy::default())
    }
}

impl WorkflowStateMachine {
    pub fn new(policy: OverridePolicy) -> Self {
        Self { policy }
    }

    pub fn process_action(
        &self,
        request: &WorkflowRequest,
        actor: &Actor,
        input: &ActionInput,
        at: DateTime<Utc>,
    ) -> Result<WorkflowRequest, WorkflowError> {
        let action = input.action;

        if request.is_terminal() {
            return Err(WorkflowError::ActionOnTerminalRequest {
                request_id: request.id.0.clone(),
                status: request.status.as_key(),
            });
        }

        if actor.is_super_admin() && action != WorkflowAction::Forward {
            return self.bypass(request, actor, action, input, at);
        }

        match request.workflow.stage.clone() {
            WorkflowStage::InProgress { role } => {
                self.act_at_step(request, actor, action, input, &role, at)
            }
            WorkflowStage::AwaitingFinalAuthority => {
                self.act_as_final_authority(request, actor, action, input, at)
            }
            WorkflowStage::Completed | WorkflowStage::Rejected => {
                Err(WorkflowError::ActionOnTerminalRequest {
                    request_id: request.id.0.clone(),
                    status: request.status.as_key(),
                })
            }
        }
    }

    pub fn process_action_with_audit<S>(
        &self,
        request: &WorkflowRequest,
        actor: &Actor,
        input: &ActionInput,
        at: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<WorkflowRequest, WorkflowError>
    where
        S: AuditSink,
    {
        let result = self.process_action(request, actor, input, at);
        match &result {
            Ok(updated) => {
                sink.emit(
                    AuditEvent::new(
                        Some(request.id.clone()),
                        audit.correlation_id.clone(),
                        "workflow.action_applied",
                        AuditCategory::Workflow,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("action", input.action.as_key())
                    .with_metadata("from", request.workflow.stage.as_key())
                    .with_metadata("to", updated.workflow.stage.as_key()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        Some(request.id.clone()),
                        audit.correlation_id.clone(),
                        "workflow.action_rejected",
                        AuditCategory::Workflow,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }

    /// Super-admin approve/reject is terminal from any chain position, with
    /// no scope check and no step-by-step authorization.
    fn bypass(
        &self,
        request: &WorkflowRequest,
        actor: &Actor,
        action: WorkflowAction,
        input: &ActionInput,
        at: DateTime<Utc>,
    ) -> Result<WorkflowRequest, WorkflowError> {
        let mut next = request.clone();
        let from_stage = next.workflow.stage.as_key();
        next.updated_at = at;

        match action {
            WorkflowAction::Approve => {
                if let Some(overrides) = input.overrides.as_ref() {
                    next = self.apply_overrides(&next, overrides, actor, input, at)?;
                }
                for step in &mut next.workflow.approval_chain {
                    if step.status == StepStatus::Pending {
                        step.status = StepStatus::Bypassed;
                    }
                }
                next.status = RequestStatus::Approved;
                next.workflow.stage = WorkflowStage::Completed;
                next.workflow.next_approver = None;
                next.workflow.is_completed = true;
            }
            WorkflowAction::Reject => {
                if let Some(position) = next.workflow.current_position() {
                    next.workflow.approval_chain[position].status = StepStatus::Rejected;
                }
                next.status = RequestStatus::Rejected;
                next.workflow.stage = WorkflowStage::Rejected;
                next.workflow.next_approver = None;
            }
            WorkflowAction::Forward => unreachable!("forward never enters the bypass path"),
        }

        let comments = input
            .comments
            .clone()
            .unwrap_or_else(|| format!("{} via super admin bypass", action.as_key()));
        next.change_history.push(action_entry(
            action,
            from_stage,
            next.workflow.stage.as_key(),
            actor,
            at,
            Some(comments),
        ));
        Ok(next)
    }

    fn act_at_step(
        &self,
        request: &WorkflowRequest,
        actor: &Actor,
        action: WorkflowAction,
        input: &ActionInput,
        stage_role: &str,
        at: DateTime<Utc>,
    ) -> Result<WorkflowRequest, WorkflowError> {
        let position = request.workflow.current_position().ok_or_else(|| {
            WorkflowError::Configuration {
                kind: request.kind.as_key().to_string(),
                message: format!("current stage names role `{stage_role}` absent from the chain"),
            }
        })?;
        let step_role = request.workflow.approval_chain[position].role.clone();

        self.authorize_at_step(request, actor, &step_role)?;

        let mut next = request.clone();
        let from_stage = next.workflow.stage.as_key();
        next.updated_at = at;
        let last_position = next.workflow.approval_chain.len() - 1;

        match action {
            WorkflowAction::Reject => {
                next.workflow.approval_chain[position].status = StepStatus::Rejected;
                next.status = RequestStatus::Rejected;
                next.workflow.stage = WorkflowStage::Rejected;
                next.workflow.next_approver = None;
            }
            WorkflowAction::Forward => {
                if position == last_position {
                    return Err(WorkflowError::Validation {
                        field: "action".to_string(),
                        message: "no next step to forward to".to_string(),
                    });
                }
                let next_role = next.workflow.approval_chain[position + 1].role.clone();
                next.workflow.approval_chain[position].status = StepStatus::Forwarded;
                next.workflow.stage = WorkflowStage::InProgress { role: next_role.clone() };
                next.workflow.next_approver = Some(next_role);
            }
            WorkflowAction::Approve => {
                if let Some(overrides) = input.overrides.as_ref() {
                    next = self.apply_overrides(&next, overrides, actor, input, at)?;
                }
                next.workflow.approval_chain[position].status = StepStatus::Approved;

                let is_final = is_final_authority(actor, &next.workflow.final_authority);
                if position == last_position && is_final {
                    next.status = RequestStatus::Approved;
                    next.workflow.stage = WorkflowStage::Completed;
                    next.workflow.next_approver = None;
                    next.workflow.is_completed = true;
                } else if position == last_position {
                    // The literal last step's holder does not finish the
                    // request unless their role matches the configured final
                    // authority.
                    next.status = RequestStatus::RoleApproved { role: step_role.clone() };
                    next.workflow.stage = WorkflowStage::AwaitingFinalAuthority;
                    next.workflow.next_approver =
                        Some(next.workflow.final_authority.role.clone());
                } else {
                    let next_role = next.workflow.approval_chain[position + 1].role.clone();
                    next.status = RequestStatus::RoleApproved { role: step_role.clone() };
                    next.workflow.stage = WorkflowStage::InProgress { role: next_role.clone() };
                    next.workflow.next_approver = Some(next_role);
                }
            }
        }

        next.change_history.push(action_entry(
            action,
            from_stage,
            next.workflow.stage.as_key(),
            actor,
            at,
            input.comments.clone(),
        ));
        Ok(next)
    }

    fn act_as_final_authority(
        &self,
        request: &WorkflowRequest,
        actor: &Actor,
        action: WorkflowAction,
        input: &ActionInput,
        at: DateTime<Utc>,
    ) -> Result<WorkflowRequest, WorkflowError> {
        let authority = &request.workflow.final_authority;
        if !is_final_authority(actor, authority) || !self.final_authority_scope_holds(request, actor)
        {
            return Err(WorkflowError::UnauthorizedActor {
                actor: actor.user_id.clone(),
                role: actor.role.clone(),
                expected: authority.role.clone(),
            });
        }

        let mut next = request.clone();
        let from_stage = next.workflow.stage.as_key();
        next.updated_at = at;

        match action {
            WorkflowAction::Approve => {
                if let Some(overrides) = input.overrides.as_ref() {
                    next = self.apply_overrides(&next, overrides, actor, input, at)?;
                }
                next.status = RequestStatus::Approved;
                next.workflow.stage = WorkflowStage::Completed;
                next.workflow.next_approver = None;
                next.workflow.is_completed = true;
            }
            WorkflowAction::Reject => {
                next.status = RequestStatus::Rejected;
                next.workflow.stage = WorkflowStage::Rejected;
                next.workflow.next_approver = None;
            }
            WorkflowAction::Forward => {
                return Err(WorkflowError::Validation {
                    field: "action".to_string(),
                    message: "no next step to forward to".to_string(),
                });
            }
        }

        next.change_history.push(action_entry(
            action,
            from_stage,
            next.workflow.stage.as_key(),
            actor,
            at,
            input.comments.clone(),
        ));
        Ok(next)
    }

    fn authorize_at_step(
        &self,
        request: &WorkflowRequest,
        actor: &Actor,
        step_role: &str,
    ) -> Result<(), WorkflowError> {
        let unauthorized = || WorkflowError::UnauthorizedActor {
            actor: actor.user_id.clone(),
            role: actor.role.clone(),
            expected: step_role.to_string(),
        };

        if !actor.has_role(step_role) {
            return Err(unauthorized());
        }

        let scoped = ScopeAuthorizer::has_scope(
            actor,
            &request.employee.department_id,
            &request.employee.division_id,
        );
        let any_hr_rule = request.workflow.final_authority.any_hr_can_approve
            && normalize_key(step_role) == HR_ROLE
            && actor.has_role(HR_ROLE);

        if scoped || any_hr_rule {
            Ok(())
        } else {
            Err(unauthorized())
        }
    }

    /// A role-matched final authority still needs organizational scope; the
    /// specific-user and any-HR designations are explicit grants that do not.
    fn final_authority_scope_holds(&self, request: &WorkflowRequest, actor: &Actor) -> bool {
        let authority = &request.workflow.final_authority;
        if authority.any_hr_can_approve && actor.has_role(HR_ROLE) {
            return true;
        }
        if normalize_key(&authority.role) == SPECIFIC_USER_AUTHORITY {
            return true;
        }
        ScopeAuthorizer::has_scope(
            actor,
            &request.employee.department_id,
            &request.employee.division_id,
        )
    }

    fn apply_overrides(
        &self,
        request: &WorkflowRequest,
        overrides: &FieldOverrides,
        actor: &Actor,
        input: &ActionInput,
        at: DateTime<Utc>,
    ) -> Result<WorkflowRequest, WorkflowError> {
        let (updated, _entries) = FieldMutationRecalculator::apply_overrides(
            request,
            overrides,
            &self.policy,
            actor,
            at,
            input.comments.as_deref(),
        )?;
        Ok(updated)
    }
}

fn is_final_authority(actor: &Actor, authority: &FinalAuthority) -> bool {
    if actor.has_role(&authority.role) {
        return true;
    }
    if normalize_key(&authority.role) == SPECIFIC_USER_AUTHORITY {
        if let Some(user_id) = &authority.user_id {
            return normalize_key(user_id) == normalize_key(&actor.user_id);
        }
    }
    authority.any_hr_can_approve && actor.has_role(HR_ROLE)
}

fn action_entry(
    action: WorkflowAction,
    from_stage: String,
    to_stage: String,
    actor: &Actor,
    at: DateTime<Utc>,
    comments: Option<String>,
) -> ChangeHistoryEntry {
    ChangeHistoryEntry {
        field: action.as_key().to_string(),
        old_value: from_stage,
        new_value: to_stage,
        changed_by: actor.user_id.clone(),
        changed_at: at,
        comments,
    }
}
