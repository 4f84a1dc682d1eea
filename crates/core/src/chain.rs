use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::actor::{HOD_ROLE, HR_ROLE, MANAGER_ROLE};
use crate::domain::normalize_key;
use crate::domain::request::{EmployeeRef, RequestKind};
use crate::domain::workflow::{
    ApprovalChainStep, FinalAuthority, RequestWorkflowState, StepStatus,
};
use crate::errors::WorkflowError;

/// One configured approval step, as persisted by the admin settings screen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigStep {
    pub step_order: u32,
    pub step_name: String,
    pub approver_role: String,
}

/// Admin-editable workflow configuration for one request kind. Read once at
/// request creation; never consulted again for an in-flight request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub kind: RequestKind,
    pub is_enabled: bool,
    pub use_dynamic_workflow: bool,
    pub steps: Vec<ConfigStep>,
    pub final_authority: FinalAuthority,
}

/// Resolved hierarchy holders for one employee, used by dynamic chains.
/// A `None` slot means the role has no real holder and is skipped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HierarchyHolders {
    pub hod: Option<String>,
    pub manager: Option<String>,
    pub hr_with_scope: Option<String>,
}

/// Lookup seam into the organization tree. Implementations are expected to be
/// side-effect-free; the db crate provides one over the employee tables, and
/// `InMemoryOrganizationDirectory` backs tests and fixtures.
pub trait OrganizationDirectory {
    fn hierarchy_holders(&self, employee: &EmployeeRef) -> Result<HierarchyHolders, String>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryOrganizationDirectory {
    holders: HierarchyHolders,
}

impl InMemoryOrganizationDirectory {
    pub fn with_holders(holders: HierarchyHolders) -> Self {
        Self { holders }
    }
}

impl OrganizationDirectory for InMemoryOrganizationDirectory {
    fn hierarchy_holders(&self, _employee: &EmployeeRef) -> Result<HierarchyHolders, String> {
        Ok(self.holders.clone())
    }
}

/// The approval chain and final-authority rule frozen into a new request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedWorkflow {
    pub approval_chain: Vec<ApprovalChainStep>,
    pub final_authority: FinalAuthority,
}

impl ResolvedWorkflow {
    pub fn into_state(self) -> RequestWorkflowState {
        RequestWorkflowState::new(self.approval_chain, self.final_authority)
    }
}

pub struct WorkflowConfigResolver;

impl WorkflowConfigResolver {
    /// Builds the ordered approval chain for one request at creation time.
    ///
    /// Static mode returns the configured steps sorted by `step_order`;
    /// dynamic mode keeps only roles that structurally resolve to a real
    /// holder in the employee's hierarchy. Zero resolvable steps is fatal:
    /// the caller must not create the request.
    pub fn resolve_chain<D>(
        config: &WorkflowConfig,
        employee: &EmployeeRef,
        directory: &D,
    ) -> Result<ResolvedWorkflow, WorkflowError>
    where
        D: OrganizationDirectory,
    {
        if !config.is_enabled {
            return Err(WorkflowError::Configuration {
                kind: config.kind.as_key().to_string(),
                message: "workflow is disabled for this request kind".to_string(),
            });
        }

        let chain = if config.use_dynamic_workflow {
            Self::resolve_dynamic(config, employee, directory)?
        } else {
            Self::resolve_static(config)?
        };

        if chain.is_empty() {
            return Err(WorkflowError::Configuration {
                kind: config.kind.as_key().to_string(),
                message: "workflow has no approvers".to_string(),
            });
        }

        Ok(ResolvedWorkflow { approval_chain: chain, final_authority: config.final_authority.clone() })
    }

    // The in-flight stage addresses the current step by role, so a role may
    // appear only once per chain.
    fn resolve_static(config: &WorkflowConfig) -> Result<Vec<ApprovalChainStep>, WorkflowError> {
        let mut steps: Vec<&ConfigStep> = config.steps.iter().collect();
        steps.sort_by_key(|step| step.step_order);

        let mut seen_roles = HashSet::new();
        let mut chain = Vec::with_capacity(steps.len());
        for step in steps {
            let role = normalize_key(&step.approver_role);
            if !seen_roles.insert(role.clone()) {
                return Err(WorkflowError::Configuration {
                    kind: config.kind.as_key().to_string(),
                    message: format!("approver role `{role}` appears more than once"),
                });
            }
            chain.push(ApprovalChainStep {
                step_order: step.step_order,
                role,
                label: step.step_name.clone(),
                status: StepStatus::Pending,
            });
        }

        Ok(chain)
    }

    fn resolve_dynamic<D>(
        config: &WorkflowConfig,
        employee: &EmployeeRef,
        directory: &D,
    ) -> Result<Vec<ApprovalChainStep>, WorkflowError>
    where
        D: OrganizationDirectory,
    {
        let holders = directory.hierarchy_holders(employee).map_err(|message| {
            WorkflowError::Configuration {
                kind: config.kind.as_key().to_string(),
                message: format!("organization directory lookup failed: {message}"),
            }
        })?;

        let probes = [
            (HOD_ROLE, "HOD approval", holders.hod.as_deref()),
            (MANAGER_ROLE, "Manager approval", holders.manager.as_deref()),
            (HR_ROLE, "HR approval", holders.hr_with_scope.as_deref()),
        ];

        let mut chain = Vec::new();
        let mut order = 1u32;
        for (role, label, holder) in probes {
            if holder.is_none() {
                continue;
            }
            chain.push(ApprovalChainStep {
                step_order: order,
                role: role.to_string(),
                label: label.to_string(),
                status: StepStatus::Pending,
            });
            order += 1;
        }

        Ok(chain)
    }
}
