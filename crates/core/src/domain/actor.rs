use serde::{Deserialize, Serialize};

use crate::domain::normalize_key;

pub const SUPER_ADMIN_ROLE: &str = "super_admin";
pub const HR_ROLE: &str = "hr";
pub const HOD_ROLE: &str = "hod";
pub const MANAGER_ROLE: &str = "manager";

/// One organizational authority grant: a division, optionally narrowed to a
/// set of departments. An empty department list means the whole division.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivisionScope {
    pub division_id: String,
    pub department_ids: Vec<String>,
}

impl DivisionScope {
    pub fn whole_division(division_id: impl Into<String>) -> Self {
        Self { division_id: division_id.into(), department_ids: Vec::new() }
    }

    pub fn departments(
        division_id: impl Into<String>,
        department_ids: Vec<String>,
    ) -> Self {
        Self { division_id: division_id.into(), department_ids }
    }

    pub fn covers(&self, division_id: &str, department_id: &str) -> bool {
        if normalize_key(&self.division_id) != normalize_key(division_id) {
            return false;
        }
        if self.department_ids.is_empty() {
            return true;
        }
        self.department_ids
            .iter()
            .any(|candidate| normalize_key(candidate) == normalize_key(department_id))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub role: String,
    pub division_mapping: Vec<DivisionScope>,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), role: role.into(), division_mapping: Vec::new() }
    }

    pub fn with_mapping(mut self, mapping: Vec<DivisionScope>) -> Self {
        self.division_mapping = mapping;
        self
    }

    pub fn is_super_admin(&self) -> bool {
        normalize_key(&self.role) == SUPER_ADMIN_ROLE
    }

    pub fn has_role(&self, role: &str) -> bool {
        normalize_key(&self.role) == normalize_key(role)
    }
}
