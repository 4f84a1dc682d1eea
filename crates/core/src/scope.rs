use crate::domain::actor::Actor;

/// Decides whether an acting user's organizational mapping covers a given
/// employee. Ordinary role holders must pass this check before any workflow
/// action; the super-admin bypass class never reaches it.
pub struct ScopeAuthorizer;

impl ScopeAuthorizer {
    /// True iff some mapping entry matches the employee's division and either
    /// grants the whole division (empty department list) or names the
    /// employee's department. An actor with no mapping has no scope at all.
    pub fn has_scope(actor: &Actor, employee_department_id: &str, employee_division_id: &str) -> bool {
        actor
            .division_mapping
            .iter()
            .any(|entry| entry.covers(employee_division_id, employee_department_id))
    }
}
