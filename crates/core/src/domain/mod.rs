pub mod actor;
pub mod request;
pub mod workflow;

/// Role and id comparisons are case-insensitive throughout the workflow core.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
