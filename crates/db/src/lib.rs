pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod service;

pub use connection::{connect, DbPool};
pub use fixtures::{BaselineSeedDataset, SeedResult, VerificationResult};
pub use service::{LoanApplication, NewRequest, WorkflowService};
