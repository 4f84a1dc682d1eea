use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::Actor;
use crate::domain::request::WorkflowRequest;
use crate::domain::workflow::ChangeHistoryEntry;
use crate::errors::WorkflowError;

/// In-flight field overrides an approver may apply while approving.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOverrides {
    pub amount: Option<Decimal>,
    pub duration_months: Option<u32>,
    pub interest_rate_pct: Option<Decimal>,
}

impl FieldOverrides {
    pub fn amount(value: Decimal) -> Self {
        Self { amount: Some(value), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.amount.is_none() && self.duration_months.is_none() && self.interest_rate_pct.is_none()
    }
}

/// Policy bounds overrides are validated against, sourced from `AppConfig`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverridePolicy {
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    pub max_interest_rate_pct: Decimal,
    pub max_duration_months: u32,
}

impl Default for OverridePolicy {
    fn default() -> Self {
        Self {
            min_amount: Decimal::new(100, 0),
            max_amount: Decimal::new(10_000_000, 0),
            max_interest_rate_pct: Decimal::new(36, 0),
            max_duration_months: 120,
        }
    }
}

/// Applies in-flight overrides and recomputes derived loan values.
///
/// Pure and deterministic: the caller supplies the timestamp, and the same
/// `(amount, duration, interest rate)` always yields the same result.
pub struct FieldMutationRecalculator;

impl FieldMutationRecalculator {
    pub fn apply_overrides(
        request: &WorkflowRequest,
        overrides: &FieldOverrides,
        policy: &OverridePolicy,
        actor: &Actor,
        at: DateTime<Utc>,
        comments: Option<&str>,
    ) -> Result<(WorkflowRequest, Vec<ChangeHistoryEntry>), WorkflowError> {
        if overrides.is_empty() {
            return Ok((request.clone(), Vec::new()));
        }

        validate(overrides, policy)?;

        let mut updated = request.clone();
        let mut entries = Vec::new();
        let entry = |field: &str, old: String, new: String| ChangeHistoryEntry {
            field: field.to_string(),
            old_value: old,
            new_value: new,
            changed_by: actor.user_id.clone(),
            changed_at: at,
            comments: comments.map(str::to_string),
        };

        if let Some(loan) = updated.loan_config.as_mut() {
            if let Some(amount) = overrides.amount {
                if amount != loan.principal {
                    entries.push(entry("amount", loan.principal.to_string(), amount.to_string()));
                    loan.principal = amount;
                }
            }
            if let Some(duration) = overrides.duration_months {
                if duration != loan.duration_months {
                    entries.push(entry(
                        "loan_config.duration_months",
                        loan.duration_months.to_string(),
                        duration.to_string(),
                    ));
                    loan.duration_months = duration;
                }
            }
            if let Some(rate) = overrides.interest_rate_pct {
                if rate != loan.interest_rate_pct {
                    entries.push(entry(
                        "loan_config.interest_rate_pct",
                        loan.interest_rate_pct.to_string(),
                        rate.to_string(),
                    ));
                    loan.interest_rate_pct = rate;
                }
            }

            if !entries.is_empty() {
                loan.emi_amount =
                    emi_amount(loan.principal, loan.duration_months, loan.interest_rate_pct);
                loan.total_amount =
                    (loan.emi_amount * Decimal::from(loan.duration_months)).round_dp(2);
            }
        } else if let Some(advance) = updated.advance_config.as_mut() {
            if overrides.duration_months.is_some() || overrides.interest_rate_pct.is_some() {
                return Err(WorkflowError::Validation {
                    field: "loan_config".to_string(),
                    message: "salary advances carry no duration or interest rate".to_string(),
                });
            }
            if let Some(amount) = overrides.amount {
                if amount != advance.total_amount {
                    entries.push(entry(
                        "amount",
                        advance.total_amount.to_string(),
                        amount.to_string(),
                    ));
                    advance.total_amount = amount;
                }
            }
        } else {
            return Err(WorkflowError::Validation {
                field: "amount".to_string(),
                message: format!(
                    "request kind `{}` has no overridable economic fields",
                    request.kind.as_key()
                ),
            });
        }

        updated.change_history.extend(entries.iter().cloned());
        Ok((updated, entries))
    }
}

/// Standard amortization: `emi = P·r·(1+r)^n / ((1+r)^n − 1)` with the
/// monthly rate `r = annual_pct / 1200`. A zero rate degenerates to `P/n`.
pub fn emi_amount(principal: Decimal, duration_months: u32, interest_rate_pct: Decimal) -> Decimal {
    let months = Decimal::from(duration_months.max(1));
    if interest_rate_pct.is_zero() {
        return (principal / months).round_dp(2);
    }

    let monthly_rate = interest_rate_pct / Decimal::new(1200, 0);
    let mut factor = Decimal::ONE;
    for _ in 0..duration_months.max(1) {
        factor *= Decimal::ONE + monthly_rate;
    }

    (principal * monthly_rate * factor / (factor - Decimal::ONE)).round_dp(2)
}

fn validate(overrides: &FieldOverrides, policy: &OverridePolicy) -> Result<(), WorkflowError> {
    if let Some(amount) = overrides.amount {
        if amount < policy.min_amount || amount > policy.max_amount {
            return Err(WorkflowError::Validation {
                field: "amount".to_string(),
                message: format!(
                    "amount {amount} is outside the allowed range {}..={}",
                    policy.min_amount, policy.max_amount
                ),
            });
        }
    }
    if let Some(duration) = overrides.duration_months {
        if duration == 0 || duration > policy.max_duration_months {
            return Err(WorkflowError::Validation {
                field: "loan_config.duration_months".to_string(),
                message: format!(
                    "duration {duration} months is outside the allowed range 1..={}",
                    policy.max_duration_months
                ),
            });
        }
    }
    if let Some(rate) = overrides.interest_rate_pct {
        if rate.is_sign_negative() || rate > policy.max_interest_rate_pct {
            return Err(WorkflowError::Validation {
                field: "loan_config.interest_rate_pct".to_string(),
                message: format!(
                    "interest rate {rate}% is outside the allowed range 0..={}%",
                    policy.max_interest_rate_pct
                ),
            });
        }
    }
    Ok(())
}
