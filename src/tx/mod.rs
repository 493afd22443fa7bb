//! Transaction validation against balance and fee oracles.
//!
//! Validation is a pure decision over a parsed payment command plus oracle
//! answers. Structural problems (amount, address) and balance shortfalls deny;
//! a missing fee estimate follows the configured [`FeePolicy`]. Oracle
//! failures and timeouts fail closed: a balance that cannot be read denies,
//! it never allows.
//!
//! Callers gate on [`CommandKind::Payment`](crate::parser::CommandKind)
//! before validating; every other kind has no amount and would deny.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DenialReason, OracleError, ValidationWarning};
use crate::parser::{is_valid_address, ParsedCommand};

/// What to do when no fee estimate is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeePolicy {
    /// Refuse the transaction outright.
    DenyWithoutEstimate,
    /// Let it through with a warning on the report.
    WarnAndContinue,
}

impl Default for FeePolicy {
    fn default() -> Self {
        FeePolicy::DenyWithoutEstimate
    }
}

/// Tuning for the transaction validator.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Smallest spendable amount.
    pub min_amount: Decimal,
    /// Amounts with real precision beyond this many places deny.
    pub max_decimal_places: u32,
    pub fee_policy: FeePolicy,
    /// Deadline for each oracle call.
    pub oracle_timeout: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            // One planck at 12 chain decimals.
            min_amount: Decimal::new(1, 12),
            max_decimal_places: 12,
            fee_policy: FeePolicy::default(),
            oracle_timeout: Duration::from_secs(5),
        }
    }
}

/// Outcome of validating one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub denial: Option<DenialReason>,
    pub warning: Option<ValidationWarning>,
    /// Fee included in the balance check, when one was available.
    pub fee: Option<Decimal>,
}

impl ValidationReport {
    fn denied(denial: DenialReason) -> Self {
        Self {
            ok: false,
            denial: Some(denial),
            warning: None,
            fee: None,
        }
    }

    fn approved(fee: Option<Decimal>, warning: Option<ValidationWarning>) -> Self {
        Self {
            ok: true,
            denial: None,
            warning,
            fee,
        }
    }
}

/// Read-side oracle for account balances.
#[async_trait]
pub trait BalanceOracle: Send + Sync {
    /// Free balance for one account, in the transaction currency.
    async fn free_balance(&self, account: &str) -> Result<Decimal, OracleError>;
}

/// Read-side oracle for transfer fee estimates.
#[async_trait]
pub trait FeeOracle: Send + Sync {
    /// Estimated fee for a transfer, in the transaction currency.
    async fn estimate_fee(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<Decimal, OracleError>;
}

/// Validates payment commands against balances and fees.
pub struct TransactionValidator {
    config: ValidatorConfig,
}

impl TransactionValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate with the balance and fee already in hand.
    pub fn validate(
        &self,
        command: &ParsedCommand,
        balance: Decimal,
        fee: Option<Decimal>,
    ) -> ValidationReport {
        let (amount, _) = match self.checked_parts(command) {
            Ok(parts) => parts,
            Err(denial) => return ValidationReport::denied(denial),
        };
        self.settle(amount, balance, fee)
    }

    /// Validate by asking the oracles, each under the configured deadline.
    ///
    /// A balance oracle failure denies. A fee oracle failure degrades to
    /// "no estimate" and follows the fee policy.
    pub async fn validate_via_oracles(
        &self,
        command: &ParsedCommand,
        from_account: &str,
        balances: &dyn BalanceOracle,
        fees: &dyn FeeOracle,
    ) -> ValidationReport {
        let (amount, address) = match self.checked_parts(command) {
            Ok(parts) => parts,
            Err(denial) => return ValidationReport::denied(denial),
        };

        let timeout = self.config.oracle_timeout;
        let balance = match tokio::time::timeout(timeout, balances.free_balance(from_account)).await
        {
            Ok(Ok(balance)) => balance,
            Ok(Err(err)) => {
                return ValidationReport::denied(DenialReason::OracleUnavailable {
                    detail: err.to_string(),
                })
            }
            Err(_) => {
                return ValidationReport::denied(DenialReason::OracleUnavailable {
                    detail: format!("balance oracle timed out after {}ms", timeout.as_millis()),
                })
            }
        };

        let fee = match tokio::time::timeout(
            timeout,
            fees.estimate_fee(from_account, address, amount),
        )
        .await
        {
            Ok(Ok(fee)) => Some(fee),
            Ok(Err(_)) | Err(_) => None,
        };

        self.settle(amount, balance, fee)
    }

    /// Structural checks that need no oracle: amount shape and address shape.
    fn checked_parts<'a>(
        &self,
        command: &'a ParsedCommand,
    ) -> Result<(Decimal, &'a str), DenialReason> {
        let amount = match command.amount {
            None => {
                return Err(DenialReason::InvalidAmount {
                    detail: "missing amount".to_string(),
                })
            }
            Some(amount) if amount <= Decimal::ZERO => {
                return Err(DenialReason::InvalidAmount {
                    detail: format!("non-positive amount {amount}"),
                })
            }
            Some(amount) => amount,
        };
        if amount < self.config.min_amount {
            return Err(DenialReason::InvalidAmount {
                detail: format!("amount {amount} below minimum {}", self.config.min_amount),
            });
        }
        // normalize() first so trailing zeros do not count as precision.
        if amount.normalize().scale() > self.config.max_decimal_places {
            return Err(DenialReason::InvalidAmount {
                detail: format!(
                    "amount {amount} exceeds {} decimal places",
                    self.config.max_decimal_places
                ),
            });
        }

        let address = match command.recipient_address.as_deref() {
            None => {
                return Err(DenialReason::InvalidRecipient {
                    detail: "recipient did not resolve to an address".to_string(),
                })
            }
            Some(address) => address,
        };
        if !is_valid_address(address) {
            return Err(DenialReason::InvalidRecipient {
                detail: format!("malformed address {address}"),
            });
        }

        Ok((amount, address))
    }

    fn settle(&self, amount: Decimal, balance: Decimal, fee: Option<Decimal>) -> ValidationReport {
        if balance < amount {
            return ValidationReport::denied(DenialReason::InsufficientBalance {
                available: balance,
                required: amount,
            });
        }
        match fee {
            Some(fee) => {
                let required = amount + fee;
                if balance < required {
                    ValidationReport::denied(DenialReason::InsufficientBalanceForFees {
                        available: balance,
                        required,
                    })
                } else {
                    ValidationReport::approved(Some(fee), None)
                }
            }
            None => match self.config.fee_policy {
                FeePolicy::DenyWithoutEstimate => {
                    ValidationReport::denied(DenialReason::FeeEstimateUnavailable)
                }
                FeePolicy::WarnAndContinue => {
                    ValidationReport::approved(None, Some(ValidationWarning::FeeEstimateUnavailable))
                }
            },
        }
    }
}
