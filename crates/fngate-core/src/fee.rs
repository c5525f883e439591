//! Fee accountant: fee metering, escrow settlement and refunds.
//!
//! The fee for a request is `unit_price × gas_budget` when the scalar is 0,
//! and `unit_price × gas_budget × scalar` otherwise. `unit_price` is the
//! caller's execution-environment price signal and is never stored here.
//!
//! Settlement is planned first and executed through a [`PaymentRail`] as a
//! single all-or-nothing batch of transfers, so a rejected refund can never
//! leave the fee vault credited.

use crate::error::{GatewayError, GatewayResult};
use crate::types::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Gas budget used when a submission does not name one.
pub const DEFAULT_GAS_BUDGET: u64 = 1_000_000;

/// Compute the fee for `gas_budget` at `unit_price` under `scalar`.
pub fn calculate_fee(gas_budget: u64, unit_price: u64, scalar: u64) -> GatewayResult<u128> {
    // u64 × u64 always fits in u128.
    let base = u128::from(unit_price) * u128::from(gas_budget);
    if scalar == 0 {
        return Ok(base);
    }
    base.checked_mul(u128::from(scalar))
        .ok_or(GatewayError::FeeOverflow {
            gas_budget,
            unit_price,
            scalar,
        })
}

/// Process-wide fee parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Multiplier; 0 disables scaling.
    pub scalar: u64,
    /// Budget applied when a caller omits one.
    pub default_gas_budget: u64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            scalar: 0,
            default_gas_budget: DEFAULT_GAS_BUDGET,
        }
    }
}

impl FeeSchedule {
    /// Schedule with an explicit scalar and the default budget.
    #[must_use]
    pub const fn with_scalar(scalar: u64) -> Self {
        Self {
            scalar,
            default_gas_budget: DEFAULT_GAS_BUDGET,
        }
    }

    /// The budget actually metered for an optional caller budget.
    #[inline]
    #[must_use]
    pub fn resolve_budget(&self, gas_budget: Option<u64>) -> u64 {
        gas_budget.unwrap_or(self.default_gas_budget)
    }

    /// Fee for an optional budget at `unit_price`. Pure.
    pub fn quote(&self, gas_budget: Option<u64>, unit_price: u64) -> GatewayResult<u128> {
        calculate_fee(self.resolve_budget(gas_budget), unit_price, self.scalar)
    }
}

/// Why a transfer moves value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    /// Fee forwarded to the vault, credited on behalf of `depositor`.
    FeeDeposit {
        /// Account the vault credits.
        depositor: AccountId,
    },
    /// Unspent payment returned.
    Refund,
}

/// One leg of a settlement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Recipient.
    pub to: AccountId,
    /// Amount moved.
    pub amount: u128,
    /// Purpose.
    pub kind: TransferKind,
}

/// A rail refused the transfer at `index`; nothing was applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferRejected {
    /// Index into the submitted transfer slice.
    pub index: usize,
}

/// Moves escrowed value to recipients.
///
/// `execute` must apply every transfer or none of them.
pub trait PaymentRail {
    /// Apply `transfers` atomically.
    fn execute(&mut self, transfers: &[Transfer]) -> Result<(), TransferRejected>;
}

/// Payment terms of one submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payment<'a> {
    /// Budget to meter.
    pub gas_budget: u64,
    /// Price signal for this call.
    pub unit_price: u64,
    /// Who paid.
    pub payer: &'a AccountId,
    /// Who receives the remainder.
    pub refund_recipient: &'a AccountId,
    /// Amount escrowed with the call.
    pub amount_provided: u128,
}

/// Plan the transfers for `payment`. Pure; fails with
/// `InsufficientPayment` when the fee is not covered.
pub fn plan_settlement(
    schedule: &FeeSchedule,
    payment: &Payment<'_>,
    fee_vault: Option<&AccountId>,
) -> GatewayResult<(u128, Vec<Transfer>)> {
    let fee = calculate_fee(payment.gas_budget, payment.unit_price, schedule.scalar)?;
    if payment.amount_provided < fee {
        return Err(GatewayError::InsufficientPayment {
            required: fee,
            provided: payment.amount_provided,
        });
    }

    let mut transfers = Vec::with_capacity(2);
    if let Some(vault) = fee_vault {
        if fee > 0 {
            transfers.push(Transfer {
                to: vault.clone(),
                amount: fee,
                kind: TransferKind::FeeDeposit {
                    depositor: payment.payer.clone(),
                },
            });
        }
    }
    let refund = payment.amount_provided - fee;
    if refund > 0 {
        transfers.push(Transfer {
            to: payment.refund_recipient.clone(),
            amount: refund,
            kind: TransferKind::Refund,
        });
    }
    Ok((fee, transfers))
}

/// Compute the fee, forward it to the vault and refund the remainder, as one
/// atomic unit. Returns the fee charged.
pub fn settle_payment<P: PaymentRail + ?Sized>(
    schedule: &FeeSchedule,
    payment: &Payment<'_>,
    fee_vault: Option<&AccountId>,
    rail: &mut P,
) -> GatewayResult<u128> {
    let (fee, transfers) = plan_settlement(schedule, payment, fee_vault)?;
    if let Err(TransferRejected { index }) = rail.execute(&transfers) {
        return Err(match transfers.get(index) {
            Some(Transfer {
                to,
                amount,
                kind: TransferKind::FeeDeposit { .. },
            }) => GatewayError::FeeVaultRejected {
                vault: to.clone(),
                amount: *amount,
            },
            Some(Transfer { to, amount, .. }) => GatewayError::RefundFailed {
                recipient: to.clone(),
                amount: *amount,
            },
            // Rail reported an index outside the batch.
            None => GatewayError::RefundFailed {
                recipient: payment.refund_recipient.clone(),
                amount: payment.amount_provided - fee,
            },
        });
    }
    debug!(
        fee = %fee,
        refund = %(payment.amount_provided - fee),
        payer = %payment.payer,
        "payment settled"
    );
    Ok(fee)
}

/// In-memory escrow rail.
///
/// Tracks plain balances, fee-vault credits per depositor, and a set of
/// accounts that refuse incoming value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escrow {
    balances: BTreeMap<AccountId, u128>,
    vault_credits: BTreeMap<AccountId, u128>,
    #[serde(default)]
    rejecting: BTreeSet<AccountId>,
}

impl Escrow {
    /// Empty escrow.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value received by `account` (refunds and vault deposits).
    #[must_use]
    pub fn balance_of(&self, account: &AccountId) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Fees credited in the vault on behalf of `depositor`.
    #[must_use]
    pub fn vault_credit_of(&self, depositor: &AccountId) -> u128 {
        self.vault_credits.get(depositor).copied().unwrap_or(0)
    }

    /// Make `account` refuse every incoming transfer.
    pub fn reject_incoming(&mut self, account: impl Into<AccountId>) {
        self.rejecting.insert(account.into());
    }

    /// Undo [`Escrow::reject_incoming`].
    pub fn accept_incoming(&mut self, account: &AccountId) {
        self.rejecting.remove(account);
    }
}

impl PaymentRail for Escrow {
    fn execute(&mut self, transfers: &[Transfer]) -> Result<(), TransferRejected> {
        // Stage every post-transfer value before touching state.
        let mut staged_balances: BTreeMap<&AccountId, u128> = BTreeMap::new();
        let mut staged_credits: BTreeMap<&AccountId, u128> = BTreeMap::new();

        for (index, t) in transfers.iter().enumerate() {
            if self.rejecting.contains(&t.to) {
                return Err(TransferRejected { index });
            }
            let bal = staged_balances
                .get(&t.to)
                .copied()
                .unwrap_or_else(|| self.balance_of(&t.to));
            let bal = bal.checked_add(t.amount).ok_or(TransferRejected { index })?;
            staged_balances.insert(&t.to, bal);

            if let TransferKind::FeeDeposit { depositor } = &t.kind {
                let credit = staged_credits
                    .get(depositor)
                    .copied()
                    .unwrap_or_else(|| self.vault_credit_of(depositor));
                let credit = credit
                    .checked_add(t.amount)
                    .ok_or(TransferRejected { index })?;
                staged_credits.insert(depositor, credit);
            }
        }

        let staged_balances: Vec<(AccountId, u128)> = staged_balances
            .into_iter()
            .map(|(k, v)| (k.clone(), v))
            .collect();
        let staged_credits: Vec<(AccountId, u128)> = staged_credits
            .into_iter()
            .map(|(k, v)| (k.clone(), v))
            .collect();
        self.balances.extend(staged_balances);
        self.vault_credits.extend(staged_credits);
        Ok(())
    }
}
