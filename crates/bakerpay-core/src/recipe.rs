// Finalized payout instructions and the per-cycle blueprint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::engines::OpLimits;
use crate::enums::{PayoutKind, TxKind};
use crate::error::{PayoutError, Result};
use crate::ops::{Operation, TransferArgs};
use crate::Mutez;

/// One finalized per-recipient instruction. Frozen once emitted; invalid
/// recipes carry zero amount and never enter a batch.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PayoutRecipe {
    pub delegator: Address,
    pub recipient: Address,
    pub kind: PayoutKind,
    pub tx_kind: TxKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fa_contract: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fa_token_id: Option<u64>,
    #[serde(default)]
    pub delegated_balance: Mutez,
    pub amount: Mutez,
    #[serde(default)]
    pub fee_rate_bps: u32,
    #[serde(default)]
    pub fee: Mutez,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_limits: Option<OpLimits>,
    #[serde(default)]
    pub note: String,
    pub is_valid: bool,
}

impl PayoutRecipe {
    pub fn transaction_fee(&self) -> Mutez {
        self.op_limits.map(|l| l.transaction_fee).unwrap_or(0)
    }
}

impl TransferArgs for PayoutRecipe {
    fn tx_kind(&self) -> TxKind {
        self.tx_kind
    }

    fn destination(&self) -> &Address {
        &self.recipient
    }

    fn amount(&self) -> Mutez {
        self.amount
    }

    fn fa_contract(&self) -> Option<&Address> {
        self.fa_contract.as_ref()
    }

    fn fa_token_id(&self) -> Option<u64> {
        self.fa_token_id
    }
}

/// Ordered recipes executed as a single on-chain operation.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RecipeBatch(pub Vec<PayoutRecipe>);

impl RecipeBatch {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total_gas(&self) -> u64 {
        self.0
            .iter()
            .filter_map(|r| r.op_limits.map(|l| l.gas_limit))
            .sum()
    }

    pub fn total_size(&self) -> u64 {
        self.0
            .iter()
            .filter_map(|r| r.op_limits.map(|l| l.serialized_size))
            .sum()
    }

    /// Build the operation for this batch. Every recipe must carry
    /// finalized limits.
    pub fn to_operation(&self, source: &Address, ttl: u64) -> Result<Operation> {
        let mut op = Operation::new().with_source(source.clone()).with_ttl(ttl);
        for recipe in &self.0 {
            let limits = recipe.op_limits.ok_or_else(|| {
                PayoutError::Input(format!(
                    "recipe for {} has no operation limits",
                    recipe.recipient
                ))
            })?;
            op.add_transfer(recipe)?;
            let index = op.contents.len() - 1;
            op.apply_limits(index, &limits);
        }
        Ok(op)
    }
}

/// Aggregate accounting of one cycle's payouts.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CyclePayoutSummary {
    pub cycle: i64,
    pub delegators: usize,
    pub paid_delegators: usize,
    pub staking_balance: Mutez,
    pub earned_fees: Mutez,
    pub earned_rewards: Mutez,
    pub distributed_rewards: Mutez,
    pub bond_income: Mutez,
    pub fee_income: Mutez,
    pub income_total: Mutez,
    pub donated_bonds: Mutez,
    pub donated_fees: Mutez,
    pub donated_total: Mutez,
    pub timestamp: DateTime<Utc>,
}

/// The immutable plan for a cycle: recipes plus summary.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CyclePayoutBlueprint {
    pub cycle: i64,
    pub payouts: Vec<PayoutRecipe>,
    pub summary: CyclePayoutSummary,
}

impl CyclePayoutBlueprint {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PayoutError::Reporting(e.to_string()))
    }

    pub fn from_json(data: &str) -> Result<CyclePayoutBlueprint> {
        serde_json::from_str(data)
            .map_err(|e| PayoutError::Input(format!("failed to parse payout blueprint: {}", e)))
    }
}

pub fn only_valid(payouts: &[PayoutRecipe]) -> Vec<PayoutRecipe> {
    payouts.iter().filter(|p| p.is_valid).cloned().collect()
}

pub fn only_invalid(payouts: &[PayoutRecipe]) -> Vec<PayoutRecipe> {
    payouts.iter().filter(|p| !p.is_valid).cloned().collect()
}
