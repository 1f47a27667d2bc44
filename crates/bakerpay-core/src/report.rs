// Per-recipient payout report rows. One row per successful or
// attempted-and-failed dispatch; reconciliation keys on
// (cycle, delegator, recipient, tx kind, token).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address::Address;
use crate::enums::{PayoutKind, TxKind};
use crate::recipe::{CyclePayoutSummary, PayoutRecipe};
use crate::{mutez_to_tez_string, Mutez};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PayoutReport {
    pub id: String,
    pub baker: Address,
    pub timestamp: DateTime<Utc>,
    pub cycle: i64,
    pub kind: PayoutKind,
    pub tx_kind: TxKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fa_contract: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fa_token_id: Option<u64>,
    pub delegator: Address,
    #[serde(default)]
    pub delegated_balance: Mutez,
    pub recipient: Address,
    pub amount: Mutez,
    #[serde(default)]
    pub fee_rate_bps: u32,
    #[serde(default)]
    pub fee: Mutez,
    #[serde(default)]
    pub transaction_fee: Mutez,
    #[serde(default)]
    pub op_hash: String,
    pub is_success: bool,
    #[serde(default)]
    pub note: String,
}

impl PayoutReport {
    pub fn from_recipe(
        recipe: &PayoutRecipe,
        baker: &Address,
        cycle: i64,
        op_hash: &str,
        is_success: bool,
        note: &str,
    ) -> PayoutReport {
        PayoutReport {
            id: Uuid::new_v4().to_string(),
            baker: baker.clone(),
            timestamp: Utc::now(),
            cycle,
            kind: recipe.kind,
            tx_kind: recipe.tx_kind,
            fa_contract: recipe.fa_contract.clone(),
            fa_token_id: recipe.fa_token_id,
            delegator: recipe.delegator.clone(),
            delegated_balance: recipe.delegated_balance,
            recipient: recipe.recipient.clone(),
            amount: recipe.amount,
            fee_rate_bps: recipe.fee_rate_bps,
            fee: recipe.fee,
            transaction_fee: recipe.transaction_fee(),
            op_hash: op_hash.to_string(),
            is_success,
            note: if note.is_empty() {
                recipe.note.clone()
            } else {
                note.to_string()
            },
        }
    }

    /// True when this report settles the same payout the recipe describes.
    pub fn matches_recipe(&self, recipe: &PayoutRecipe) -> bool {
        self.delegator == recipe.delegator
            && self.recipient == recipe.recipient
            && self.tx_kind == recipe.tx_kind
            && self.fa_contract == recipe.fa_contract
            && self.fa_token_id == recipe.fa_token_id
    }

    pub fn csv_headers() -> Vec<&'static str> {
        vec![
            "id",
            "baker",
            "timestamp",
            "cycle",
            "kind",
            "op_kind",
            "contract",
            "token_id",
            "delegator",
            "delegator_balance",
            "recipient",
            "amount",
            "fee_rate",
            "fee",
            "tx_fee",
            "op_hash",
            "success",
            "note",
        ]
    }

    pub fn to_csv_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.baker.to_string(),
            self.timestamp.to_rfc3339(),
            self.cycle.to_string(),
            self.kind.to_string(),
            self.tx_kind.to_string(),
            self.fa_contract
                .as_ref()
                .map(|a| a.to_string())
                .unwrap_or_default(),
            self.fa_token_id.map(|t| t.to_string()).unwrap_or_default(),
            self.delegator.to_string(),
            self.delegated_balance.to_string(),
            self.recipient.to_string(),
            self.amount.to_string(),
            crate::bps_to_percentage_string(self.fee_rate_bps),
            self.fee.to_string(),
            self.transaction_fee.to_string(),
            self.op_hash.clone(),
            self.is_success.to_string(),
            self.note.clone(),
        ]
    }

    /// Compact row for terminal tables.
    pub fn to_table_row(&self) -> Vec<String> {
        vec![
            self.delegator.shortened(),
            self.recipient.shortened(),
            self.kind.to_string(),
            mutez_to_tez_string(self.amount),
            mutez_to_tez_string(self.fee),
            mutez_to_tez_string(self.transaction_fee),
            if self.op_hash.is_empty() {
                "-".to_string()
            } else {
                self.op_hash.clone()
            },
        ]
    }
}

pub fn filter_reports_by_baker(reports: &[PayoutReport], baker: &Address) -> Vec<PayoutReport> {
    reports
        .iter()
        .filter(|r| &r.baker == baker)
        .cloned()
        .collect()
}

/// The combined per-cycle report artifact.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PayoutCycleReport {
    pub cycle: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid: Vec<PayoutRecipe>,
    pub payouts: Vec<PayoutReport>,
    pub summary: CyclePayoutSummary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressKind;
    use crate::engines::OpLimits;

    fn tz(seed: u8) -> Address {
        Address::from_payload(AddressKind::Tz1, &[seed; 20])
    }

    fn recipe(seed: u8) -> PayoutRecipe {
        PayoutRecipe {
            delegator: tz(seed),
            recipient: tz(seed + 100),
            kind: PayoutKind::DelegatorReward,
            tx_kind: TxKind::Tez,
            fa_contract: None,
            fa_token_id: None,
            delegated_balance: 800_000,
            amount: 76_000,
            fee_rate_bps: 500,
            fee: 4_000,
            op_limits: Some(OpLimits {
                gas_limit: 1_500,
                storage_limit: 0,
                transaction_fee: 400,
                allocation_fee: 0,
                serialized_size: 150,
            }),
            note: String::new(),
            is_valid: true,
        }
    }

    #[test]
    fn test_report_json_roundtrip() {
        let report = PayoutReport::from_recipe(&recipe(1), &tz(9), 530, "oo1abc", true, "");
        let json = serde_json::to_string(&report).unwrap();
        let parsed: PayoutReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report, parsed);
    }

    #[test]
    fn test_matches_recipe_on_identity_key() {
        let r = recipe(1);
        let report = PayoutReport::from_recipe(&r, &tz(9), 530, "oo1abc", true, "");
        assert!(report.matches_recipe(&r));

        let mut other = recipe(1);
        other.recipient = tz(42);
        assert!(!report.matches_recipe(&other));

        let mut fa = recipe(1);
        fa.tx_kind = TxKind::Fa2;
        fa.fa_contract = Some(Address::from_payload(AddressKind::Kt1, &[5; 20]));
        fa.fa_token_id = Some(0);
        assert!(!report.matches_recipe(&fa));
    }

    #[test]
    fn test_csv_row_matches_headers() {
        let report = PayoutReport::from_recipe(&recipe(2), &tz(9), 530, "", false, "failed");
        assert_eq!(report.to_csv_row().len(), PayoutReport::csv_headers().len());
        assert_eq!(report.note, "failed");
    }

    #[test]
    fn test_filter_by_baker() {
        let a = PayoutReport::from_recipe(&recipe(1), &tz(9), 1, "", true, "");
        let b = PayoutReport::from_recipe(&recipe(2), &tz(8), 1, "", true, "");
        let filtered = filter_reports_by_baker(&[a.clone(), b], &tz(9));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, a.id);
    }
}
