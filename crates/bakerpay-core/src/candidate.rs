// Payout candidates as they move through the generation pipeline:
// candidate -> bonded candidate -> simulated candidate -> recipe.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::engines::OpLimits;
use crate::enums::{InvalidReason, TxKind};
use crate::ops::TransferArgs;
use crate::Mutez;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PayoutCandidate {
    /// Delegator the payout is derived from.
    pub source: Address,
    /// Recipient after override resolution.
    pub recipient: Address,
    pub delegated_balance: Mutez,
    pub fee_rate_bps: u32,
    pub tx_kind: TxKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fa_contract: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fa_token_id: Option<u64>,
    pub baker_pays_tx_fee: bool,
    pub baker_pays_allocation_fee: bool,
    #[serde(default)]
    pub is_invalid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_because: Option<InvalidReason>,
}

impl PayoutCandidate {
    pub fn invalidate(&mut self, reason: InvalidReason) {
        self.is_invalid = true;
        self.invalid_because = Some(reason);
    }
}

/// Candidate with its computed share of rewards.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BondedCandidate {
    #[serde(flatten)]
    pub candidate: PayoutCandidate,
    /// Post-fee share of rewards (gross share until fees are collected).
    pub bonds_amount: Mutez,
    /// Portion kept by the baker.
    #[serde(default)]
    pub fee: Mutez,
}

impl BondedCandidate {
    pub fn invalidate(&mut self, reason: InvalidReason) {
        self.candidate.invalidate(reason);
        self.bonds_amount = 0;
    }
}

/// Bonded candidate with resource costs measured from a dry-run.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SimulatedCandidate {
    #[serde(flatten)]
    pub bonded: BondedCandidate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_limits: Option<OpLimits>,
}

impl SimulatedCandidate {
    pub fn is_invalid(&self) -> bool {
        self.bonded.candidate.is_invalid
    }

    pub fn invalidate(&mut self, reason: InvalidReason) {
        self.bonded.candidate.invalidate(reason);
    }

    /// Clear an intermediate batch-estimate marker so the candidate can be
    /// retried in a smaller batch.
    pub fn clear_batch_estimate_marker(&mut self) {
        if self.bonded.candidate.invalid_because == Some(InvalidReason::FailedBatchEstimate) {
            self.bonded.candidate.is_invalid = false;
            self.bonded.candidate.invalid_because = None;
        }
    }
}

impl TransferArgs for SimulatedCandidate {
    fn tx_kind(&self) -> TxKind {
        self.bonded.candidate.tx_kind
    }

    fn destination(&self) -> &Address {
        &self.bonded.candidate.recipient
    }

    fn amount(&self) -> Mutez {
        self.bonded.bonds_amount
    }

    fn fa_contract(&self) -> Option<&Address> {
        self.bonded.candidate.fa_contract.as_ref()
    }

    fn fa_token_id(&self) -> Option<u64> {
        self.bonded.candidate.fa_token_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressKind;

    fn candidate(seed: u8) -> PayoutCandidate {
        let addr = Address::from_payload(AddressKind::Tz1, &[seed; 20]);
        PayoutCandidate {
            source: addr.clone(),
            recipient: addr,
            delegated_balance: 1_000_000,
            fee_rate_bps: 500,
            tx_kind: TxKind::Tez,
            fa_contract: None,
            fa_token_id: None,
            baker_pays_tx_fee: false,
            baker_pays_allocation_fee: false,
            is_invalid: false,
            invalid_because: None,
        }
    }

    #[test]
    fn test_invalidate_zeroes_bonds() {
        let mut bonded = BondedCandidate {
            candidate: candidate(1),
            bonds_amount: 42,
            fee: 0,
        };
        bonded.invalidate(InvalidReason::LowBalance);
        assert!(bonded.candidate.is_invalid);
        assert_eq!(bonded.bonds_amount, 0);
        assert_eq!(bonded.candidate.invalid_because, Some(InvalidReason::LowBalance));
    }

    #[test]
    fn test_batch_estimate_marker_is_clearable() {
        let mut simulated = SimulatedCandidate {
            bonded: BondedCandidate {
                candidate: candidate(2),
                bonds_amount: 10,
                fee: 0,
            },
            op_limits: None,
        };
        simulated.invalidate(InvalidReason::FailedBatchEstimate);
        assert!(simulated.is_invalid());
        simulated.clear_batch_estimate_marker();
        assert!(!simulated.is_invalid());

        // a persisted estimate failure is not clearable
        simulated.invalidate(InvalidReason::FailedEstimate);
        simulated.clear_batch_estimate_marker();
        assert!(simulated.is_invalid());
    }

    #[test]
    fn test_hook_payload_roundtrip() {
        let bonded = BondedCandidate {
            candidate: candidate(3),
            bonds_amount: 95_000_000,
            fee: 5_000_000,
        };
        let json = serde_json::to_value(&bonded).unwrap();
        // flattened candidate fields sit at the top level for hooks
        assert!(json.get("source").is_some());
        assert!(json.get("bonds_amount").is_some());
        let back: BondedCandidate = serde_json::from_value(json).unwrap();
        assert_eq!(back.bonds_amount, 95_000_000);
        assert_eq!(back.candidate.fee_rate_bps, 500);
    }
}
