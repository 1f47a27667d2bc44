use serde::{Deserialize, Serialize};
use std::fmt;

/// How the payout wallet key is provided.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalletMode {
    #[default]
    #[serde(rename = "local-private-key", alias = "local_private_key")]
    LocalPrivateKey,
    #[serde(rename = "remote-signer", alias = "remote_signer")]
    RemoteSigner,
}

/// Classification of a payout row.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutKind {
    #[serde(rename = "delegator reward")]
    DelegatorReward,
    #[serde(rename = "baker reward")]
    BakerReward,
    #[serde(rename = "donation")]
    Donation,
    #[serde(rename = "fee income")]
    FeeIncome,
    #[serde(rename = "invalid")]
    Invalid,
}

impl fmt::Display for PayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PayoutKind::DelegatorReward => "delegator reward",
            PayoutKind::BakerReward => "baker reward",
            PayoutKind::Donation => "donation",
            PayoutKind::FeeIncome => "fee income",
            PayoutKind::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// On-chain representation of a payout transfer.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TxKind {
    #[default]
    #[serde(rename = "tez")]
    Tez,
    #[serde(rename = "fa12")]
    Fa12,
    #[serde(rename = "fa2")]
    Fa2,
}

impl TxKind {
    pub fn is_fa(&self) -> bool {
        matches!(self, TxKind::Fa12 | TxKind::Fa2)
    }

    /// Packing priority: plain transfers first, then FA transfers.
    pub fn priority(&self) -> u8 {
        match self {
            TxKind::Tez => 0,
            TxKind::Fa12 => 1,
            TxKind::Fa2 => 2,
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxKind::Tez => "tez",
            TxKind::Fa12 => "fa12",
            TxKind::Fa2 => "fa2",
        };
        f.write_str(s)
    }
}

/// Why a candidate was excluded from the payout set.
/// `FailedBatchEstimate` is an intermediate marker used while bisecting a
/// failed batch simulation; it never survives into final recipes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    #[serde(rename = "DELEGATOR_EMPTIED")]
    Emptied,
    #[serde(rename = "DELEGATOR_IGNORED")]
    Ignored,
    #[serde(rename = "DELEGATOR_LOW_BALANCE")]
    LowBalance,
    #[serde(rename = "PAYOUT_BELOW_MINIMUM")]
    BelowMinimum,
    #[serde(rename = "PAYOUT_ZERO")]
    Zero,
    #[serde(rename = "PAYOUT_INVALID_RECIPIENT")]
    InvalidRecipient,
    #[serde(rename = "PAYOUT_KT_IGNORED")]
    KtIgnored,
    #[serde(rename = "RECIPIENT_TARGETS_PAYOUT")]
    TargetsPayout,
    #[serde(rename = "FAILED_TO_ESTIMATE_TX_COSTS")]
    FailedEstimate,
    #[serde(rename = "FAILED_TO_ESTIMATE_BATCH")]
    FailedBatchEstimate,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvalidReason::Emptied => "DELEGATOR_EMPTIED",
            InvalidReason::Ignored => "DELEGATOR_IGNORED",
            InvalidReason::LowBalance => "DELEGATOR_LOW_BALANCE",
            InvalidReason::BelowMinimum => "PAYOUT_BELOW_MINIMUM",
            InvalidReason::Zero => "PAYOUT_ZERO",
            InvalidReason::InvalidRecipient => "PAYOUT_INVALID_RECIPIENT",
            InvalidReason::KtIgnored => "PAYOUT_KT_IGNORED",
            InvalidReason::TargetsPayout => "RECIPIENT_TARGETS_PAYOUT",
            InvalidReason::FailedEstimate => "FAILED_TO_ESTIMATE_TX_COSTS",
            InvalidReason::FailedBatchEstimate => "FAILED_TO_ESTIMATE_BATCH",
        };
        f.write_str(s)
    }
}

/// Where rewards of delegators below the minimum balance go.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RewardDestination {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "everyone")]
    Everyone,
}

// ─────────────────────────────────────────────────────────────────
// Extension hook enums
// ─────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtensionRpcKind {
    #[default]
    #[serde(rename = "stdio")]
    Stdio,
    #[serde(rename = "tcp")]
    Tcp,
    #[serde(rename = "http")]
    Http,
    #[serde(rename = "ws")]
    Ws,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookMode {
    #[serde(rename = "ro")]
    ReadOnly,
    #[serde(rename = "rw")]
    ReadWrite,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    #[serde(rename = "all")]
    All,
    #[serde(rename = "test-notify")]
    TestNotify,
    #[serde(rename = "test-request")]
    TestRequest,
    /// Can adjust the generated candidate list (inject, remove, mutate).
    #[serde(rename = "after_candidate_generated")]
    AfterCandidateGenerated,
    /// Can adjust the bonded candidate list.
    #[serde(rename = "after_bonds_distributed")]
    AfterBondsDistributed,
    /// Can run additional balance logic and optionally skip the built-in check.
    #[serde(rename = "check_balance")]
    CheckBalance,
    /// Can adjust fees to be collected by the baker.
    #[serde(rename = "on_fees_collection")]
    OnFeesCollection,
    #[serde(rename = "after_payouts_blueprint_generated")]
    AfterPayoutsBlueprintGenerated,
}

impl Hook {
    pub fn method(&self) -> &'static str {
        match self {
            Hook::All => "all",
            Hook::TestNotify => "test-notify",
            Hook::TestRequest => "test-request",
            Hook::AfterCandidateGenerated => "after_candidate_generated",
            Hook::AfterBondsDistributed => "after_bonds_distributed",
            Hook::CheckBalance => "check_balance",
            Hook::OnFeesCollection => "on_fees_collection",
            Hook::AfterPayoutsBlueprintGenerated => "after_payouts_blueprint_generated",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtensionErrorAction {
    #[serde(rename = "continue")]
    Continue,
    #[default]
    #[serde(rename = "stop")]
    Stop,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtensionLifespan {
    /// Closed when the outermost pipeline invocation completes.
    #[default]
    #[serde(rename = "scoped")]
    Scoped,
    /// Closed after each hook invocation.
    #[serde(rename = "transient")]
    Transient,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_reason_wire_names() {
        let json = serde_json::to_string(&InvalidReason::LowBalance).unwrap();
        assert_eq!(json, "\"DELEGATOR_LOW_BALANCE\"");
        let parsed: InvalidReason = serde_json::from_str("\"FAILED_TO_ESTIMATE_BATCH\"").unwrap();
        assert_eq!(parsed, InvalidReason::FailedBatchEstimate);
    }

    #[test]
    fn test_wallet_mode_aliases() {
        let a: WalletMode = serde_json::from_str("\"local-private-key\"").unwrap();
        let b: WalletMode = serde_json::from_str("\"local_private_key\"").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hook_method_names() {
        assert_eq!(Hook::CheckBalance.method(), "check_balance");
        assert_eq!(Hook::All.method(), "all");
        assert_eq!(
            serde_json::to_string(&Hook::AfterCandidateGenerated).unwrap(),
            "\"after_candidate_generated\""
        );
    }

    #[test]
    fn test_tx_kind_priority_order() {
        assert!(TxKind::Tez.priority() < TxKind::Fa12.priority());
        assert!(TxKind::Fa12.priority() < TxKind::Fa2.priority());
        assert!(TxKind::Fa2.is_fa() && TxKind::Fa12.is_fa() && !TxKind::Tez.is_fa());
    }
}
