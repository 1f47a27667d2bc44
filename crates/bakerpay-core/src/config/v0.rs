// Version 0 of the configuration file surface (TOML). Amounts are tez
// decimals and rates are decimal fractions here; the runtime configuration
// converts both to integer mutez / basis points at load time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::enums::{
    ExtensionErrorAction, ExtensionLifespan, ExtensionRpcKind, Hook, HookMode, RewardDestination,
    WalletMode,
};

pub const CURRENT_CONFIG_VERSION: u32 = 0;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct DelegatorRequirementsV0 {
    /// Minimum delegated balance in tez.
    #[serde(default)]
    pub minimum_balance: f64,
    #[serde(default)]
    pub below_minimum_reward_destination: RewardDestination,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct DelegatorOverrideV0 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_balance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_balance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baker_pays_transaction_fee: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baker_pays_allocation_fee: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct DelegatorsConfigurationV0 {
    #[serde(default)]
    pub requirements: DelegatorRequirementsV0,
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub overrides: BTreeMap<String, DelegatorOverrideV0>,
    /// Fee rate (as string key, e.g. "0.03") applied to a group of addresses.
    #[serde(default)]
    pub fee_overrides: BTreeMap<String, Vec<String>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PayoutConfigurationV0 {
    #[serde(default)]
    pub wallet_mode: WalletMode,
    /// Baker fee as a decimal fraction (0.05 = 5%).
    #[serde(default)]
    pub fee: f64,
    #[serde(default)]
    pub baker_pays_transaction_fee: bool,
    #[serde(default)]
    pub baker_pays_allocation_fee: bool,
    /// Minimum payout in tez; smaller TEZ payouts are absorbed as fees.
    #[serde(default)]
    pub minimum_payout_amount: f64,
    #[serde(default)]
    pub ignore_empty_accounts: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_gas_limit_buffer: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_deserialization_gas_buffer: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_fee_buffer: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kt_transaction_fee_buffer: Option<u64>,
}

impl Default for PayoutConfigurationV0 {
    fn default() -> Self {
        PayoutConfigurationV0 {
            wallet_mode: WalletMode::default(),
            fee: 0.05,
            baker_pays_transaction_fee: false,
            baker_pays_allocation_fee: false,
            minimum_payout_amount: 0.01,
            ignore_empty_accounts: false,
            transaction_gas_limit_buffer: Some(crate::DEFAULT_TX_GAS_LIMIT_BUFFER),
            transaction_deserialization_gas_buffer: Some(
                crate::DEFAULT_TX_DESERIALIZATION_GAS_BUFFER,
            ),
            transaction_fee_buffer: Some(crate::DEFAULT_TX_FEE_BUFFER as u64),
            kt_transaction_fee_buffer: Some(crate::DEFAULT_KT_TX_FEE_BUFFER as u64),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct IncomeRecipientsV0 {
    /// Bond income split (address -> weight).
    #[serde(default)]
    pub bonds: BTreeMap<String, f64>,
    /// Fee income split (address -> weight).
    #[serde(default)]
    pub fees: BTreeMap<String, f64>,
    /// Donation rate applied to both bonds and fees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donate_fees: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donate_bonds: Option<f64>,
    /// Donation split (address -> weight).
    #[serde(default)]
    pub donations: BTreeMap<String, f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NetworkConfigurationV0 {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_indexer_url")]
    pub indexer_url: String,
    #[serde(default)]
    pub explorer_url: String,
    /// Do not pay originated contract (KT) destinations.
    #[serde(default)]
    pub ignore_kt: bool,
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8732".to_string()
}

fn default_indexer_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

impl Default for NetworkConfigurationV0 {
    fn default() -> Self {
        NetworkConfigurationV0 {
            rpc_url: default_rpc_url(),
            indexer_url: default_indexer_url(),
            explorer_url: String::new(),
            ignore_kt: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NotificatorConfigurationV0 {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub admin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookSpecV0 {
    pub id: Hook,
    pub mode: HookMode,
}

/// Declaration of one registered extension.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExtensionDefinition {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub kind: ExtensionRpcKind,
    #[serde(default)]
    pub hooks: Vec<HookSpecV0>,
    #[serde(default = "default_extension_timeout")]
    pub timeout_s: u64,
    /// Total attempts per hook invocation.
    #[serde(default = "default_extension_retry")]
    pub retry: u32,
    #[serde(default = "default_extension_retry_delay")]
    pub retry_delay_s: u64,
    #[serde(default)]
    pub error_action: ExtensionErrorAction,
    #[serde(default)]
    pub lifespan: ExtensionLifespan,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<toml::Value>,
}

fn default_extension_timeout() -> u64 {
    10
}

fn default_extension_retry() -> u32 {
    1
}

fn default_extension_retry_delay() -> u64 {
    1
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ConfigurationV0 {
    #[serde(default)]
    pub config_version: u32,
    pub baker: String,
    #[serde(default)]
    pub payouts: PayoutConfigurationV0,
    #[serde(default)]
    pub delegators: DelegatorsConfigurationV0,
    #[serde(default)]
    pub income_recipients: IncomeRecipientsV0,
    #[serde(default)]
    pub network: NetworkConfigurationV0,
    #[serde(default)]
    pub notifications: Vec<NotificatorConfigurationV0>,
    #[serde(default)]
    pub extensions: Vec<ExtensionDefinition>,
}
