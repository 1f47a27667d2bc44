// Runtime configuration: the v0 file surface converted to integer mutez
// amounts and basis-point rates, with address fields validated. Loading
// migrates older config versions in place (original moved to
// `<path>.backup`).

pub mod v0;

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::address::Address;
use crate::enums::{RewardDestination, WalletMode};
use crate::error::{PayoutError, Result};
use crate::{rate_to_bps, tez_to_mutez, Mutez};

pub use v0::{ConfigurationV0, ExtensionDefinition, HookSpecV0, CURRENT_CONFIG_VERSION};

pub const CONFIG_FILE_BACKUP_SUFFIX: &str = ".backup";

#[derive(Debug, Clone)]
pub struct RuntimeDelegatorOverride {
    pub recipient: Option<Address>,
    pub fee_bps: Option<u32>,
    pub minimum_balance: Option<Mutez>,
    pub maximum_balance: Option<Mutez>,
    pub baker_pays_tx_fee: Option<bool>,
    pub baker_pays_allocation_fee: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct RuntimeDelegatorsConfiguration {
    pub minimum_balance: Mutez,
    pub below_minimum_reward_destination: RewardDestination,
    pub ignore: Vec<Address>,
    pub overrides: BTreeMap<Address, RuntimeDelegatorOverride>,
}

#[derive(Debug, Clone)]
pub struct RuntimePayoutConfiguration {
    pub wallet_mode: WalletMode,
    pub fee_bps: u32,
    pub baker_pays_tx_fee: bool,
    pub baker_pays_allocation_fee: bool,
    pub minimum_amount: Mutez,
    pub ignore_empty_accounts: bool,
    pub gas_limit_buffer: u64,
    pub deserialization_gas_buffer: u64,
    pub fee_buffer: Mutez,
    pub kt_fee_buffer: Mutez,
}

/// Income split weights normalized to basis points of the whole.
#[derive(Debug, Clone, Default)]
pub struct RuntimeIncomeRecipients {
    pub bonds: Vec<(Address, u32)>,
    pub fees: Vec<(Address, u32)>,
    pub donate_bonds_bps: u32,
    pub donate_fees_bps: u32,
    pub donations: Vec<(Address, u32)>,
}

#[derive(Debug, Clone)]
pub struct RuntimeNetworkConfiguration {
    pub rpc_url: String,
    pub indexer_url: String,
    pub explorer_url: String,
    pub ignore_kt: bool,
}

#[derive(Debug, Clone)]
pub struct RuntimeNotificatorConfiguration {
    pub kind: String,
    pub is_admin: bool,
    pub url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RuntimeConfiguration {
    pub baker: Address,
    pub payouts: RuntimePayoutConfiguration,
    pub delegators: RuntimeDelegatorsConfiguration,
    pub income_recipients: RuntimeIncomeRecipients,
    pub network: RuntimeNetworkConfiguration,
    pub notifications: Vec<RuntimeNotificatorConfiguration>,
    pub extensions: Vec<ExtensionDefinition>,
}

impl RuntimeConfiguration {
    /// Effective fee rate for a delegator: explicit override, then group
    /// fee override, then the baker default.
    pub fn fee_bps_for(&self, delegator: &Address) -> u32 {
        if let Some(ov) = self.delegators.overrides.get(delegator) {
            if let Some(fee) = ov.fee_bps {
                return fee;
            }
        }
        self.payouts.fee_bps
    }

    pub fn override_for(&self, delegator: &Address) -> Option<&RuntimeDelegatorOverride> {
        self.delegators.overrides.get(delegator)
    }

    pub fn is_ignored(&self, delegator: &Address) -> bool {
        self.delegators.ignore.contains(delegator)
    }
}

fn parse_address(field: &str, raw: &str) -> Result<Address> {
    Address::parse(raw)
        .map_err(|e| PayoutError::Configuration(format!("invalid address in {}: {}", field, e)))
}

fn weights_to_bps(field: &str, weights: &BTreeMap<String, f64>) -> Result<Vec<(Address, u32)>> {
    let mut out = Vec::with_capacity(weights.len());
    let mut total = 0u32;
    for (raw, weight) in weights {
        let address = parse_address(field, raw)?;
        let bps = rate_to_bps(*weight);
        total = total.saturating_add(bps);
        out.push((address, bps));
    }
    if total > crate::RATE_DENOMINATOR {
        return Err(PayoutError::Configuration(format!(
            "{} weights exceed 100%",
            field
        )));
    }
    Ok(out)
}

/// Convert the parsed v0 file into the runtime form, validating addresses
/// and rates.
pub fn runtime_from_v0(cfg: ConfigurationV0) -> Result<RuntimeConfiguration> {
    let baker = parse_address("baker", &cfg.baker)?;

    if !(0.0..=1.0).contains(&cfg.payouts.fee) {
        return Err(PayoutError::Configuration(format!(
            "baker fee {} out of range [0, 1]",
            cfg.payouts.fee
        )));
    }

    let mut overrides: BTreeMap<Address, RuntimeDelegatorOverride> = BTreeMap::new();
    for (raw, ov) in &cfg.delegators.overrides {
        let delegator = parse_address("delegators.overrides", raw)?;
        let recipient = match &ov.recipient {
            Some(r) => Some(parse_address("delegators.overrides.recipient", r)?),
            None => None,
        };
        overrides.insert(
            delegator,
            RuntimeDelegatorOverride {
                recipient,
                fee_bps: ov.fee.map(rate_to_bps),
                minimum_balance: ov.minimum_balance.map(tez_to_mutez),
                maximum_balance: ov.maximum_balance.map(tez_to_mutez),
                baker_pays_tx_fee: ov.baker_pays_transaction_fee,
                baker_pays_allocation_fee: ov.baker_pays_allocation_fee,
            },
        );
    }

    // group fee overrides fill gaps left by explicit per-delegator fees
    for (raw_rate, addresses) in &cfg.delegators.fee_overrides {
        let rate: f64 = raw_rate.parse().map_err(|_| {
            PayoutError::Configuration(format!("invalid fee_overrides rate '{}'", raw_rate))
        })?;
        let fee_bps = rate_to_bps(rate);
        for raw in addresses {
            let delegator = parse_address("delegators.fee_overrides", raw)?;
            let entry = overrides
                .entry(delegator)
                .or_insert_with(|| RuntimeDelegatorOverride {
                    recipient: None,
                    fee_bps: None,
                    minimum_balance: None,
                    maximum_balance: None,
                    baker_pays_tx_fee: None,
                    baker_pays_allocation_fee: None,
                });
            if entry.fee_bps.is_none() {
                entry.fee_bps = Some(fee_bps);
            }
        }
    }

    let mut ignore = Vec::with_capacity(cfg.delegators.ignore.len());
    for raw in &cfg.delegators.ignore {
        ignore.push(parse_address("delegators.ignore", raw)?);
    }

    let donate = cfg.income_recipients.donate.map(rate_to_bps).unwrap_or(0);
    let donations = weights_to_bps("income_recipients.donations", &cfg.income_recipients.donations)?;
    let donate_bonds_bps = cfg
        .income_recipients
        .donate_bonds
        .map(rate_to_bps)
        .unwrap_or(donate);
    let donate_fees_bps = cfg
        .income_recipients
        .donate_fees
        .map(rate_to_bps)
        .unwrap_or(donate);
    if (donate_bonds_bps > 0 || donate_fees_bps > 0) && donations.is_empty() {
        log::warn!("donation rate configured without donation recipients; donations are kept by the baker");
    }

    Ok(RuntimeConfiguration {
        baker,
        payouts: RuntimePayoutConfiguration {
            wallet_mode: cfg.payouts.wallet_mode,
            fee_bps: rate_to_bps(cfg.payouts.fee),
            baker_pays_tx_fee: cfg.payouts.baker_pays_transaction_fee,
            baker_pays_allocation_fee: cfg.payouts.baker_pays_allocation_fee,
            minimum_amount: tez_to_mutez(cfg.payouts.minimum_payout_amount),
            ignore_empty_accounts: cfg.payouts.ignore_empty_accounts,
            gas_limit_buffer: cfg
                .payouts
                .transaction_gas_limit_buffer
                .unwrap_or(crate::DEFAULT_TX_GAS_LIMIT_BUFFER),
            deserialization_gas_buffer: cfg
                .payouts
                .transaction_deserialization_gas_buffer
                .unwrap_or(crate::DEFAULT_TX_DESERIALIZATION_GAS_BUFFER),
            fee_buffer: cfg
                .payouts
                .transaction_fee_buffer
                .map(|v| v as u128)
                .unwrap_or(crate::DEFAULT_TX_FEE_BUFFER),
            kt_fee_buffer: cfg
                .payouts
                .kt_transaction_fee_buffer
                .map(|v| v as u128)
                .unwrap_or(crate::DEFAULT_KT_TX_FEE_BUFFER),
        },
        delegators: RuntimeDelegatorsConfiguration {
            minimum_balance: tez_to_mutez(cfg.delegators.requirements.minimum_balance),
            below_minimum_reward_destination: cfg
                .delegators
                .requirements
                .below_minimum_reward_destination,
            ignore,
            overrides,
        },
        income_recipients: RuntimeIncomeRecipients {
            bonds: weights_to_bps("income_recipients.bonds", &cfg.income_recipients.bonds)?,
            fees: weights_to_bps("income_recipients.fees", &cfg.income_recipients.fees)?,
            donate_bonds_bps,
            donate_fees_bps,
            donations,
        },
        network: RuntimeNetworkConfiguration {
            rpc_url: cfg.network.rpc_url,
            indexer_url: cfg.network.indexer_url,
            explorer_url: cfg.network.explorer_url,
            ignore_kt: cfg.network.ignore_kt,
        },
        notifications: cfg
            .notifications
            .iter()
            .map(|n| RuntimeNotificatorConfiguration {
                kind: n.kind.clone(),
                is_admin: n.admin,
                url: n.url.clone(),
            })
            .collect(),
        extensions: cfg.extensions,
    })
}

/// Apply in-place migrations to an older config file body. Returns the
/// migrated body and whether anything changed.
fn migrate(source: &str, version: u32) -> Result<(String, bool)> {
    if version > CURRENT_CONFIG_VERSION {
        return Err(PayoutError::Configuration(format!(
            "configuration version {} is newer than supported ({})",
            version, CURRENT_CONFIG_VERSION
        )));
    }
    match version {
        /* future migrations go here */
        _ => Ok((source.to_string(), false)),
    }
}

#[derive(Deserialize)]
struct VersionProbe {
    #[serde(default)]
    config_version: u32,
}

/// Parse a configuration body, applying migrations. Returns the runtime
/// configuration and the migrated body when a rewrite is needed.
pub fn parse_configuration(source: &str) -> Result<(RuntimeConfiguration, Option<String>)> {
    let probe: VersionProbe = toml::from_str(source)
        .map_err(|e| PayoutError::Configuration(format!("failed to parse configuration: {}", e)))?;
    let (migrated, changed) = migrate(source, probe.config_version)?;
    let cfg: ConfigurationV0 = toml::from_str(&migrated)
        .map_err(|e| PayoutError::Configuration(format!("failed to parse configuration: {}", e)))?;
    let runtime = runtime_from_v0(cfg)?;
    Ok((runtime, changed.then_some(migrated)))
}

/// Load the configuration from disk. A migrated file is persisted in place
/// with the original moved to `<path>.backup`.
pub fn load_configuration(path: &Path) -> Result<RuntimeConfiguration> {
    let source = std::fs::read_to_string(path).map_err(|e| {
        PayoutError::Configuration(format!("failed to read '{}': {}", path.display(), e))
    })?;
    let (runtime, migrated) = parse_configuration(&source)?;
    if let Some(body) = migrated {
        let backup = format!("{}{}", path.display(), CONFIG_FILE_BACKUP_SUFFIX);
        std::fs::rename(path, &backup).map_err(|e| {
            PayoutError::Configuration(format!("failed to back up configuration: {}", e))
        })?;
        std::fs::write(path, body).map_err(|e| {
            PayoutError::Configuration(format!("failed to write migrated configuration: {}", e))
        })?;
        log::info!("configuration migrated; original moved to {}", backup);
    }
    Ok(runtime)
}
