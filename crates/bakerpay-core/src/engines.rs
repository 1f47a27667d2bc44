// Engine interfaces consumed by the pipeline: Collector (ledger RPC +
// indexer), Signer, Transactor, and the hook dispatcher. The pipeline only
// ever talks to these traits; concrete backends live in other crates.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::address::Address;
use crate::enums::Hook;
use crate::error::{PayoutError, Result};
use crate::ops::Operation;
use crate::Mutez;

/// One delegator row of a cycle, as reported by the indexer.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DelegatorRecord {
    pub address: Address,
    pub delegated_balance: Mutez,
    #[serde(default)]
    pub staked_balance: Mutez,
    /// Account was emptied before the end of the cycle.
    #[serde(default)]
    pub is_emptied: bool,
}

/// On-chain accounting data of one completed reward cycle. Immutable after
/// collection.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CycleData {
    pub cycle: i64,
    pub staking_balance: Mutez,
    pub block_rewards: Mutez,
    pub endorsement_rewards: Mutez,
    pub block_fees: Mutez,
    pub delegators: Vec<DelegatorRecord>,
}

impl CycleData {
    pub fn earned_rewards(&self) -> Mutez {
        self.block_rewards + self.endorsement_rewards
    }

    pub fn earned_fees(&self) -> Mutez {
        self.block_fees
    }
}

/// Chain head snapshot used by the cycle monitor.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HeadBlock {
    pub hash: String,
    pub level: i64,
    pub cycle: i64,
    /// Blocks since the start of the current cycle.
    pub cycle_position: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Applied,
    Failed,
    Unknown,
}

/// Resource envelope measured for one transfer by a dry-run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpLimits {
    pub gas_limit: u64,
    pub storage_limit: u64,
    pub transaction_fee: Mutez,
    /// Storage burn charged when the destination account gets allocated.
    pub allocation_fee: Mutez,
    /// Serialized size of this content in bytes.
    pub serialized_size: u64,
}

impl OpLimits {
    /// Total cost the payer of transaction fees carries for this content.
    pub fn total_fee(&self) -> Mutez {
        self.transaction_fee + self.allocation_fee
    }
}

/// Per-content resource measurements of a successful dry-run; aligned by
/// index with the simulated operation's contents.
#[derive(Debug, Clone, Default)]
pub struct SimulationResult {
    pub limits: Vec<OpLimits>,
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    pub confirmations: u64,
    pub ttl: u64,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        DispatchOptions {
            confirmations: crate::DEFAULT_REQUIRED_CONFIRMATIONS,
            ttl: crate::DEFAULT_OPERATION_TTL,
        }
    }
}

/// Data-plane interface to chain state and the indexer.
#[async_trait]
pub trait CollectorEngine: Send + Sync {
    fn id(&self) -> &'static str;
    async fn get_head(&self) -> Result<HeadBlock>;
    async fn get_current_cycle(&self) -> Result<i64>;
    async fn get_last_completed_cycle(&self) -> Result<i64> {
        Ok(self.get_current_cycle().await? - 1)
    }
    async fn get_cycle_data(&self, baker: &Address, cycle: i64) -> Result<CycleData>;
    async fn was_operation_applied(&self, op_hash: &str) -> Result<OperationStatus>;
    /// Block hash `offset` blocks behind head, used as operation branch.
    async fn get_branch(&self, offset: i64) -> Result<String>;
    /// Dry-run the operation and measure per-content resource costs.
    async fn simulate(&self, op: &Operation, public_key: &str) -> Result<SimulationResult>;
    async fn get_balance(&self, address: &Address) -> Result<Mutez>;
}

/// Produces signatures for payout operations.
#[async_trait]
pub trait SignerEngine: Send + Sync {
    /// Address of the payout wallet.
    fn pkh(&self) -> Address;
    /// Public key in its textual form.
    fn public_key(&self) -> String;
    async fn sign(&self, op: &mut Operation) -> Result<()>;
}

/// Handle to a dispatched operation.
#[async_trait]
pub trait OpResult: Send + Sync {
    fn op_hash(&self) -> String;
    async fn wait_for_apply(&self) -> Result<()>;
}

/// Dispatches completed operations and tracks their confirmation.
#[async_trait]
pub trait TransactorEngine: Send + Sync {
    /// Fill in branch, TTL and any missing envelope fields.
    async fn complete(&self, op: &mut Operation, public_key: &str) -> Result<()>;
    async fn dispatch(
        &self,
        op: &Operation,
        options: &DispatchOptions,
    ) -> Result<Box<dyn OpResult>>;
}

/// Invokes registered extension hooks. `dispatch` returns the possibly
/// mutated payload for read-write hooks, `None` when nothing changed.
#[async_trait]
pub trait HookDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        hook: Hook,
        version: &str,
        data: serde_json::Value,
    ) -> Result<Option<serde_json::Value>>;
    /// Close extensions whose lifespan is scoped to the pipeline run.
    async fn close_scoped(&self);
    async fn close_all(&self);
}

/// Dispatcher used when no extensions are configured.
pub struct NoopHookDispatcher;

#[async_trait]
impl HookDispatcher for NoopHookDispatcher {
    async fn dispatch(
        &self,
        _hook: Hook,
        _version: &str,
        _data: serde_json::Value,
    ) -> Result<Option<serde_json::Value>> {
        Ok(None)
    }

    async fn close_scoped(&self) {}

    async fn close_all(&self) {}
}

/// Serialize hook data, run the dispatcher, and fold a mutated response
/// back into place.
pub async fn execute_hook<T>(
    hooks: &dyn HookDispatcher,
    hook: Hook,
    version: &str,
    data: &mut T,
) -> Result<()>
where
    T: Serialize + DeserializeOwned,
{
    let payload = serde_json::to_value(&*data).map_err(|e| PayoutError::Hook {
        hook: hook.to_string(),
        message: format!("failed to serialize hook data: {}", e),
    })?;
    if let Some(mutated) = hooks.dispatch(hook, version, payload).await? {
        *data = serde_json::from_value(mutated).map_err(|e| PayoutError::Hook {
            hook: hook.to_string(),
            message: format!("extension returned malformed data: {}", e),
        })?;
    }
    Ok(())
}

pub type AdminNotifier = Arc<dyn Fn(&str) + Send + Sync>;

pub fn noop_admin_notifier() -> AdminNotifier {
    Arc::new(|_msg: &str| {})
}

/// Engines consumed by the candidate-generation pipeline.
#[derive(Clone)]
pub struct GeneratePayoutsEngines {
    pub collector: Arc<dyn CollectorEngine>,
    pub signer: Arc<dyn SignerEngine>,
    pub hooks: Arc<dyn HookDispatcher>,
    pub admin_notify: AdminNotifier,
}

/// Engines consumed by payout preparation (report reconciliation).
#[derive(Clone)]
pub struct PreparePayoutsEngines {
    pub collector: Arc<dyn CollectorEngine>,
    pub admin_notify: AdminNotifier,
}

/// Engines consumed by the execution loop.
#[derive(Clone)]
pub struct ExecutePayoutsEngines {
    pub collector: Arc<dyn CollectorEngine>,
    pub signer: Arc<dyn SignerEngine>,
    pub transactor: Arc<dyn TransactorEngine>,
    pub admin_notify: AdminNotifier,
}

#[derive(Debug, Clone, Default)]
pub struct GeneratePayoutsOptions {
    pub cycle: i64,
    pub skip_balance_check: bool,
    pub wait_for_sufficient_balance: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutePayoutsOptions {
    /// Mix smart-contract call recipes into regular batches.
    pub mix_in_contract_calls: bool,
    /// Mix FA transfer recipes into regular batches.
    pub mix_in_fa_transfers: bool,
}
