// The default Collector: ledger RPC for chain state and dry-runs, the
// indexer for cycle accounting and operation status.

use async_trait::async_trait;

use bakerpay_core::address::Address;
use bakerpay_core::engines::{
    CollectorEngine, CycleData, HeadBlock, OperationStatus, SimulationResult,
};
use bakerpay_core::error::Result;
use bakerpay_core::ops::Operation;
use bakerpay_core::Mutez;

use crate::indexer::IndexerClient;
use crate::rpc::LedgerRpcClient;

pub struct DefaultCollector {
    rpc: LedgerRpcClient,
    indexer: IndexerClient,
}

impl DefaultCollector {
    /// Connects both clients and verifies the RPC is reachable.
    pub async fn connect(rpc_url: &str, indexer_url: &str) -> Result<DefaultCollector> {
        let rpc = LedgerRpcClient::new(rpc_url);
        let chain_id = rpc.get_chain_id().await?;
        log::debug!("collector connected to chain {}", chain_id);
        Ok(DefaultCollector {
            rpc,
            indexer: IndexerClient::new(indexer_url),
        })
    }
}

#[async_trait]
impl CollectorEngine for DefaultCollector {
    fn id(&self) -> &'static str {
        "default-rpc-and-indexer-collector"
    }

    async fn get_head(&self) -> Result<HeadBlock> {
        self.rpc.get_head().await
    }

    async fn get_current_cycle(&self) -> Result<i64> {
        Ok(self.rpc.get_head().await?.cycle)
    }

    async fn get_cycle_data(&self, baker: &Address, cycle: i64) -> Result<CycleData> {
        self.indexer.get_cycle_data(baker, cycle).await
    }

    async fn was_operation_applied(&self, op_hash: &str) -> Result<OperationStatus> {
        self.indexer.was_operation_applied(op_hash).await
    }

    async fn get_branch(&self, offset: i64) -> Result<String> {
        self.rpc.get_block_hash(offset).await
    }

    async fn simulate(&self, op: &Operation, _public_key: &str) -> Result<SimulationResult> {
        // dry-runs need a valid branch even though they are not injected
        let mut op = op.clone();
        if op.branch.is_none() {
            op.branch = Some(self.rpc.get_block_hash(0).await?);
        }
        self.rpc.run_operation(&op).await
    }

    async fn get_balance(&self, address: &Address) -> Result<Mutez> {
        self.rpc.get_contract_balance(address).await
    }
}
