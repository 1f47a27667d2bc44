// The default Transactor: completes operation envelopes, injects them,
// and tracks confirmation by polling the indexer against head progress.

use std::time::Duration;

use async_trait::async_trait;

use bakerpay_core::engines::{
    DispatchOptions, OpResult, OperationStatus, TransactorEngine,
};
use bakerpay_core::error::{PayoutError, Result};
use bakerpay_core::ops::Operation;
use bakerpay_core::{BRANCH_OFFSET, DEFAULT_OPERATION_TTL};

use crate::indexer::IndexerClient;
use crate::rpc::LedgerRpcClient;

const CONFIRMATION_POLL_SECS: u64 = 10;

pub struct DefaultTransactor {
    rpc: LedgerRpcClient,
    indexer: IndexerClient,
}

impl DefaultTransactor {
    pub async fn connect(rpc_url: &str, indexer_url: &str) -> Result<DefaultTransactor> {
        let rpc = LedgerRpcClient::new(rpc_url);
        let chain_id = rpc.get_chain_id().await?;
        log::debug!("transactor connected to chain {}", chain_id);
        Ok(DefaultTransactor {
            rpc,
            indexer: IndexerClient::new(indexer_url),
        })
    }
}

#[async_trait]
impl TransactorEngine for DefaultTransactor {
    async fn complete(&self, op: &mut Operation, _public_key: &str) -> Result<()> {
        if op.branch.is_none() {
            op.branch = Some(self.rpc.get_block_hash(BRANCH_OFFSET).await?);
        }
        if op.ttl == 0 {
            op.ttl = DEFAULT_OPERATION_TTL;
        }
        Ok(())
    }

    async fn dispatch(
        &self,
        op: &Operation,
        options: &DispatchOptions,
    ) -> Result<Box<dyn OpResult>> {
        let injected_at = self.rpc.get_head().await?.level;
        let op_hash = self.rpc.inject_operation(op).await?;
        log::debug!("operation {} injected at level {}", op_hash, injected_at);
        Ok(Box::new(DispatchResult {
            rpc: self.rpc.clone(),
            indexer: self.indexer.clone(),
            op_hash,
            injected_at,
            confirmations: options.confirmations,
            ttl: op.ttl.max(options.ttl),
        }))
    }
}

pub struct DispatchResult {
    rpc: LedgerRpcClient,
    indexer: IndexerClient,
    op_hash: String,
    injected_at: i64,
    confirmations: u64,
    ttl: u64,
}

#[async_trait]
impl OpResult for DispatchResult {
    fn op_hash(&self) -> String {
        self.op_hash.clone()
    }

    /// Poll until the operation is applied with enough confirmations, or
    /// fail once the TTL window has passed without it being applied.
    async fn wait_for_apply(&self) -> Result<()> {
        let mut applied_seen = false;
        loop {
            let head = self.rpc.get_head().await?;
            let status = self.indexer.was_operation_applied(&self.op_hash).await?;
            match status {
                OperationStatus::Applied => {
                    applied_seen = true;
                    if head.level >= self.injected_at + self.confirmations as i64 {
                        return Ok(());
                    }
                }
                OperationStatus::Failed => {
                    return Err(PayoutError::Confirmation(format!(
                        "operation {} failed on-chain",
                        self.op_hash
                    )));
                }
                OperationStatus::Unknown => {
                    if !applied_seen && head.level > self.injected_at + self.ttl as i64 {
                        return Err(PayoutError::Confirmation(format!(
                            "operation {} not applied within {} blocks",
                            self.op_hash, self.ttl
                        )));
                    }
                }
            }
            tokio::time::sleep(Duration::from_secs(CONFIRMATION_POLL_SECS)).await;
        }
    }
}
