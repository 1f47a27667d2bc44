// Operation model. An operation is an ordered group of transfer contents
// sharing one branch, source, and signature; transfers are either plain
// tez moves or FA1.2/FA2 contract calls.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::engines::{DispatchOptions, OpLimits, OpResult, TransactorEngine};
use crate::enums::TxKind;
use crate::error::{PayoutError, Result};
use crate::Mutez;

/// Watermark prepended to signing bytes of manager operations.
const OPERATION_WATERMARK: u8 = 0x03;

/// Anything that can be injected into an operation as a transfer.
pub trait TransferArgs {
    fn tx_kind(&self) -> TxKind;
    fn destination(&self) -> &Address;
    fn amount(&self) -> Mutez;
    fn fa_contract(&self) -> Option<&Address>;
    fn fa_token_id(&self) -> Option<u64>;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TransferContents {
    pub kind: TxKind,
    pub destination: Address,
    pub amount: Mutez,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fa_contract: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fa_token_id: Option<u64>,
    #[serde(default)]
    pub fee: Mutez,
    #[serde(default)]
    pub gas_limit: u64,
    #[serde(default)]
    pub storage_limit: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Operation {
    pub source: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default)]
    pub ttl: u64,
    pub contents: Vec<TransferContents>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Operation {
    pub fn new() -> Operation {
        Operation::default()
    }

    pub fn with_source(mut self, source: Address) -> Operation {
        self.source = Some(source);
        self
    }

    pub fn with_ttl(mut self, ttl: u64) -> Operation {
        self.ttl = ttl;
        self
    }

    /// Append a transfer. FA transfers must name a token contract.
    pub fn add_transfer(&mut self, args: &dyn TransferArgs) -> Result<()> {
        let fa_contract = match args.tx_kind() {
            TxKind::Tez => None,
            TxKind::Fa12 | TxKind::Fa2 => match args.fa_contract() {
                Some(contract) => Some(contract.clone()),
                None => {
                    return Err(PayoutError::Input(
                        "invalid contract address for FA transfer".to_string(),
                    ))
                }
            },
        };
        self.contents.push(TransferContents {
            kind: args.tx_kind(),
            destination: args.destination().clone(),
            amount: args.amount(),
            fa_contract,
            fa_token_id: args.fa_token_id(),
            fee: 0,
            gas_limit: 0,
            storage_limit: 0,
        });
        Ok(())
    }

    /// Apply measured limits to a content by index.
    pub fn apply_limits(&mut self, index: usize, limits: &OpLimits) {
        if let Some(content) = self.contents.get_mut(index) {
            content.fee = limits.transaction_fee;
            content.gas_limit = limits.gas_limit;
            content.storage_limit = limits.storage_limit;
        }
    }

    /// Bytes covered by the signature: watermark + canonical JSON of the
    /// envelope without the signature field.
    pub fn to_signing_bytes(&self) -> Vec<u8> {
        let unsigned = Operation {
            source: self.source.clone(),
            branch: self.branch.clone(),
            ttl: self.ttl,
            contents: self.contents.clone(),
            signature: None,
        };
        let mut bytes = vec![OPERATION_WATERMARK];
        // struct-to-JSON cannot fail for this shape
        bytes.extend_from_slice(serde_json::to_vec(&unsigned).unwrap_or_default().as_slice());
        bytes
    }

    /// Serialized operation size in bytes.
    pub fn serialized_size(&self) -> u64 {
        serde_json::to_vec(self).map(|v| v.len() as u64).unwrap_or(0)
    }

    pub fn total_gas(&self) -> u64 {
        self.contents.iter().map(|c| c.gas_limit).sum()
    }
}

/// Couples a built operation with the transactor that dispatches it.
pub struct OpExecutionContext {
    pub op: Operation,
    result: Option<Box<dyn OpResult>>,
}

impl OpExecutionContext {
    pub fn new(op: Operation) -> OpExecutionContext {
        OpExecutionContext { op, result: None }
    }

    pub fn op_hash(&self) -> String {
        match &self.result {
            Some(result) => result.op_hash(),
            None => String::new(),
        }
    }

    pub async fn dispatch(
        &mut self,
        transactor: &dyn TransactorEngine,
        options: &DispatchOptions,
    ) -> Result<()> {
        let result = transactor.dispatch(&self.op, options).await?;
        self.result = Some(result);
        Ok(())
    }

    pub async fn wait_for_apply(&self) -> Result<()> {
        match &self.result {
            Some(result) => result.wait_for_apply().await,
            None => Err(PayoutError::Dispatch(
                "operation was not dispatched yet".to_string(),
            )),
        }
    }
}
