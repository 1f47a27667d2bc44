// Ledger RPC client. Error bodies carry nested `id`/`description`/`data`
// payloads which are extracted for user presentation.

use serde_json::Value;

use bakerpay_core::engines::{HeadBlock, OpLimits, SimulationResult};
use bakerpay_core::error::{PayoutError, Result, RpcErrorChain, RpcErrorDetail};
use bakerpay_core::ops::Operation;
use bakerpay_core::{address::Address, Mutez};

/// Flat fee component of the operation fee model (mutez).
const MINIMAL_FEE: Mutez = 100;
/// Fee per gas unit, in mutez per 100 gas.
const FEE_PER_100_GAS: Mutez = 10;
/// Fee per serialized byte (mutez).
const FEE_PER_BYTE: Mutez = 1;
/// Storage burn for allocating a fresh destination account (mutez).
const ALLOCATION_BURN: Mutez = 64_250;

#[derive(Clone)]
pub struct LedgerRpcClient {
    base_url: String,
    http: reqwest::Client,
}

/// Parse the nested error objects a rejected RPC call carries in its body.
pub fn extract_rpc_errors(message: &str, body: &str) -> RpcErrorChain {
    let mut chain = RpcErrorChain::plain(message);
    let parsed: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return chain,
    };
    let entries = match &parsed {
        Value::Array(entries) => entries.clone(),
        Value::Object(_) => vec![parsed],
        _ => return chain,
    };
    for entry in entries {
        let id = entry["id"].as_str().unwrap_or_default();
        if id.is_empty() {
            continue;
        }
        chain.details.push(RpcErrorDetail {
            id: id.to_string(),
            description: entry["description"]
                .as_str()
                .or_else(|| entry["msg"].as_str())
                .unwrap_or_default()
                .to_string(),
            data: entry.get("data").cloned(),
        });
    }
    chain
}

/// Fee for one content under the ledger's flat fee model.
pub fn estimate_content_fee(gas: u64, size: u64) -> Mutez {
    MINIMAL_FEE + (gas as u128 / 100) * FEE_PER_100_GAS + size as u128 * FEE_PER_BYTE
}

impl LedgerRpcClient {
    pub fn new(base_url: &str) -> LedgerRpcClient {
        LedgerRpcClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| PayoutError::Collector(format!("GET {} failed: {}", path, e)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PayoutError::Collector(format!("GET {} failed: {}", path, e)))?;
        if !status.is_success() {
            return Err(PayoutError::Collector(
                extract_rpc_errors(&format!("GET {} returned {}", path, status), &body)
                    .to_string(),
            ));
        }
        serde_json::from_str(&body)
            .map_err(|e| PayoutError::Collector(format!("GET {}: malformed response: {}", path, e)))
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| PayoutError::Collector(format!("POST {} failed: {}", path, e)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PayoutError::Collector(format!("POST {} failed: {}", path, e)))?;
        if !status.is_success() {
            return Err(PayoutError::Simulation(extract_rpc_errors(
                &format!("POST {} returned {}", path, status),
                &body,
            )));
        }
        serde_json::from_str(&body).map_err(|e| {
            PayoutError::Collector(format!("POST {}: malformed response: {}", path, e))
        })
    }

    pub async fn get_chain_id(&self) -> Result<String> {
        let value = self.get("/chains/main/chain_id").await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PayoutError::Collector("chain_id is not a string".to_string()))
    }

    pub async fn get_head(&self) -> Result<HeadBlock> {
        let value = self.get("/chains/main/blocks/head").await?;
        let hash = value["hash"].as_str().unwrap_or_default().to_string();
        let level_info = &value["metadata"]["level_info"];
        let level = value["header"]["level"]
            .as_i64()
            .or_else(|| level_info["level"].as_i64())
            .ok_or_else(|| PayoutError::Collector("head block has no level".to_string()))?;
        let cycle = level_info["cycle"]
            .as_i64()
            .ok_or_else(|| PayoutError::Collector("head block has no cycle".to_string()))?;
        let cycle_position = level_info["cycle_position"].as_i64().unwrap_or(0);
        if hash.is_empty() {
            return Err(PayoutError::Collector("head block has no hash".to_string()));
        }
        Ok(HeadBlock {
            hash,
            level,
            cycle,
            cycle_position,
        })
    }

    pub async fn get_block_hash(&self, offset: i64) -> Result<String> {
        let path = if offset <= 0 {
            "/chains/main/blocks/head/hash".to_string()
        } else {
            format!("/chains/main/blocks/head~{}/hash", offset)
        };
        let value = self.get(&path).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PayoutError::Collector("block hash is not a string".to_string()))
    }

    pub async fn get_contract_balance(&self, address: &Address) -> Result<Mutez> {
        let value = self
            .get(&format!(
                "/chains/main/blocks/head/context/contracts/{}/balance",
                address
            ))
            .await?;
        value
            .as_str()
            .and_then(|s| s.parse::<u128>().ok())
            .ok_or_else(|| PayoutError::Collector("balance is not a mutez string".to_string()))
    }

    /// Dry-run the operation and derive per-content limits from the
    /// execution results.
    pub async fn run_operation(&self, op: &Operation) -> Result<SimulationResult> {
        let payload = serde_json::json!({ "operation": op });
        let value = self
            .post(
                "/chains/main/blocks/head/helpers/scripts/run_operation",
                &payload,
            )
            .await?;
        parse_run_operation_result(op, &value)
    }

    /// Broadcast a signed operation; returns the operation hash.
    pub async fn inject_operation(&self, op: &Operation) -> Result<String> {
        if op.signature.is_none() {
            return Err(PayoutError::Dispatch(
                "operation is not signed".to_string(),
            ));
        }
        let payload = serde_json::to_value(op)
            .map_err(|e| PayoutError::Dispatch(e.to_string()))?;
        let value = self
            .post("/injection/operation", &payload)
            .await
            .map_err(|e| match e {
                PayoutError::Simulation(chain) => PayoutError::Dispatch(chain.to_string()),
                other => other,
            })?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PayoutError::Dispatch("injection returned no op hash".to_string()))
    }
}

pub fn parse_run_operation_result(op: &Operation, value: &Value) -> Result<SimulationResult> {
    let contents = value["contents"].as_array().cloned().unwrap_or_default();
    if contents.len() != op.contents.len() {
        return Err(PayoutError::Simulation(RpcErrorChain::plain(format!(
            "dry-run returned {} results for {} contents",
            contents.len(),
            op.contents.len()
        ))));
    }
    let mut limits = Vec::with_capacity(contents.len());
    for (content, result) in op.contents.iter().zip(contents.iter()) {
        let operation_result = &result["metadata"]["operation_result"];
        let status = operation_result["status"].as_str().unwrap_or("failed");
        if status != "applied" {
            let errors = operation_result["errors"].clone();
            return Err(PayoutError::Simulation(extract_rpc_errors(
                &format!("dry-run content status '{}'", status),
                &errors.to_string(),
            )));
        }
        let gas = operation_result["consumed_milligas"]
            .as_str()
            .and_then(|s| s.parse::<u64>().ok())
            .map(|milligas| milligas.div_ceil(1_000))
            .unwrap_or(0);
        let storage = operation_result["paid_storage_size_diff"]
            .as_str()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        let allocated = operation_result["allocated_destination_contract"]
            .as_bool()
            .unwrap_or(false);
        let size = serde_json::to_vec(content).map(|v| v.len() as u64).unwrap_or(0);
        limits.push(OpLimits {
            gas_limit: gas,
            storage_limit: storage,
            transaction_fee: estimate_content_fee(gas, size),
            allocation_fee: if allocated { ALLOCATION_BURN } else { 0 },
            serialized_size: size,
        });
    }
    Ok(SimulationResult { limits })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bakerpay_core::address::AddressKind;
    use bakerpay_core::enums::TxKind;
    use bakerpay_core::ops::TransferContents;

    fn tz(seed: u8) -> Address {
        Address::from_payload(AddressKind::Tz1, &[seed; 20])
    }

    fn op_with_contents(count: usize) -> Operation {
        let mut op = Operation::new().with_source(tz(1));
        for i in 0..count {
            op.contents.push(TransferContents {
                kind: TxKind::Tez,
                destination: tz(10 + i as u8),
                amount: 1_000,
                fa_contract: None,
                fa_token_id: None,
                fee: 0,
                gas_limit: 0,
                storage_limit: 0,
            });
        }
        op
    }

    #[test]
    fn test_extract_nested_rpc_errors() {
        let body = r#"[{"id":"proto.alpha.contract.balance_too_low","description":"balance lower than requested","data":{"balance":"100"}}]"#;
        let chain = extract_rpc_errors("run_operation returned 500", body);
        assert_eq!(chain.details.len(), 1);
        assert_eq!(chain.details[0].id, "proto.alpha.contract.balance_too_low");
        assert!(chain.to_string().contains("balance lower than requested"));
    }

    #[test]
    fn test_extract_errors_from_garbage_body() {
        let chain = extract_rpc_errors("boom", "<html>not json</html>");
        assert!(chain.details.is_empty());
        assert_eq!(chain.to_string(), "boom");
    }

    #[test]
    fn test_parse_run_operation_applied() {
        let op = op_with_contents(2);
        let value = serde_json::json!({
            "contents": [
                {"metadata": {"operation_result": {
                    "status": "applied",
                    "consumed_milligas": "1420500",
                    "allocated_destination_contract": true
                }}},
                {"metadata": {"operation_result": {
                    "status": "applied",
                    "consumed_milligas": "169000"
                }}}
            ]
        });
        let result = parse_run_operation_result(&op, &value).unwrap();
        assert_eq!(result.limits.len(), 2);
        assert_eq!(result.limits[0].gas_limit, 1_421);
        assert_eq!(result.limits[0].allocation_fee, ALLOCATION_BURN);
        assert_eq!(result.limits[1].gas_limit, 169);
        assert_eq!(result.limits[1].allocation_fee, 0);
        let size = result.limits[1].serialized_size;
        assert_eq!(
            result.limits[1].transaction_fee,
            estimate_content_fee(169, size)
        );
    }

    #[test]
    fn test_parse_run_operation_failed_content() {
        let op = op_with_contents(1);
        let value = serde_json::json!({
            "contents": [
                {"metadata": {"operation_result": {
                    "status": "failed",
                    "errors": [{"id": "proto.alpha.gas_exhausted", "description": "gas exhausted"}]
                }}}
            ]
        });
        let err = parse_run_operation_result(&op, &value).unwrap_err();
        assert!(err.to_string().contains("gas_exhausted"));
    }

    #[test]
    fn test_result_count_mismatch_is_an_error() {
        let op = op_with_contents(2);
        let value = serde_json::json!({"contents": []});
        assert!(parse_run_operation_result(&op, &value).is_err());
    }
}
