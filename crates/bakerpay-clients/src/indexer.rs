// Indexer client: cycle accounting data and operation status lookups.

use serde_json::Value;

use bakerpay_core::address::Address;
use bakerpay_core::engines::{CycleData, DelegatorRecord, OperationStatus};
use bakerpay_core::error::{PayoutError, Result};
use bakerpay_core::Mutez;

#[derive(Clone)]
pub struct IndexerClient {
    base_url: String,
    http: reqwest::Client,
}

fn mutez_field(value: &Value, field: &str) -> Mutez {
    value[field]
        .as_u64()
        .map(|v| v as u128)
        .or_else(|| value[field].as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0)
}

pub fn parse_cycle_data(cycle: i64, value: &Value) -> Result<CycleData> {
    let mut delegators = Vec::new();
    for entry in value["delegators"].as_array().cloned().unwrap_or_default() {
        let raw = entry["address"].as_str().unwrap_or_default();
        let address = Address::parse(raw).map_err(|e| {
            PayoutError::Collector(format!("indexer returned invalid delegator '{}': {}", raw, e))
        })?;
        delegators.push(DelegatorRecord {
            address,
            delegated_balance: mutez_field(&entry, "balance"),
            staked_balance: mutez_field(&entry, "stakedBalance"),
            is_emptied: entry["emptied"].as_bool().unwrap_or(false),
        });
    }
    Ok(CycleData {
        cycle,
        staking_balance: mutez_field(value, "stakingBalance"),
        block_rewards: mutez_field(value, "blockRewards"),
        endorsement_rewards: mutez_field(value, "endorsementRewards"),
        block_fees: mutez_field(value, "blockFees"),
        delegators,
    })
}

impl IndexerClient {
    pub fn new(base_url: &str) -> IndexerClient {
        IndexerClient {
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
        if !status.is_success() {
            return Err(PayoutError::Collector(format!(
                "GET {} returned {}",
                path, status
            )));
        }
        response
            .json()
            .await
            .map_err(|e| PayoutError::Collector(format!("GET {}: malformed response: {}", path, e)))
    }

    pub async fn get_cycle_data(&self, baker: &Address, cycle: i64) -> Result<CycleData> {
        let value = self
            .get(&format!("/v1/rewards/split/{}/{}", baker, cycle))
            .await?;
        parse_cycle_data(cycle, &value)
    }

    pub async fn was_operation_applied(&self, op_hash: &str) -> Result<OperationStatus> {
        let value = self
            .get(&format!("/v1/operations/{}/status", op_hash))
            .await?;
        Ok(match value["status"].as_str() {
            Some("applied") => OperationStatus::Applied,
            Some("failed") | Some("backtracked") | Some("skipped") => OperationStatus::Failed,
            _ => OperationStatus::Unknown,
        })
    }
}
