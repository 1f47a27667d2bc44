// Batch assembly and dry-run cost measurement. Packing is greedy
// first-fit over a stable recipe ordering; a batch is the largest prefix
// of the remaining sequence that fits under the per-operation gas and
// size caps. Failed chunk simulations are bisected until the failing
// singleton is isolated.

use std::collections::VecDeque;

use crate::address::Address;
use crate::candidate::SimulatedCandidate;
use crate::engines::{CollectorEngine, OpLimits};
use crate::enums::InvalidReason;
use crate::error::Result;
use crate::ops::Operation;
use crate::recipe::{PayoutRecipe, RecipeBatch};
use crate::{Mutez, HARD_GAS_LIMIT_PER_OPERATION, MAX_OPERATION_SIZE};

/// Candidates simulated per dry-run chunk before any bisection.
pub const SIMULATION_BATCH_SIZE: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct BatchingConfiguration {
    pub gas_cap: u64,
    pub size_cap: u64,
    pub mix_in_contract_calls: bool,
    pub mix_in_fa_transfers: bool,
}

impl Default for BatchingConfiguration {
    fn default() -> Self {
        BatchingConfiguration {
            gas_cap: HARD_GAS_LIMIT_PER_OPERATION,
            size_cap: MAX_OPERATION_SIZE,
            mix_in_contract_calls: false,
            mix_in_fa_transfers: false,
        }
    }
}

/// Stable packing order: kind priority first, then delegator address.
fn packing_order(a: &PayoutRecipe, b: &PayoutRecipe) -> std::cmp::Ordering {
    a.tx_kind
        .priority()
        .cmp(&b.tx_kind.priority())
        .then_with(|| a.delegator.cmp(&b.delegator))
}

/// Split valid recipes into batches under the configured caps. Invalid
/// recipes never enter a batch. Recipes without limits are skipped
/// defensively (the generator guarantees they do not occur).
pub fn split_into_batches(
    recipes: &[PayoutRecipe],
    config: &BatchingConfiguration,
) -> Vec<RecipeBatch> {
    let mut valid: Vec<PayoutRecipe> = recipes
        .iter()
        .filter(|r| r.is_valid && r.op_limits.is_some())
        .cloned()
        .collect();
    valid.sort_by(packing_order);

    // three independent packing lanes per the split policies
    let mut regular: Vec<PayoutRecipe> = Vec::new();
    let mut contract_calls: Vec<PayoutRecipe> = Vec::new();
    let mut fa_transfers: Vec<PayoutRecipe> = Vec::new();
    for recipe in valid {
        if recipe.tx_kind.is_fa() && !config.mix_in_fa_transfers {
            fa_transfers.push(recipe);
        } else if recipe.recipient.is_contract() && !config.mix_in_contract_calls {
            contract_calls.push(recipe);
        } else {
            regular.push(recipe);
        }
    }

    let mut batches = Vec::new();
    for lane in [regular, contract_calls, fa_transfers] {
        batches.extend(pack_lane(lane, config));
    }
    batches
}

fn pack_lane(lane: Vec<PayoutRecipe>, config: &BatchingConfiguration) -> Vec<RecipeBatch> {
    let mut batches = Vec::new();
    let mut current = RecipeBatch::default();
    let mut gas = 0u64;
    let mut size = 0u64;
    for recipe in lane {
        let limits = recipe.op_limits.unwrap_or_default();
        let fits = gas + limits.gas_limit <= config.gas_cap
            && size + limits.serialized_size <= config.size_cap;
        if !fits && !current.is_empty() {
            batches.push(std::mem::take(&mut current));
            gas = 0;
            size = 0;
        }
        gas += limits.gas_limit;
        size += limits.serialized_size;
        current.0.push(recipe);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Buffers applied on top of measured limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulationBuffers {
    pub gas_limit_buffer: u64,
    pub deserialization_gas_buffer: u64,
    pub fee_buffer: Mutez,
    pub kt_fee_buffer: Mutez,
}

fn buffered_limits(
    measured: &OpLimits,
    destination_is_contract: bool,
    buffers: &SimulationBuffers,
) -> OpLimits {
    OpLimits {
        gas_limit: measured.gas_limit
            + buffers.gas_limit_buffer
            + buffers.deserialization_gas_buffer,
        storage_limit: measured.storage_limit,
        transaction_fee: measured.transaction_fee
            + if destination_is_contract {
                buffers.kt_fee_buffer
            } else {
                buffers.fee_buffer
            },
        allocation_fee: measured.allocation_fee,
        serialized_size: measured.serialized_size,
    }
}

fn build_simulation_op(
    source: &Address,
    candidates: &[SimulatedCandidate],
    chunk: &[usize],
) -> Result<Operation> {
    let mut op = Operation::new().with_source(source.clone());
    for &index in chunk {
        op.add_transfer(&candidates[index])?;
    }
    Ok(op)
}

/// Measure per-candidate resource costs by dry-running chunks of transfer
/// contents. A failed chunk is bisected; a failing singleton is dropped as
/// FAILED_TO_ESTIMATE_TX_COSTS, everything else keeps assembling.
pub async fn measure_op_limits(
    collector: &dyn CollectorEngine,
    source: &Address,
    public_key: &str,
    candidates: &mut [SimulatedCandidate],
    buffers: &SimulationBuffers,
) -> Result<()> {
    let valid_indices: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_invalid() && c.bonded.bonds_amount > 0)
        .map(|(i, _)| i)
        .collect();

    let mut queue: VecDeque<Vec<usize>> = valid_indices
        .chunks(SIMULATION_BATCH_SIZE)
        .map(|c| c.to_vec())
        .collect();

    while let Some(chunk) = queue.pop_front() {
        if chunk.is_empty() {
            continue;
        }
        let op = build_simulation_op(source, candidates, &chunk)?;
        match collector.simulate(&op, public_key).await {
            Ok(result) => {
                for (position, &index) in chunk.iter().enumerate() {
                    let candidate = &mut candidates[index];
                    candidate.clear_batch_estimate_marker();
                    match result.limits.get(position) {
                        Some(measured) => {
                            let is_contract = candidate.bonded.candidate.recipient.is_contract();
                            candidate.op_limits =
                                Some(buffered_limits(measured, is_contract, buffers));
                        }
                        None => {
                            log::warn!(
                                "dry-run returned no limits for {}",
                                candidates[index].bonded.candidate.recipient
                            );
                            candidates[index].invalidate(InvalidReason::FailedEstimate);
                        }
                    }
                }
            }
            Err(err) if chunk.len() == 1 => {
                let candidate = &mut candidates[chunk[0]];
                log::warn!(
                    "failed to estimate costs of payout to {} - {}",
                    candidate.bonded.candidate.recipient,
                    err
                );
                candidate.invalidate(InvalidReason::FailedEstimate);
            }
            Err(err) => {
                log::debug!(
                    "dry-run of {} transfers failed, bisecting - {}",
                    chunk.len(),
                    err
                );
                for &index in &chunk {
                    candidates[index].invalidate(InvalidReason::FailedBatchEstimate);
                }
                let middle = chunk.len() / 2;
                let (left, right) = chunk.split_at(middle);
                queue.push_front(right.to_vec());
                queue.push_front(left.to_vec());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressKind;
    use crate::candidate::{BondedCandidate, PayoutCandidate};
    use crate::engines::{
        CycleData, HeadBlock, OperationStatus, SimulationResult,
    };
    use crate::enums::{PayoutKind, TxKind};
    use crate::error::{PayoutError, RpcErrorChain};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tz(seed: u8) -> Address {
        Address::from_payload(AddressKind::Tz1, &[seed; 20])
    }

    fn kt(seed: u8) -> Address {
        Address::from_payload(AddressKind::Kt1, &[seed; 20])
    }

    fn recipe(seed: u8, gas: u64, size: u64) -> PayoutRecipe {
        PayoutRecipe {
            delegator: tz(seed),
            recipient: tz(seed),
            kind: PayoutKind::DelegatorReward,
            tx_kind: TxKind::Tez,
            fa_contract: None,
            fa_token_id: None,
            delegated_balance: 0,
            amount: 100,
            fee_rate_bps: 0,
            fee: 0,
            op_limits: Some(OpLimits {
                gas_limit: gas,
                storage_limit: 0,
                transaction_fee: 100,
                allocation_fee: 0,
                serialized_size: size,
            }),
            note: String::new(),
            is_valid: true,
        }
    }

    #[test]
    fn test_batches_respect_gas_cap() {
        let config = BatchingConfiguration {
            gas_cap: 1_000,
            size_cap: 10_000,
            ..Default::default()
        };
        let recipes: Vec<PayoutRecipe> = (1..=5).map(|i| recipe(i, 400, 10)).collect();
        let batches = split_into_batches(&recipes, &config);
        // 2 per batch (800 gas), 5 recipes -> 3 batches
        assert_eq!(batches.len(), 3);
        for batch in &batches {
            assert!(batch.total_gas() <= 1_000);
        }
        let total: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total, 5);
    }

    #[test]
    fn test_batches_respect_size_cap() {
        let config = BatchingConfiguration {
            gas_cap: 1_000_000,
            size_cap: 100,
            ..Default::default()
        };
        let recipes: Vec<PayoutRecipe> = (1..=4).map(|i| recipe(i, 10, 60)).collect();
        let batches = split_into_batches(&recipes, &config);
        assert_eq!(batches.len(), 4);
    }

    #[test]
    fn test_invalid_recipes_never_batched() {
        let mut bad = recipe(1, 10, 10);
        bad.is_valid = false;
        let mut no_limits = recipe(2, 10, 10);
        no_limits.op_limits = None;
        let batches = split_into_batches(
            &[bad, no_limits, recipe(3, 10, 10)],
            &BatchingConfiguration::default(),
        );
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
    }

    #[test]
    fn test_contract_calls_form_own_batches() {
        let mut sc = recipe(1, 10, 10);
        sc.recipient = kt(1);
        let plain = recipe(2, 10, 10);
        let batches =
            split_into_batches(&[sc.clone(), plain.clone()], &BatchingConfiguration::default());
        assert_eq!(batches.len(), 2);

        let mixed = split_into_batches(
            &[sc, plain],
            &BatchingConfiguration {
                mix_in_contract_calls: true,
                ..Default::default()
            },
        );
        assert_eq!(mixed.len(), 1);
    }

    #[test]
    fn test_fa_transfers_form_own_batches() {
        let mut fa = recipe(1, 10, 10);
        fa.tx_kind = TxKind::Fa2;
        fa.fa_contract = Some(kt(7));
        fa.fa_token_id = Some(0);
        let plain = recipe(2, 10, 10);
        let batches =
            split_into_batches(&[fa.clone(), plain.clone()], &BatchingConfiguration::default());
        assert_eq!(batches.len(), 2);

        let mixed = split_into_batches(
            &[fa, plain],
            &BatchingConfiguration {
                mix_in_fa_transfers: true,
                ..Default::default()
            },
        );
        assert_eq!(mixed.len(), 1);
    }

    #[test]
    fn test_packing_order_is_stable() {
        let recipes = vec![recipe(3, 10, 10), recipe(1, 10, 10), recipe(2, 10, 10)];
        let batches = split_into_batches(&recipes, &BatchingConfiguration::default());
        let delegators: Vec<String> = batches[0]
            .0
            .iter()
            .map(|r| r.delegator.to_string())
            .collect();
        let mut sorted = delegators.clone();
        sorted.sort();
        assert_eq!(delegators, sorted);
    }

    // Collector that fails whole-chunk dry-runs containing a poisoned
    // destination, succeeds otherwise.
    struct BisectingCollector {
        poisoned: Address,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CollectorEngine for BisectingCollector {
        fn id(&self) -> &'static str {
            "bisecting-test-collector"
        }
        async fn get_head(&self) -> Result<HeadBlock> {
            unimplemented!()
        }
        async fn get_current_cycle(&self) -> Result<i64> {
            unimplemented!()
        }
        async fn get_cycle_data(&self, _baker: &Address, _cycle: i64) -> Result<CycleData> {
            unimplemented!()
        }
        async fn was_operation_applied(&self, _op_hash: &str) -> Result<OperationStatus> {
            unimplemented!()
        }
        async fn get_branch(&self, _offset: i64) -> Result<String> {
            Ok("BL1".to_string())
        }
        async fn simulate(&self, op: &Operation, _public_key: &str) -> Result<SimulationResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if op.contents.iter().any(|c| c.destination == self.poisoned) {
                return Err(PayoutError::Simulation(RpcErrorChain::plain(
                    "script rejected",
                )));
            }
            Ok(SimulationResult {
                limits: op
                    .contents
                    .iter()
                    .map(|_| OpLimits {
                        gas_limit: 1_000,
                        storage_limit: 0,
                        transaction_fee: 300,
                        allocation_fee: 0,
                        serialized_size: 120,
                    })
                    .collect(),
            })
        }
        async fn get_balance(&self, _address: &Address) -> Result<Mutez> {
            unimplemented!()
        }
    }

    fn simulated(seed: u8) -> SimulatedCandidate {
        SimulatedCandidate {
            bonded: BondedCandidate {
                candidate: PayoutCandidate {
                    source: tz(seed),
                    recipient: tz(seed),
                    delegated_balance: 1_000,
                    fee_rate_bps: 0,
                    tx_kind: TxKind::Tez,
                    fa_contract: None,
                    fa_token_id: None,
                    baker_pays_tx_fee: true,
                    baker_pays_allocation_fee: true,
                    is_invalid: false,
                    invalid_because: None,
                },
                bonds_amount: 10_000,
                fee: 0,
            },
            op_limits: None,
        }
    }

    #[tokio::test]
    async fn test_bisection_isolates_failing_candidate() {
        let poisoned = tz(3);
        let collector = BisectingCollector {
            poisoned: poisoned.clone(),
            calls: AtomicUsize::new(0),
        };
        let mut candidates: Vec<SimulatedCandidate> = (1..=6).map(simulated).collect();
        let buffers = SimulationBuffers {
            gas_limit_buffer: 100,
            deserialization_gas_buffer: 5,
            fee_buffer: 10,
            kt_fee_buffer: 200,
        };
        measure_op_limits(&collector, &tz(99), "edpk-test", &mut candidates, &buffers)
            .await
            .unwrap();

        for candidate in &candidates {
            if candidate.bonded.candidate.recipient == poisoned {
                assert!(candidate.is_invalid());
                assert_eq!(
                    candidate.bonded.candidate.invalid_because,
                    Some(InvalidReason::FailedEstimate)
                );
                assert!(candidate.op_limits.is_none());
            } else {
                assert!(!candidate.is_invalid(), "bisection must clear temp markers");
                let limits = candidate.op_limits.expect("limits measured");
                assert_eq!(limits.gas_limit, 1_105);
                assert_eq!(limits.transaction_fee, 310);
            }
        }
        assert!(collector.calls.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_invalid_candidates_are_not_simulated() {
        let collector = BisectingCollector {
            poisoned: tz(200),
            calls: AtomicUsize::new(0),
        };
        let mut candidates = vec![simulated(1)];
        candidates[0].invalidate(InvalidReason::LowBalance);
        measure_op_limits(
            &collector,
            &tz(99),
            "edpk-test",
            &mut candidates,
            &SimulationBuffers::default(),
        )
        .await
        .unwrap();
        assert_eq!(collector.calls.load(Ordering::SeqCst), 0);
        assert!(candidates[0].op_limits.is_none());
    }
}
