// End-to-end payout pipeline scenarios driven through mock chain engines
// and a real signer: generate -> prepare -> execute, including crash
// recovery and operator interruption.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bakerpay_clients::InMemorySigner;
use bakerpay_core::address::{Address, AddressKind};
use bakerpay_core::engines::{
    CollectorEngine, CycleData, DelegatorRecord, DispatchOptions, ExecutePayoutsEngines,
    ExecutePayoutsOptions, GeneratePayoutsEngines, GeneratePayoutsOptions, HeadBlock,
    NoopHookDispatcher, OpLimits, OpResult, OperationStatus, SimulationResult, TransactorEngine,
};
use bakerpay_core::enums::PayoutKind;
use bakerpay_core::error::{PayoutError, Result};
use bakerpay_core::execute::{execute_payouts, BatchStatus};
use bakerpay_core::generate::generate_payouts;
use bakerpay_core::ops::Operation;
use bakerpay_core::prepare::prepare_payouts;
use bakerpay_core::protected::ProtectedSection;
use bakerpay_core::recipe::{CyclePayoutBlueprint, PayoutRecipe};
use bakerpay_core::report::PayoutReport;
use bakerpay_core::reports_store::{FsReporter, ReporterEngine};
use bakerpay_core::config::{parse_configuration, RuntimeConfiguration};
use bakerpay_core::{Mutez, HARD_GAS_LIMIT_PER_OPERATION};

const SEED_HEX: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
const CYCLE: i64 = 530;

fn tz(seed: u8) -> Address {
    Address::from_payload(AddressKind::Tz1, &[seed; 20])
}

fn baker() -> Address {
    tz(251)
}

struct TestCollector {
    cycle_data: CycleData,
    simulated_gas: u64,
}

#[async_trait]
impl CollectorEngine for TestCollector {
    fn id(&self) -> &'static str {
        "test-collector"
    }
    async fn get_head(&self) -> Result<HeadBlock> {
        Ok(HeadBlock {
            hash: "BLhead".to_string(),
            level: 100_000,
            cycle: CYCLE + 1,
            cycle_position: 10,
        })
    }
    async fn get_current_cycle(&self) -> Result<i64> {
        Ok(CYCLE + 1)
    }
    async fn get_cycle_data(&self, _baker: &Address, cycle: i64) -> Result<CycleData> {
        let mut data = self.cycle_data.clone();
        data.cycle = cycle;
        Ok(data)
    }
    async fn was_operation_applied(&self, _op_hash: &str) -> Result<OperationStatus> {
        Ok(OperationStatus::Applied)
    }
    async fn get_branch(&self, _offset: i64) -> Result<String> {
        Ok("BLbranch".to_string())
    }
    async fn simulate(&self, op: &Operation, _public_key: &str) -> Result<SimulationResult> {
        Ok(SimulationResult {
            limits: op
                .contents
                .iter()
                .map(|_| OpLimits {
                    gas_limit: self.simulated_gas,
                    storage_limit: 0,
                    transaction_fee: 300,
                    allocation_fee: 0,
                    serialized_size: 120,
                })
                .collect(),
        })
    }
    async fn get_balance(&self, _address: &Address) -> Result<Mutez> {
        Ok(u64::MAX as u128)
    }
}

struct TestOpResult {
    hash: String,
    fail_confirm: bool,
}

#[async_trait]
impl OpResult for TestOpResult {
    fn op_hash(&self) -> String {
        self.hash.clone()
    }
    async fn wait_for_apply(&self) -> Result<()> {
        if self.fail_confirm {
            Err(PayoutError::Confirmation("not applied within ttl".into()))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct TestTransactor {
    dispatches: AtomicUsize,
    fail_confirm_at: Option<usize>,
}

#[async_trait]
impl TransactorEngine for TestTransactor {
    async fn complete(&self, op: &mut Operation, _public_key: &str) -> Result<()> {
        op.branch = Some("BLbranch".to_string());
        Ok(())
    }
    async fn dispatch(
        &self,
        _op: &Operation,
        _options: &DispatchOptions,
    ) -> Result<Box<dyn OpResult>> {
        let index = self.dispatches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TestOpResult {
            hash: format!("oo{}", index + 1),
            fail_confirm: self.fail_confirm_at == Some(index),
        }))
    }
}

fn config_toml(minimum_balance_tez: f64) -> String {
    format!(
        r#"
config_version = 0
baker = "{}"

[payouts]
fee = 0.05
baker_pays_transaction_fee = true
baker_pays_allocation_fee = true
minimum_payout_amount = 0.001

[delegators.requirements]
minimum_balance = {}
"#,
        baker(),
        minimum_balance_tez
    )
}

fn config(minimum_balance_tez: f64) -> RuntimeConfiguration {
    parse_configuration(&config_toml(minimum_balance_tez)).unwrap().0
}

fn cycle_data(delegators: &[(u8, Mutez)], staking: Mutez, rewards: Mutez) -> CycleData {
    CycleData {
        cycle: CYCLE,
        staking_balance: staking,
        block_rewards: rewards,
        endorsement_rewards: 0,
        block_fees: 0,
        delegators: delegators
            .iter()
            .map(|(seed, balance)| DelegatorRecord {
                address: tz(*seed),
                delegated_balance: *balance,
                staked_balance: 0,
                is_emptied: false,
            })
            .collect(),
    }
}

fn signer() -> Arc<InMemorySigner> {
    Arc::new(InMemorySigner::from_key(SEED_HEX).unwrap())
}

fn generation_engines(collector: Arc<TestCollector>) -> GeneratePayoutsEngines {
    GeneratePayoutsEngines {
        collector,
        signer: signer(),
        hooks: Arc::new(NoopHookDispatcher),
        admin_notify: Arc::new(|_| {}),
    }
}

async fn generate(
    cfg: RuntimeConfiguration,
    collector: Arc<TestCollector>,
) -> CyclePayoutBlueprint {
    generate_payouts(
        cfg,
        generation_engines(collector),
        &GeneratePayoutsOptions {
            cycle: CYCLE,
            skip_balance_check: false,
            wait_for_sufficient_balance: false,
        },
    )
    .await
    .unwrap()
}

fn execution_engines(
    collector: Arc<TestCollector>,
    transactor: Arc<TestTransactor>,
) -> ExecutePayoutsEngines {
    ExecutePayoutsEngines {
        collector,
        signer: signer(),
        transactor,
        admin_notify: Arc::new(|_| {}),
    }
}

// Scenario: single eligible delegator, TEZ only.
#[tokio::test]
async fn single_delegator_full_pipeline() {
    let collector = Arc::new(TestCollector {
        cycle_data: cycle_data(&[(1, 1_000_000_000)], 1_000_000_000, 100_000_000),
        simulated_gas: 1_000,
    });
    let blueprint = generate(config(0.0), collector.clone()).await;

    let valid: Vec<&PayoutRecipe> = blueprint.payouts.iter().filter(|p| p.is_valid).collect();
    assert_eq!(valid.len(), 1);
    assert_eq!(valid[0].amount, 95_000_000);
    assert_eq!(valid[0].fee, 5_000_000);
    assert_eq!(blueprint.summary.fee_income, 5_000_000);
    assert_eq!(blueprint.summary.paid_delegators, 1);

    let workdir = tempfile::tempdir().unwrap();
    let reporter = FsReporter::new(workdir.path());
    let prepared = prepare_payouts(blueprint, &baker(), &reporter).unwrap();
    assert_eq!(prepared.valid_payouts.len(), 1);

    let transactor = Arc::new(TestTransactor::default());
    let results = execute_payouts(
        &prepared,
        &execution_engines(collector, transactor.clone()),
        &reporter,
        &ExecutePayoutsOptions::default(),
        Arc::new(ProtectedSection::new()),
    )
    .await
    .unwrap();

    // one batch, one success report
    assert_eq!(results.len(), 1);
    assert!(results[0].is_success());
    assert_eq!(transactor.dispatches.load(Ordering::SeqCst), 1);
    let reports = reporter.read_payout_reports(CYCLE).unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].is_success);
    assert_eq!(reports[0].amount, 95_000_000);
    assert_eq!(reports[0].op_hash, "oo1");
}

// Scenario: two delegators, one below the minimum balance.
#[tokio::test]
async fn below_minimum_delegator_is_flagged() {
    let collector = Arc::new(TestCollector {
        cycle_data: cycle_data(&[(1, 800_000), (2, 200_000)], 1_000_000, 100_000_000),
        simulated_gas: 1_000,
    });
    let blueprint = generate(config(0.5), collector).await;

    assert_eq!(blueprint.summary.delegators, 2);
    assert_eq!(blueprint.summary.paid_delegators, 1);
    let invalid: Vec<&PayoutRecipe> = blueprint.payouts.iter().filter(|p| !p.is_valid).collect();
    assert_eq!(invalid.len(), 1);
    assert_eq!(invalid[0].delegator, tz(2));
    assert_eq!(invalid[0].note, "DELEGATOR_LOW_BALANCE");
    assert_eq!(invalid[0].amount, 0);
}

// Scenario: second run after partial success re-submits only the failed
// recipients and never double-pays.
#[tokio::test]
async fn second_run_after_partial_success() {
    let collector = Arc::new(TestCollector {
        cycle_data: cycle_data(&[(1, 500_000), (2, 500_000)], 1_000_000, 100_000_000),
        // one recipe per batch
        simulated_gas: 600_000,
    });
    let workdir = tempfile::tempdir().unwrap();
    let reporter = FsReporter::new(workdir.path());
    let cfg = config(0.0);

    // first run: batch 1 confirms, batch 2 fails confirmation
    let blueprint = generate(cfg.clone(), collector.clone()).await;
    let prepared = prepare_payouts(blueprint, &baker(), &reporter).unwrap();
    assert_eq!(prepared.valid_payouts.len(), 2);
    let failing = Arc::new(TestTransactor {
        fail_confirm_at: Some(1),
        ..TestTransactor::default()
    });
    let results = execute_payouts(
        &prepared,
        &execution_engines(collector.clone(), failing),
        &reporter,
        &ExecutePayoutsOptions::default(),
        Arc::new(ProtectedSection::new()),
    )
    .await
    .unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_success());
    assert_eq!(results[1].status, BatchStatus::FailedConfirm);

    // second run: only the failed recipient is pending
    let blueprint = generate(cfg, collector.clone()).await;
    let prepared = prepare_payouts(blueprint, &baker(), &reporter).unwrap();
    assert_eq!(prepared.reports_of_past_successful.len(), 1);
    assert_eq!(prepared.valid_payouts.len(), 1);

    let retry = Arc::new(TestTransactor::default());
    let results = execute_payouts(
        &prepared,
        &execution_engines(collector, retry.clone()),
        &reporter,
        &ExecutePayoutsOptions::default(),
        Arc::new(ProtectedSection::new()),
    )
    .await
    .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_success());
    assert_eq!(retry.dispatches.load(Ordering::SeqCst), 1);

    // at most one successful report per (delegator, recipient, kind)
    let reports = reporter.read_payout_reports(CYCLE).unwrap();
    let successes: Vec<&PayoutReport> = reports.iter().filter(|r| r.is_success).collect();
    assert_eq!(successes.len(), 2);
    for seed in [1u8, 2u8] {
        assert_eq!(
            successes.iter().filter(|r| r.delegator == tz(seed)).count(),
            1
        );
    }
}

/// Reporter that raises the interrupt flag once the partial report shows
/// two settled batches, i.e. between batches 2 and 3.
struct InterruptingReporter {
    inner: FsReporter,
    section: Arc<ProtectedSection>,
    successes_before_signal: usize,
}

impl ReporterEngine for InterruptingReporter {
    fn report_payouts(&self, reports: &[PayoutReport]) -> Result<()> {
        if reports.iter().filter(|r| r.is_success).count() >= self.successes_before_signal {
            self.section.signal();
        }
        self.inner.report_payouts(reports)
    }
    fn report_invalid_payouts(&self, cycle: i64, recipes: &[PayoutRecipe]) -> Result<()> {
        self.inner.report_invalid_payouts(cycle, recipes)
    }
    fn report_cycle_summary(
        &self,
        summary: &bakerpay_core::recipe::CyclePayoutSummary,
    ) -> Result<()> {
        self.inner.report_cycle_summary(summary)
    }
    fn read_payout_reports(&self, cycle: i64) -> Result<Vec<PayoutReport>> {
        self.inner.read_payout_reports(cycle)
    }
}

// Scenario: interrupt lands between batches 2 and 3 of 5.
#[tokio::test]
async fn interrupt_between_batches() {
    let collector = Arc::new(TestCollector {
        cycle_data: cycle_data(
            &[(1, 200_000), (2, 200_000), (3, 200_000), (4, 200_000), (5, 200_000)],
            1_000_000,
            100_000_000,
        ),
        simulated_gas: 600_000,
    });
    let workdir = tempfile::tempdir().unwrap();
    let section = Arc::new(ProtectedSection::new());
    let reporter = InterruptingReporter {
        inner: FsReporter::new(workdir.path()),
        section: section.clone(),
        successes_before_signal: 2,
    };

    let blueprint = generate(config(0.0), collector.clone()).await;
    let prepared = prepare_payouts(blueprint, &baker(), &reporter).unwrap();
    assert_eq!(prepared.valid_payouts.len(), 5);

    let transactor = Arc::new(TestTransactor::default());
    let results = execute_payouts(
        &prepared,
        &execution_engines(collector, transactor.clone()),
        &reporter,
        &ExecutePayoutsOptions::default(),
        section,
    )
    .await
    .unwrap();

    assert_eq!(results.len(), 5);
    assert!(results[0].is_success());
    assert!(results[1].is_success());
    for result in &results[2..] {
        assert_eq!(result.status, BatchStatus::UserTerminated);
    }
    // only batches 1 and 2 were ever dispatched
    assert_eq!(transactor.dispatches.load(Ordering::SeqCst), 2);

    let reports = reporter.read_payout_reports(CYCLE).unwrap();
    let successes: Vec<&PayoutReport> = reports.iter().filter(|r| r.is_success).collect();
    assert_eq!(successes.len(), 2);
}

// Quantified invariants: conservation and batch caps over a larger set.
#[tokio::test]
async fn conservation_and_batch_caps_at_scale() {
    let delegators: Vec<(u8, Mutez)> = (1..=120)
        .map(|i| (i as u8, 1_000_000 + (i as Mutez) * 13_337))
        .collect();
    let staking: Mutez = delegators.iter().map(|(_, b)| *b).sum();
    let rewards: Mutez = 987_654_321;
    let collector = Arc::new(TestCollector {
        cycle_data: cycle_data(&delegators, staking, rewards),
        simulated_gas: 50_000,
    });
    let blueprint = generate(config(0.0), collector.clone()).await;

    // conservation: delegator payouts + baker income + donations = pot
    let delegator_total: Mutez = blueprint
        .payouts
        .iter()
        .filter(|p| p.is_valid && p.kind == PayoutKind::DelegatorReward)
        .map(|p| p.amount)
        .sum();
    assert_eq!(
        delegator_total
            + blueprint.summary.bond_income
            + blueprint.summary.fee_income
            + blueprint.summary.donated_total,
        rewards
    );

    // every assembled batch respects the gas cap
    let workdir = tempfile::tempdir().unwrap();
    let reporter = FsReporter::new(workdir.path());
    let prepared = prepare_payouts(blueprint, &baker(), &reporter).unwrap();
    let transactor = Arc::new(TestTransactor::default());
    let results = execute_payouts(
        &prepared,
        &execution_engines(collector, transactor),
        &reporter,
        &ExecutePayoutsOptions::default(),
        Arc::new(ProtectedSection::new()),
    )
    .await
    .unwrap();
    assert!(results.len() > 1, "expected multiple batches");
    for result in &results {
        assert!(result.batch.total_gas() <= HARD_GAS_LIMIT_PER_OPERATION);
        assert!(result.is_success());
    }
    let batched: usize = results.iter().map(|r| r.batch.len()).sum();
    assert_eq!(batched, 120);
}

// Scenario: a hook the extension does not implement is a no-op.
mod hooks {
    use super::*;
    use bakerpay_core::config::{ExtensionDefinition, HookSpecV0};
    use bakerpay_core::enums::{
        ExtensionErrorAction, ExtensionLifespan, ExtensionRpcKind, Hook, HookMode,
    };
    use bakerpay_extension::rpc::{RpcErrorBody, RpcResponse, JSONRPC_VERSION, METHOD_NOT_FOUND};
    use bakerpay_extension::{ExtensionEndpoint, ExtensionStore};
    use std::time::Duration;

    struct NotImplementedEndpoint {
        requests: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ExtensionEndpoint for NotImplementedEndpoint {
        async fn request(
            &mut self,
            method: &str,
            _params: serde_json::Value,
            _timeout: Duration,
        ) -> Result<RpcResponse> {
            self.requests.lock().unwrap().push(method.to_string());
            Ok(RpcResponse {
                jsonrpc: JSONRPC_VERSION.to_string(),
                id: Some(1),
                result: None,
                error: Some(RpcErrorBody {
                    code: METHOD_NOT_FOUND,
                    message: "method not found".to_string(),
                    data: None,
                }),
            })
        }
        async fn notify(
            &mut self,
            _method: &str,
            _params: serde_json::Value,
            _timeout: Duration,
        ) -> Result<()> {
            Ok(())
        }
        async fn close(&mut self) {}
    }

    #[tokio::test]
    async fn method_not_found_hook_is_noop() {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let store = ExtensionStore::with_endpoints(vec![(
            ExtensionDefinition {
                name: "lazy".to_string(),
                command: "unused".to_string(),
                args: Vec::new(),
                kind: ExtensionRpcKind::Stdio,
                hooks: vec![HookSpecV0 {
                    id: Hook::AfterCandidateGenerated,
                    mode: HookMode::ReadWrite,
                }],
                timeout_s: 2,
                retry: 1,
                retry_delay_s: 0,
                error_action: ExtensionErrorAction::Stop,
                lifespan: ExtensionLifespan::Scoped,
                configuration: None,
            },
            Box::new(NotImplementedEndpoint {
                requests: requests.clone(),
            }) as Box<dyn ExtensionEndpoint>,
        )]);

        let collector = Arc::new(TestCollector {
            cycle_data: cycle_data(&[(1, 1_000_000_000)], 1_000_000_000, 100_000_000),
            simulated_gas: 1_000,
        });
        let engines = GeneratePayoutsEngines {
            collector,
            signer: signer(),
            hooks: Arc::new(store),
            admin_notify: Arc::new(|_| {}),
        };
        let blueprint = generate_payouts(
            config(0.0),
            engines,
            &GeneratePayoutsOptions {
                cycle: CYCLE,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // the hook was invoked and the pipeline proceeded unmodified
        assert!(requests
            .lock()
            .unwrap()
            .contains(&"after_candidate_generated".to_string()));
        let valid: Vec<&PayoutRecipe> =
            blueprint.payouts.iter().filter(|p| p.is_valid).collect();
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].amount, 95_000_000);
    }
}
