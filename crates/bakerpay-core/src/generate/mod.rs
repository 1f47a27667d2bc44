// ─────────────────────────────────────────────────────────────────
// Candidate generation pipeline. Stages run in fixed order, each
// mutating the shared generation context; the first stage error aborts
// the cycle. Determinism: identical (cycle data, configuration,
// extension responses) produce an identical blueprint.
// ─────────────────────────────────────────────────────────────────

mod balance;
mod bonds;
mod candidates;
mod fees;
mod finalize;
mod simulate;
mod validate;


pub use balance::check_sufficient_balance;
pub use bonds::distribute_bonds;
pub use candidates::generate_candidates;
pub use fees::collect_baker_fee;
pub use finalize::{create_blueprint, finalize_payouts};
pub use simulate::collect_transaction_fees;
pub use validate::validate_simulated_payouts;

use crate::address::Address;
use crate::candidate::{BondedCandidate, PayoutCandidate, SimulatedCandidate};
use crate::config::RuntimeConfiguration;
use crate::engines::{CycleData, GeneratePayoutsEngines, GeneratePayoutsOptions};
use crate::error::{PayoutError, Result};
use crate::recipe::{CyclePayoutBlueprint, PayoutRecipe};
use crate::Mutez;

/// Mutable state threaded through the generation stages.
pub struct PayoutGenerationContext {
    pub config: RuntimeConfiguration,
    pub engines: GeneratePayoutsEngines,
    /// Address of the payout wallet (the signer key).
    pub payout_wallet: Address,
    pub cycle_data: CycleData,

    pub candidates: Vec<PayoutCandidate>,
    pub bonded: Vec<BondedCandidate>,
    pub simulated: Vec<SimulatedCandidate>,

    /// Baker's keep of the distributable rewards (bond side).
    pub baker_bonds_amount: Mutez,
    /// Collected baker fees, including absorbed sub-threshold dust.
    pub baker_fees_amount: Mutez,
    pub donate_bonds_amount: Mutez,
    pub donate_fees_amount: Mutez,

    pub payouts: Vec<PayoutRecipe>,
    pub paid_delegators: usize,
    pub blueprint: Option<CyclePayoutBlueprint>,
}

impl PayoutGenerationContext {
    pub fn admin_notify(&self, message: &str) {
        (self.engines.admin_notify)(message);
    }

    /// Distributable pot for the cycle: earned rewards plus earned fees.
    pub fn distributable(&self) -> Mutez {
        self.cycle_data.earned_rewards() + self.cycle_data.earned_fees()
    }
}

/// `GeneratePayouts(config, cycle, opts) -> Blueprint | Error`
pub async fn generate_payouts(
    config: RuntimeConfiguration,
    engines: GeneratePayoutsEngines,
    options: &GeneratePayoutsOptions,
) -> Result<CyclePayoutBlueprint> {
    let cycle_data = engines
        .collector
        .get_cycle_data(&config.baker, options.cycle)
        .await?;
    log::debug!(
        "collected cycle {} data: {} delegators, staking balance {}",
        cycle_data.cycle,
        cycle_data.delegators.len(),
        cycle_data.staking_balance
    );

    let payout_wallet = engines.signer.pkh();
    let mut ctx = PayoutGenerationContext {
        config,
        engines,
        payout_wallet,
        cycle_data,
        candidates: Vec::new(),
        bonded: Vec::new(),
        simulated: Vec::new(),
        baker_bonds_amount: 0,
        baker_fees_amount: 0,
        donate_bonds_amount: 0,
        donate_fees_amount: 0,
        payouts: Vec::new(),
        paid_delegators: 0,
        blueprint: None,
    };

    generate_candidates(&mut ctx, options).await?;
    distribute_bonds(&mut ctx, options).await?;
    check_sufficient_balance(&mut ctx, options).await?;
    collect_baker_fee(&mut ctx, options).await?;
    collect_transaction_fees(&mut ctx, options).await?;
    validate_simulated_payouts(&mut ctx, options).await?;
    finalize_payouts(&mut ctx, options).await?;
    create_blueprint(&mut ctx, options).await?;

    ctx.blueprint
        .take()
        .ok_or_else(|| PayoutError::Input("payout generation produced no blueprint".to_string()))
}
