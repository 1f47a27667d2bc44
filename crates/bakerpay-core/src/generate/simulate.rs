// Stage 5: measure exact resource costs by dry-running the transfers in
// chunks, then charge tx/allocation fees to whoever pays them.

use super::PayoutGenerationContext;
use crate::batch::{measure_op_limits, SimulationBuffers};
use crate::candidate::SimulatedCandidate;
use crate::engines::GeneratePayoutsOptions;
use crate::error::Result;

pub async fn collect_transaction_fees(
    ctx: &mut PayoutGenerationContext,
    _options: &GeneratePayoutsOptions,
) -> Result<()> {
    log::debug!("estimating transaction costs");
    let mut simulated: Vec<SimulatedCandidate> = ctx
        .bonded
        .drain(..)
        .map(|bonded| SimulatedCandidate {
            bonded,
            op_limits: None,
        })
        .collect();

    let buffers = SimulationBuffers {
        gas_limit_buffer: ctx.config.payouts.gas_limit_buffer,
        deserialization_gas_buffer: ctx.config.payouts.deserialization_gas_buffer,
        fee_buffer: ctx.config.payouts.fee_buffer,
        kt_fee_buffer: ctx.config.payouts.kt_fee_buffer,
    };
    measure_op_limits(
        ctx.engines.collector.as_ref(),
        &ctx.payout_wallet,
        &ctx.engines.signer.public_key(),
        &mut simulated,
        &buffers,
    )
    .await?;

    // fees the baker does not cover come out of the payout itself
    for candidate in simulated.iter_mut().filter(|c| !c.is_invalid()) {
        let limits = match candidate.op_limits {
            Some(limits) => limits,
            None => continue,
        };
        if !candidate.bonded.candidate.baker_pays_tx_fee {
            candidate.bonded.bonds_amount = candidate
                .bonded
                .bonds_amount
                .saturating_sub(limits.transaction_fee);
        }
        if !candidate.bonded.candidate.baker_pays_allocation_fee {
            candidate.bonded.bonds_amount = candidate
                .bonded
                .bonds_amount
                .saturating_sub(limits.allocation_fee);
        }
    }

    ctx.simulated = simulated;
    Ok(())
}
