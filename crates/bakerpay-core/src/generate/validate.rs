// Stage 6: re-validate candidates after fees. Sub-threshold remainders
// are swept into baker fees; the candidate keeps a record of the sweep in
// its fee field. Delegator-paid tx/allocation fees were already deducted
// from the bond, so the sweep never double-counts them.

use super::PayoutGenerationContext;
use crate::engines::GeneratePayoutsOptions;
use crate::enums::{InvalidReason, TxKind};
use crate::error::Result;

pub async fn validate_simulated_payouts(
    ctx: &mut PayoutGenerationContext,
    _options: &GeneratePayoutsOptions,
) -> Result<()> {
    log::debug!("validating simulated payout candidates");
    let minimum_amount = ctx.config.payouts.minimum_amount;

    for candidate in ctx.simulated.iter_mut() {
        if candidate.is_invalid() {
            continue;
        }
        // only tez payouts respect the configured minimum; token payouts
        // respect anything above zero
        let threshold = if candidate.bonded.candidate.tx_kind == TxKind::Tez {
            minimum_amount
        } else {
            0
        };
        if candidate.bonded.bonds_amount == 0 {
            candidate.invalidate(InvalidReason::Zero);
        } else if candidate.bonded.bonds_amount <= threshold {
            candidate.invalidate(InvalidReason::BelowMinimum);
        } else {
            continue;
        }

        // sweep the remainder into baker fees
        let dust = candidate.bonded.bonds_amount;
        ctx.baker_fees_amount += dust;
        candidate.bonded.fee += dust;
        candidate.bonded.bonds_amount = 0;
    }
    Ok(())
}
