// Stage 2: compute each candidate's share of the distributable pot.
// Shares are floor(pot * balance / staking_balance); the rounding residue
// accrues to the baker, so the pot is conserved exactly.

use super::PayoutGenerationContext;
use crate::candidate::BondedCandidate;
use crate::engines::{execute_hook, GeneratePayoutsOptions};
use crate::enums::{Hook, RewardDestination};
use crate::error::Result;
use crate::{bps_portion, proportion, Mutez};

pub async fn distribute_bonds(
    ctx: &mut PayoutGenerationContext,
    _options: &GeneratePayoutsOptions,
) -> Result<()> {
    log::debug!("distributing bonds");
    let pot = ctx.distributable();
    let staking_balance = ctx.cycle_data.staking_balance;

    let mut bonded: Vec<BondedCandidate> = ctx
        .candidates
        .drain(..)
        .map(|candidate| {
            let gross = if candidate.is_invalid || staking_balance == 0 {
                0
            } else {
                proportion(pot, candidate.delegated_balance, staking_balance)
            };
            BondedCandidate {
                candidate,
                bonds_amount: gross,
                fee: 0,
            }
        })
        .collect();

    // below-minimum rewards optionally flow back to the remaining valid
    // candidates instead of staying with the baker
    if ctx.config.delegators.below_minimum_reward_destination == RewardDestination::Everyone {
        redistribute_low_balance_bonds(&mut bonded, pot, staking_balance);
    }

    let distributed: Mutez = bonded
        .iter()
        .filter(|b| !b.candidate.is_invalid)
        .map(|b| b.bonds_amount)
        .sum();
    ctx.baker_bonds_amount = pot.saturating_sub(distributed);

    // donations are carved out of the baker's keep
    if !ctx.config.income_recipients.donations.is_empty() {
        ctx.donate_bonds_amount = bps_portion(
            ctx.baker_bonds_amount,
            ctx.config.income_recipients.donate_bonds_bps,
        );
        ctx.baker_bonds_amount -= ctx.donate_bonds_amount;
    }

    execute_hook(
        ctx.engines.hooks.as_ref(),
        Hook::AfterBondsDistributed,
        "0.1",
        &mut bonded,
    )
    .await?;

    ctx.bonded = bonded;
    Ok(())
}

fn redistribute_low_balance_bonds(
    bonded: &mut [BondedCandidate],
    pot: Mutez,
    staking_balance: Mutez,
) {
    use crate::enums::InvalidReason;

    let pool: Mutez = bonded
        .iter()
        .filter(|b| b.candidate.invalid_because == Some(InvalidReason::LowBalance))
        .map(|b| {
            if staking_balance == 0 {
                0
            } else {
                proportion(pot, b.candidate.delegated_balance, staking_balance)
            }
        })
        .sum();
    if pool == 0 {
        return;
    }
    let total_valid_balance: Mutez = bonded
        .iter()
        .filter(|b| !b.candidate.is_invalid)
        .map(|b| b.candidate.delegated_balance)
        .sum();
    if total_valid_balance == 0 {
        return;
    }
    for entry in bonded.iter_mut().filter(|b| !b.candidate.is_invalid) {
        entry.bonds_amount +=
            proportion(pool, entry.candidate.delegated_balance, total_valid_balance);
    }
}
