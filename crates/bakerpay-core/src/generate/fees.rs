// Stage 4: move the baker's cut out of each bond.

use super::PayoutGenerationContext;
use crate::bps_portion;
use crate::engines::{execute_hook, GeneratePayoutsOptions};
use crate::enums::Hook;
use crate::error::Result;

pub async fn collect_baker_fee(
    ctx: &mut PayoutGenerationContext,
    _options: &GeneratePayoutsOptions,
) -> Result<()> {
    log::debug!("collecting baker fees");
    for bonded in ctx.bonded.iter_mut().filter(|b| !b.candidate.is_invalid) {
        let fee = bps_portion(bonded.bonds_amount, bonded.candidate.fee_rate_bps);
        bonded.fee = fee;
        bonded.bonds_amount -= fee;
    }

    execute_hook(
        ctx.engines.hooks.as_ref(),
        Hook::OnFeesCollection,
        "0.1",
        &mut ctx.bonded,
    )
    .await?;

    ctx.baker_fees_amount += ctx
        .bonded
        .iter()
        .filter(|b| !b.candidate.is_invalid)
        .map(|b| b.fee)
        .sum::<crate::Mutez>();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::tests::context_with;
    use crate::generate::{distribute_bonds, generate_candidates};

    #[tokio::test]
    async fn test_five_percent_fee() {
        let mut ctx = context_with(|fixture| {
            fixture.staking(1_000_000_000);
            fixture.rewards(100_000_000);
            fixture.delegator(1, 1_000_000_000);
            fixture.fee_bps(500);
        });
        generate_candidates(&mut ctx, &Default::default())
            .await
            .unwrap();
        distribute_bonds(&mut ctx, &Default::default()).await.unwrap();
        collect_baker_fee(&mut ctx, &Default::default()).await.unwrap();
        assert_eq!(ctx.bonded[0].bonds_amount, 95_000_000);
        assert_eq!(ctx.bonded[0].fee, 5_000_000);
        assert_eq!(ctx.baker_fees_amount, 5_000_000);
    }

    #[tokio::test]
    async fn test_zero_fee_leaves_gross_share() {
        let mut ctx = context_with(|fixture| {
            fixture.staking(1_000_000);
            fixture.rewards(100_000);
            fixture.delegator(1, 1_000_000);
            fixture.fee_bps(0);
        });
        generate_candidates(&mut ctx, &Default::default())
            .await
            .unwrap();
        distribute_bonds(&mut ctx, &Default::default()).await.unwrap();
        collect_baker_fee(&mut ctx, &Default::default()).await.unwrap();
        assert_eq!(ctx.bonded[0].bonds_amount, 100_000);
        assert_eq!(ctx.baker_fees_amount, 0);
    }

    #[tokio::test]
    async fn test_full_fee_zeroes_bond() {
        let mut ctx = context_with(|fixture| {
            fixture.staking(1_000_000);
            fixture.rewards(100_000);
            fixture.delegator(1, 1_000_000);
            fixture.fee_bps(10_000);
        });
        generate_candidates(&mut ctx, &Default::default())
            .await
            .unwrap();
        distribute_bonds(&mut ctx, &Default::default()).await.unwrap();
        collect_baker_fee(&mut ctx, &Default::default()).await.unwrap();
        assert_eq!(ctx.bonded[0].bonds_amount, 0);
        assert_eq!(ctx.baker_fees_amount, 100_000);
    }
}
