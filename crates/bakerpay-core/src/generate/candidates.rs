// Stage 1: one candidate per delegator, with eligibility rules and
// per-address overrides applied in order.

use super::PayoutGenerationContext;
use crate::address::Address;
use crate::candidate::PayoutCandidate;
use crate::engines::{execute_hook, GeneratePayoutsOptions};
use crate::enums::{Hook, InvalidReason, TxKind};
use crate::error::Result;

pub async fn generate_candidates(
    ctx: &mut PayoutGenerationContext,
    _options: &GeneratePayoutsOptions,
) -> Result<()> {
    log::debug!("generating payout candidates");
    let config = &ctx.config;
    let mut candidates = Vec::with_capacity(ctx.cycle_data.delegators.len());

    for delegator in &ctx.cycle_data.delegators {
        let overrides = config.override_for(&delegator.address);

        let mut balance = delegator.delegated_balance;
        if let Some(maximum) = overrides.and_then(|o| o.maximum_balance) {
            balance = balance.min(maximum);
        }

        let recipient = overrides
            .and_then(|o| o.recipient.clone())
            .unwrap_or_else(|| delegator.address.clone());

        let mut candidate = PayoutCandidate {
            source: delegator.address.clone(),
            recipient,
            delegated_balance: balance,
            fee_rate_bps: config.fee_bps_for(&delegator.address),
            tx_kind: TxKind::Tez,
            fa_contract: None,
            fa_token_id: None,
            baker_pays_tx_fee: overrides
                .and_then(|o| o.baker_pays_tx_fee)
                .unwrap_or(config.payouts.baker_pays_tx_fee),
            baker_pays_allocation_fee: overrides
                .and_then(|o| o.baker_pays_allocation_fee)
                .unwrap_or(config.payouts.baker_pays_allocation_fee),
            is_invalid: false,
            invalid_because: None,
        };

        let minimum_balance = overrides
            .and_then(|o| o.minimum_balance)
            .unwrap_or(config.delegators.minimum_balance);

        if config.is_ignored(&delegator.address) {
            candidate.invalidate(InvalidReason::Ignored);
        } else if delegator.is_emptied && config.payouts.ignore_empty_accounts {
            candidate.invalidate(InvalidReason::Emptied);
        } else if balance < minimum_balance {
            candidate.invalidate(InvalidReason::LowBalance);
        } else if candidate.recipient == ctx.payout_wallet {
            candidate.invalidate(InvalidReason::TargetsPayout);
        } else if candidate.recipient.is_contract() && config.network.ignore_kt {
            candidate.invalidate(InvalidReason::KtIgnored);
        }

        candidates.push(candidate);
    }

    execute_hook(
        ctx.engines.hooks.as_ref(),
        Hook::AfterCandidateGenerated,
        "0.1",
        &mut candidates,
    )
    .await?;

    // extensions may inject or rewrite candidates; re-check the fields a
    // well-behaved ledger would reject
    for candidate in &mut candidates {
        if candidate.is_invalid {
            continue;
        }
        if Address::parse(candidate.recipient.as_str()).is_err() {
            candidate.invalidate(InvalidReason::InvalidRecipient);
        } else if candidate.tx_kind.is_fa() && candidate.fa_contract.is_none() {
            candidate.invalidate(InvalidReason::InvalidRecipient);
        } else if candidate.recipient == ctx.payout_wallet {
            candidate.invalidate(InvalidReason::TargetsPayout);
        }
    }

    log::debug!(
        "generated {} candidates ({} invalid)",
        candidates.len(),
        candidates.iter().filter(|c| c.is_invalid).count()
    );
    ctx.candidates = candidates;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::tests::{context_with, tz};

    #[tokio::test]
    async fn test_eligibility_rules_in_order() {
        let mut ctx = context_with(|fixture| {
            fixture.delegator(1, 800_000);
            fixture.delegator(2, 200_000);
            fixture.ignore(tz(2));
            fixture.minimum_balance(500_000);
        });
        generate_candidates(&mut ctx, &Default::default())
            .await
            .unwrap();
        assert_eq!(ctx.candidates.len(), 2);
        assert!(!ctx.candidates[0].is_invalid);
        // ignore list wins over the balance check
        assert_eq!(
            ctx.candidates[1].invalid_because,
            Some(InvalidReason::Ignored)
        );
    }

    #[tokio::test]
    async fn test_minimum_balance_boundary() {
        let mut ctx = context_with(|fixture| {
            fixture.delegator(1, 500_000);
            fixture.delegator(2, 499_999);
            fixture.minimum_balance(500_000);
        });
        generate_candidates(&mut ctx, &Default::default())
            .await
            .unwrap();
        // exactly at the minimum is eligible; one mutez below is not
        assert!(!ctx.candidates[0].is_invalid);
        assert_eq!(
            ctx.candidates[1].invalid_because,
            Some(InvalidReason::LowBalance)
        );
    }

    #[tokio::test]
    async fn test_override_redirect_and_fee() {
        let mut ctx = context_with(|fixture| {
            fixture.delegator(1, 800_000);
            fixture.redirect(tz(1), tz(9));
            fixture.override_fee(tz(1), 0);
        });
        generate_candidates(&mut ctx, &Default::default())
            .await
            .unwrap();
        assert_eq!(ctx.candidates[0].recipient, tz(9));
        assert_eq!(ctx.candidates[0].fee_rate_bps, 0);
    }

    #[tokio::test]
    async fn test_recipient_targeting_payout_wallet_rejected() {
        let mut ctx = context_with(|fixture| {
            fixture.delegator(1, 800_000);
            fixture.redirect(tz(1), tz(250)); // payout wallet seed
        });
        generate_candidates(&mut ctx, &Default::default())
            .await
            .unwrap();
        assert_eq!(
            ctx.candidates[0].invalid_because,
            Some(InvalidReason::TargetsPayout)
        );
    }

    #[tokio::test]
    async fn test_maximum_balance_clamp() {
        let mut ctx = context_with(|fixture| {
            fixture.delegator(1, 800_000);
            fixture.clamp_balance(tz(1), 100_000);
        });
        generate_candidates(&mut ctx, &Default::default())
            .await
            .unwrap();
        assert_eq!(ctx.candidates[0].delegated_balance, 100_000);
    }

    #[tokio::test]
    async fn test_emptied_accounts() {
        let mut ctx = context_with(|fixture| {
            fixture.emptied_delegator(1);
            fixture.ignore_empty_accounts();
        });
        generate_candidates(&mut ctx, &Default::default())
            .await
            .unwrap();
        assert_eq!(
            ctx.candidates[0].invalid_because,
            Some(InvalidReason::Emptied)
        );
    }
}
