// Stage 3: ensure the payout wallet can cover the projected payouts.
// The estimate is a projection with a per-recipient fee reserve; exact
// costs only exist after simulation, so strictly more than the estimate
// is required.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::PayoutGenerationContext;
use crate::address::Address;
use crate::engines::{execute_hook, CollectorEngine, GeneratePayoutsOptions};
use crate::enums::{Hook, TxKind};
use crate::error::{PayoutError, Result};
use crate::{Mutez, BALANCE_NOTIFY_EVERY, BALANCE_WAIT_INTERVAL_SECS, PAYOUT_FEE_BUFFER};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CheckBalanceHookData {
    pub address: Address,
    pub required_tez: Mutez,
    /// An extension may declare the check satisfied.
    #[serde(default)]
    pub skip_tez_check: bool,
    #[serde(default)]
    pub is_sufficient: bool,
    #[serde(default)]
    pub message: String,
}

async fn check_balance_with_collector(
    collector: &dyn CollectorEngine,
    data: &mut CheckBalanceHookData,
) -> Result<()> {
    if data.skip_tez_check {
        return Ok(());
    }
    let payable = collector.get_balance(&data.address).await?;
    if payable <= data.required_tez {
        data.is_sufficient = false;
        data.message = format!("required: {}, available: {}", data.required_tez, payable);
    }
    Ok(())
}

pub async fn check_sufficient_balance(
    ctx: &mut PayoutGenerationContext,
    options: &GeneratePayoutsOptions,
) -> Result<()> {
    if options.skip_balance_check {
        return Ok(());
    }
    log::debug!("checking for sufficient balance");

    let config = &ctx.config;
    let valid_payouts = ctx.bonded.iter().filter(|b| !b.candidate.is_invalid).count();
    // every income destination is a projected transfer as well
    let total_payouts = valid_payouts
        + config.income_recipients.bonds.len()
        + config.income_recipients.fees.len()
        + config.income_recipients.donations.len().max(1);

    let candidate_total: Mutez = ctx
        .bonded
        .iter()
        .filter(|b| !b.candidate.is_invalid && b.candidate.tx_kind == TxKind::Tez)
        .map(|b| b.bonds_amount)
        .sum();
    let required = candidate_total
        + ctx.baker_bonds_amount
        + PAYOUT_FEE_BUFFER * total_payouts as u128;

    let mut data = CheckBalanceHookData {
        address: ctx.payout_wallet.clone(),
        required_tez: required,
        skip_tez_check: false,
        is_sufficient: true,
        message: String::new(),
    };

    // the hook may satisfy the check on its own; the collector check runs
    // with whatever the hook left in place
    run_balance_check(ctx, options, &mut data, BalanceCheck::Hook).await?;
    run_balance_check(ctx, options, &mut data, BalanceCheck::Collector).await?;
    Ok(())
}

enum BalanceCheck {
    Hook,
    Collector,
}

async fn run_balance_check(
    ctx: &PayoutGenerationContext,
    options: &GeneratePayoutsOptions,
    data: &mut CheckBalanceHookData,
    which: BalanceCheck,
) -> Result<()> {
    let mut notify_trigger: u64 = 0;
    loop {
        let check_result = match which {
            BalanceCheck::Hook => {
                log::trace!("checking balance with hook");
                execute_hook(
                    ctx.engines.hooks.as_ref(),
                    Hook::CheckBalance,
                    "0.1",
                    data,
                )
                .await
            }
            BalanceCheck::Collector => {
                log::trace!("checking tez balance with collector");
                check_balance_with_collector(ctx.engines.collector.as_ref(), data).await
            }
        };

        if let Err(err) = check_result {
            if options.wait_for_sufficient_balance {
                log::error!("failed to check balance - {}, waiting 5 minutes...", err);
                tokio::time::sleep(Duration::from_secs(BALANCE_WAIT_INTERVAL_SECS)).await;
                continue;
            }
            return Err(err);
        }

        if !data.is_sufficient {
            if options.wait_for_sufficient_balance {
                log::warn!("insufficient balance - {}, waiting 5 minutes...", data.message);
                if notify_trigger % BALANCE_NOTIFY_EVERY == 0 {
                    ctx.admin_notify(&format!("insufficient balance - {}", data.message));
                }
                notify_trigger += 1;
                // reset for the next round; the check fills it in again
                data.is_sufficient = true;
                data.message.clear();
                tokio::time::sleep(Duration::from_secs(BALANCE_WAIT_INTERVAL_SECS)).await;
                continue;
            }
            return Err(PayoutError::Collector(format!(
                "insufficient balance - {}",
                data.message
            )));
        }
        return Ok(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::tests::{context_and_handles_with, context_with};
    use crate::generate::{distribute_bonds, generate_candidates};

    #[tokio::test]
    async fn test_balance_exactly_equal_is_insufficient() {
        let mut ctx = context_with(|fixture| {
            fixture.staking(1_000_000);
            fixture.rewards(100_000);
            fixture.delegator(1, 1_000_000);
            // required = 100_000 + buffer * (1 payout + 1 donation slot)
            fixture.wallet_balance(100_000 + PAYOUT_FEE_BUFFER * 2);
        });
        generate_candidates(&mut ctx, &Default::default())
            .await
            .unwrap();
        distribute_bonds(&mut ctx, &Default::default()).await.unwrap();
        let err = check_sufficient_balance(&mut ctx, &Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PayoutError::Collector(_)));
        assert!(err.to_string().contains("insufficient balance"));
    }

    #[tokio::test]
    async fn test_balance_one_mutez_above_is_sufficient() {
        let mut ctx = context_with(|fixture| {
            fixture.staking(1_000_000);
            fixture.rewards(100_000);
            fixture.delegator(1, 1_000_000);
            fixture.wallet_balance(100_000 + PAYOUT_FEE_BUFFER * 2 + 1);
        });
        generate_candidates(&mut ctx, &Default::default())
            .await
            .unwrap();
        distribute_bonds(&mut ctx, &Default::default()).await.unwrap();
        check_sufficient_balance(&mut ctx, &Default::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_skip_flag_bypasses_collector() {
        let mut ctx = context_with(|fixture| {
            fixture.staking(1_000_000);
            fixture.rewards(100_000);
            fixture.delegator(1, 1_000_000);
            fixture.wallet_balance(0);
        });
        generate_candidates(&mut ctx, &Default::default())
            .await
            .unwrap();
        distribute_bonds(&mut ctx, &Default::default()).await.unwrap();
        let options = GeneratePayoutsOptions {
            skip_balance_check: true,
            ..Default::default()
        };
        check_sufficient_balance(&mut ctx, &options).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_sufficient_notifies_admin_once() {
        // insufficient on the first two checks, sufficient on the third
        let (mut ctx, handles) = context_and_handles_with(|fixture| {
            fixture.staking(1_000_000);
            fixture.rewards(100_000);
            fixture.delegator(1, 1_000_000);
            fixture.wallet_balances(vec![0, 0, 1_000_000_000]);
        });
        generate_candidates(&mut ctx, &Default::default())
            .await
            .unwrap();
        distribute_bonds(&mut ctx, &Default::default()).await.unwrap();
        let options = GeneratePayoutsOptions {
            wait_for_sufficient_balance: true,
            ..Default::default()
        };
        let started = tokio::time::Instant::now();
        check_sufficient_balance(&mut ctx, &options).await.unwrap();
        // two 5-minute waits elapsed (virtual time)
        assert!(started.elapsed() >= Duration::from_secs(2 * BALANCE_WAIT_INTERVAL_SECS));
        let notifications = handles.notifications.lock().unwrap();
        assert_eq!(
            notifications
                .iter()
                .filter(|n| n.contains("insufficient balance"))
                .count(),
            1
        );
    }
}
