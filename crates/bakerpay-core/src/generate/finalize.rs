// Stages 7 and 8: freeze candidates into recipes, add income and
// donation recipes, and assemble the cycle blueprint.

use chrono::Utc;

use super::PayoutGenerationContext;
use crate::address::Address;
use crate::batch::{measure_op_limits, SimulationBuffers};
use crate::candidate::{BondedCandidate, PayoutCandidate, SimulatedCandidate};
use crate::engines::{execute_hook, GeneratePayoutsOptions};
use crate::enums::{Hook, InvalidReason, PayoutKind, TxKind};
use crate::error::Result;
use crate::recipe::{CyclePayoutBlueprint, CyclePayoutSummary, PayoutRecipe};
use crate::{bps_portion, Mutez};

fn recipe_from_candidate(candidate: &SimulatedCandidate, kind: PayoutKind) -> PayoutRecipe {
    let inner = &candidate.bonded.candidate;
    let is_valid = !inner.is_invalid;
    PayoutRecipe {
        delegator: inner.source.clone(),
        recipient: inner.recipient.clone(),
        kind: if is_valid { kind } else { PayoutKind::Invalid },
        tx_kind: inner.tx_kind,
        fa_contract: inner.fa_contract.clone(),
        fa_token_id: inner.fa_token_id,
        delegated_balance: inner.delegated_balance,
        amount: candidate.bonded.bonds_amount,
        fee_rate_bps: inner.fee_rate_bps,
        fee: candidate.bonded.fee,
        op_limits: if is_valid { candidate.op_limits } else { None },
        note: inner
            .invalid_because
            .map(|reason| reason.to_string())
            .unwrap_or_default(),
        is_valid,
    }
}

fn income_candidate(source: &Address, recipient: &Address, amount: Mutez) -> SimulatedCandidate {
    SimulatedCandidate {
        bonded: BondedCandidate {
            candidate: PayoutCandidate {
                source: source.clone(),
                recipient: recipient.clone(),
                delegated_balance: 0,
                fee_rate_bps: 0,
                tx_kind: TxKind::Tez,
                fa_contract: None,
                fa_token_id: None,
                baker_pays_tx_fee: true,
                baker_pays_allocation_fee: true,
                is_invalid: false,
                invalid_because: None,
            },
            bonds_amount: amount,
            fee: 0,
        },
        op_limits: None,
    }
}

pub async fn finalize_payouts(
    ctx: &mut PayoutGenerationContext,
    _options: &GeneratePayoutsOptions,
) -> Result<()> {
    log::debug!("finalizing payouts");

    // an unresolved batch-estimate marker here is a bug in the assembler
    debug_assert!(ctx
        .simulated
        .iter()
        .all(|c| c.bonded.candidate.invalid_because != Some(InvalidReason::FailedBatchEstimate)));

    let mut payouts: Vec<PayoutRecipe> = ctx
        .simulated
        .iter()
        .map(|candidate| recipe_from_candidate(candidate, PayoutKind::DelegatorReward))
        .collect();

    // fee-side donation is carved out once the dust sweeps are in
    if !ctx.config.income_recipients.donations.is_empty() {
        ctx.donate_fees_amount = bps_portion(
            ctx.baker_fees_amount,
            ctx.config.income_recipients.donate_fees_bps,
        );
        ctx.baker_fees_amount -= ctx.donate_fees_amount;
    }

    // synthetic recipes for configured income and donation recipients
    let baker = ctx.config.baker.clone();
    let donated_total = ctx.donate_bonds_amount + ctx.donate_fees_amount;
    let mut income: Vec<(PayoutKind, SimulatedCandidate)> = Vec::new();
    for (recipient, weight) in &ctx.config.income_recipients.bonds {
        let amount = bps_portion(ctx.baker_bonds_amount, *weight);
        if amount > 0 {
            income.push((
                PayoutKind::BakerReward,
                income_candidate(&baker, recipient, amount),
            ));
        }
    }
    for (recipient, weight) in &ctx.config.income_recipients.fees {
        let amount = bps_portion(ctx.baker_fees_amount, *weight);
        if amount > 0 {
            income.push((
                PayoutKind::FeeIncome,
                income_candidate(&baker, recipient, amount),
            ));
        }
    }
    for (recipient, weight) in &ctx.config.income_recipients.donations {
        let amount = bps_portion(donated_total, *weight);
        if amount > 0 {
            income.push((
                PayoutKind::Donation,
                income_candidate(&baker, recipient, amount),
            ));
        }
    }

    if !income.is_empty() {
        let mut candidates: Vec<SimulatedCandidate> =
            income.iter().map(|(_, c)| c.clone()).collect();
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
            &mut candidates,
            &buffers,
        )
        .await?;
        for ((kind, _), candidate) in income.iter().zip(candidates.iter()) {
            payouts.push(recipe_from_candidate(candidate, *kind));
        }
    }

    let mut paid: Vec<&Address> = payouts
        .iter()
        .filter(|p| p.is_valid && p.kind == PayoutKind::DelegatorReward)
        .map(|p| &p.delegator)
        .collect();
    paid.sort();
    paid.dedup();
    ctx.paid_delegators = paid.len();

    ctx.payouts = payouts;
    Ok(())
}

pub async fn create_blueprint(
    ctx: &mut PayoutGenerationContext,
    options: &GeneratePayoutsOptions,
) -> Result<()> {
    let distributed: Mutez = ctx
        .payouts
        .iter()
        .filter(|p| p.is_valid)
        .map(|p| p.amount)
        .sum();

    let blueprint = CyclePayoutBlueprint {
        cycle: options.cycle,
        payouts: std::mem::take(&mut ctx.payouts),
        summary: CyclePayoutSummary {
            cycle: options.cycle,
            delegators: ctx.cycle_data.delegators.len(),
            paid_delegators: ctx.paid_delegators,
            staking_balance: ctx.cycle_data.staking_balance,
            earned_fees: ctx.cycle_data.earned_fees(),
            earned_rewards: ctx.cycle_data.earned_rewards(),
            distributed_rewards: distributed,
            bond_income: ctx.baker_bonds_amount,
            fee_income: ctx.baker_fees_amount,
            income_total: ctx.baker_bonds_amount + ctx.baker_fees_amount,
            donated_bonds: ctx.donate_bonds_amount,
            donated_fees: ctx.donate_fees_amount,
            donated_total: ctx.donate_bonds_amount + ctx.donate_fees_amount,
            timestamp: Utc::now(),
        },
    };

    // notify extensions; the blueprint itself is frozen
    let mut hook_data = blueprint.clone();
    execute_hook(
        ctx.engines.hooks.as_ref(),
        Hook::AfterPayoutsBlueprintGenerated,
        "0.1",
        &mut hook_data,
    )
    .await?;

    ctx.blueprint = Some(blueprint);
    Ok(())
}
