// Reconciliation against prior-cycle reports: payouts already settled in
// an earlier run are excluded from execution, so re-runs never pay a
// recipient twice.

use crate::address::Address;
use crate::error::Result;
use crate::recipe::{CyclePayoutBlueprint, PayoutRecipe};
use crate::report::{filter_reports_by_baker, PayoutReport};
use crate::reports_store::ReporterEngine;

pub struct PreparePayoutsResult {
    pub baker: Address,
    pub blueprint: CyclePayoutBlueprint,
    /// Valid recipes still awaiting dispatch.
    pub valid_payouts: Vec<PayoutRecipe>,
    pub invalid_payouts: Vec<PayoutRecipe>,
    /// Rows from prior runs that already settled; carried into the final
    /// combined report.
    pub reports_of_past_successful: Vec<PayoutReport>,
}

/// Split blueprint recipes into already-settled and pending sets using the
/// persisted reports of the target cycle. Absent reports mean a fresh run.
pub fn prepare_payouts(
    blueprint: CyclePayoutBlueprint,
    baker: &Address,
    reporter: &dyn ReporterEngine,
) -> Result<PreparePayoutsResult> {
    let past_reports = reporter.read_payout_reports(blueprint.cycle)?;
    let past_reports = filter_reports_by_baker(&past_reports, baker);

    let mut valid_payouts = Vec::new();
    let mut invalid_payouts = Vec::new();
    let mut reports_of_past_successful = Vec::new();

    for recipe in &blueprint.payouts {
        if !recipe.is_valid {
            invalid_payouts.push(recipe.clone());
            continue;
        }
        match past_reports
            .iter()
            .find(|report| report.is_success && report.matches_recipe(recipe))
        {
            Some(report) => reports_of_past_successful.push(report.clone()),
            None => valid_payouts.push(recipe.clone()),
        }
    }

    log::debug!(
        "prepared payouts for cycle {}: {} pending, {} already successful, {} invalid",
        blueprint.cycle,
        valid_payouts.len(),
        reports_of_past_successful.len(),
        invalid_payouts.len()
    );

    Ok(PreparePayoutsResult {
        baker: baker.clone(),
        blueprint,
        valid_payouts,
        invalid_payouts,
        reports_of_past_successful,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressKind;
    use crate::engines::OpLimits;
    use crate::enums::{PayoutKind, TxKind};
    use crate::recipe::CyclePayoutSummary;
    use crate::reports_store::FsReporter;
    use chrono::Utc;

    fn tz(seed: u8) -> Address {
        Address::from_payload(AddressKind::Tz1, &[seed; 20])
    }

    fn recipe(seed: u8, valid: bool) -> PayoutRecipe {
        PayoutRecipe {
            delegator: tz(seed),
            recipient: tz(seed),
            kind: if valid {
                PayoutKind::DelegatorReward
            } else {
                PayoutKind::Invalid
            },
            tx_kind: TxKind::Tez,
            fa_contract: None,
            fa_token_id: None,
            delegated_balance: 1_000_000,
            amount: if valid { 50_000 } else { 0 },
            fee_rate_bps: 500,
            fee: 0,
            op_limits: valid.then_some(OpLimits {
                gas_limit: 1_000,
                storage_limit: 0,
                transaction_fee: 300,
                allocation_fee: 0,
                serialized_size: 120,
            }),
            note: String::new(),
            is_valid: valid,
        }
    }

    fn blueprint(recipes: Vec<PayoutRecipe>) -> CyclePayoutBlueprint {
        CyclePayoutBlueprint {
            cycle: 500,
            payouts: recipes,
            summary: CyclePayoutSummary {
                cycle: 500,
                delegators: 0,
                paid_delegators: 0,
                staking_balance: 0,
                earned_fees: 0,
                earned_rewards: 0,
                distributed_rewards: 0,
                bond_income: 0,
                fee_income: 0,
                income_total: 0,
                donated_bonds: 0,
                donated_fees: 0,
                donated_total: 0,
                timestamp: Utc::now(),
            },
        }
    }

    #[test]
    fn test_fresh_run_keeps_all_valid() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = FsReporter::new(dir.path());
        let result = prepare_payouts(
            blueprint(vec![recipe(1, true), recipe(2, false)]),
            &tz(9),
            &reporter,
        )
        .unwrap();
        assert_eq!(result.valid_payouts.len(), 1);
        assert_eq!(result.invalid_payouts.len(), 1);
        assert!(result.reports_of_past_successful.is_empty());
    }

    #[test]
    fn test_second_run_excludes_settled_recipients() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = FsReporter::new(dir.path());
        let baker = tz(9);

        let settled = PayoutReport::from_recipe(&recipe(1, true), &baker, 500, "oo1", true, "");
        let failed = PayoutReport::from_recipe(&recipe(2, true), &baker, 500, "oo2", false, "");
        reporter.report_payouts(&[settled, failed]).unwrap();

        let result = prepare_payouts(
            blueprint(vec![recipe(1, true), recipe(2, true), recipe(3, true)]),
            &baker,
            &reporter,
        )
        .unwrap();
        // recipe 1 settled; recipe 2 failed last time and is retried
        assert_eq!(result.reports_of_past_successful.len(), 1);
        assert_eq!(result.valid_payouts.len(), 2);
        assert!(result
            .valid_payouts
            .iter()
            .all(|r| r.delegator != tz(1)));
    }

    #[test]
    fn test_reports_of_other_baker_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = FsReporter::new(dir.path());
        let other = PayoutReport::from_recipe(&recipe(1, true), &tz(8), 500, "oo1", true, "");
        reporter.report_payouts(&[other]).unwrap();

        let result =
            prepare_payouts(blueprint(vec![recipe(1, true)]), &tz(9), &reporter).unwrap();
        assert_eq!(result.valid_payouts.len(), 1);
    }
}
