// `pay` - manual payout for one cycle.

use std::path::PathBuf;
use std::sync::Arc;

use bakerpay_core::engines::{
    ExecutePayoutsEngines, ExecutePayoutsOptions, GeneratePayoutsEngines, GeneratePayoutsOptions,
};
use bakerpay_core::error::{PayoutError, Result};
use bakerpay_core::execute::execute_payouts;
use bakerpay_core::generate::generate_payouts;
use bakerpay_core::prepare::prepare_payouts;
use bakerpay_core::protected::ProtectedSection;
use bakerpay_core::recipe::{only_valid, CyclePayoutBlueprint};
use bakerpay_core::reports_store::{FsReporter, ReporterEngine, StdioReporter};

use crate::commands::common::{admin_notifier, load_configuration_and_engines, require_confirmation};
use crate::notifications;
use crate::print;
use crate::print_info;

pub struct PayArgs {
    pub config_path: PathBuf,
    pub workdir: PathBuf,
    pub cycle: i64,
    pub from_file: Option<PathBuf>,
    pub to_file: Option<PathBuf>,
    pub confirm: bool,
    pub skip_balance_check: bool,
    pub wait_for_balance: bool,
    pub mix_in_contract_calls: bool,
    pub mix_in_fa_transfers: bool,
    pub silent: bool,
    pub notificator: Option<String>,
    pub report_to_stdout: bool,
}

fn load_blueprint_from_file(path: &PathBuf) -> Result<CyclePayoutBlueprint> {
    log::info!("reading payouts from '{}'", path.display());
    let body = std::fs::read_to_string(path).map_err(|e| {
        PayoutError::PayoutsRead(format!("failed to read payouts from file - {}", e))
    })?;
    CyclePayoutBlueprint::from_json(&body)
        .map_err(|e| PayoutError::PayoutsRead(e.to_string()))
}

pub async fn run(args: PayArgs) -> Result<()> {
    let engines = load_configuration_and_engines(&args.config_path, &args.workdir).await?;
    let config = engines.config.clone();
    let admin_notify = admin_notifier(&config);

    let cycle = if args.cycle <= 0 {
        let last_completed = engines.collector.get_last_completed_cycle().await?;
        last_completed + args.cycle
    } else {
        args.cycle
    };

    let blueprint = match &args.from_file {
        Some(path) => load_blueprint_from_file(path)?,
        None => {
            generate_payouts(
                config.clone(),
                GeneratePayoutsEngines {
                    collector: engines.collector.clone(),
                    signer: engines.signer.clone(),
                    hooks: engines.hooks.clone(),
                    admin_notify: admin_notify.clone(),
                },
                &GeneratePayoutsOptions {
                    cycle,
                    skip_balance_check: args.skip_balance_check,
                    wait_for_sufficient_balance: args.wait_for_balance,
                },
            )
            .await?
        }
    };

    if let Some(path) = &args.to_file {
        log::info!("writing payouts to '{}'", path.display());
        std::fs::write(path, blueprint.to_json()?).map_err(|e| {
            PayoutError::Reporting(format!("failed to write generated payouts - {}", e))
        })?;
    }

    log::info!("checking past reports");
    let fs_reporter = FsReporter::new(&args.workdir);
    let prepared = prepare_payouts(blueprint, &config.baker, &fs_reporter)?;

    print::print_invalid_payout_recipes(&prepared.invalid_payouts, cycle);
    print::print_reports(
        &prepared.reports_of_past_successful,
        &format!("Already Successful - #{}", cycle),
    );
    print::print_valid_payout_recipes(&prepared.valid_payouts, cycle);

    if only_valid(&prepared.valid_payouts).is_empty() {
        log::info!("nothing to pay out");
        if let Some(filter) = &args.notificator {
            notifications::notify_payouts_processed(
                &config.notifications,
                &prepared.blueprint.summary,
                Some(filter),
            )
            .await;
        }
        engines.hooks.close_all().await;
        return Ok(());
    }

    if !args.confirm {
        require_confirmation("Do you want to pay out the above VALID payouts?")?;
    }

    log::info!("executing payout");
    let section = Arc::new(ProtectedSection::new());
    section.install_os_handler();
    let reporter: Box<dyn ReporterEngine> = if args.report_to_stdout {
        Box::new(StdioReporter)
    } else {
        Box::new(FsReporter::new(&args.workdir))
    };
    let results = execute_payouts(
        &prepared,
        &ExecutePayoutsEngines {
            collector: engines.collector.clone(),
            signer: engines.signer.clone(),
            transactor: engines.transactor.clone(),
            admin_notify: admin_notify.clone(),
        },
        reporter.as_ref(),
        &ExecutePayoutsOptions {
            mix_in_contract_calls: args.mix_in_contract_calls,
            mix_in_fa_transfers: args.mix_in_fa_transfers,
        },
        section,
    )
    .await?;
    engines.hooks.close_all().await;

    print::print_batch_results(
        &results,
        &format!("Results of #{}", cycle),
        &config.network.explorer_url,
    );

    let failed = results.iter().filter(|r| !r.is_success()).count();
    if failed > 0 {
        return Err(PayoutError::Dispatch(format!(
            "{} of {} batches failed",
            failed,
            results.len()
        )));
    }

    if !args.silent {
        notifications::notify_payouts_processed(
            &config.notifications,
            &prepared.blueprint.summary,
            args.notificator.as_deref(),
        )
        .await;
    }
    print_info("payout finished");
    Ok(())
}
