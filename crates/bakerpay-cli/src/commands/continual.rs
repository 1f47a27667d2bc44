// `continual` - drives the cycle monitor and pays out every completed
// cycle automatically. Per-cycle failures are reported and the loop
// continues with the next cycle.

use std::path::Path;
use std::sync::Arc;

use bakerpay_core::engines::{
    ExecutePayoutsEngines, ExecutePayoutsOptions, GeneratePayoutsEngines, GeneratePayoutsOptions,
};
use bakerpay_core::error::Result;
use bakerpay_core::execute::execute_payouts;
use bakerpay_core::generate::generate_payouts;
use bakerpay_core::monitor::{CycleMonitor, CycleMonitorOptions};
use bakerpay_core::prepare::prepare_payouts;
use bakerpay_core::protected::ProtectedSection;
use bakerpay_core::reports_store::FsReporter;

use crate::commands::common::{admin_notifier, load_configuration_and_engines, Engines};
use crate::notifications;
use crate::print_info;

async fn pay_cycle(engines: &Engines, workdir: &Path, cycle: i64) -> Result<usize> {
    let config = engines.config.clone();
    let admin_notify = admin_notifier(&config);

    let blueprint = generate_payouts(
        config.clone(),
        GeneratePayoutsEngines {
            collector: engines.collector.clone(),
            signer: engines.signer.clone(),
            hooks: engines.hooks.clone(),
            admin_notify: admin_notify.clone(),
        },
        &GeneratePayoutsOptions {
            cycle,
            skip_balance_check: false,
            // unattended: hold the cycle until the wallet is funded
            wait_for_sufficient_balance: true,
        },
    )
    .await?;

    let reporter = FsReporter::new(workdir);
    let prepared = prepare_payouts(blueprint, &config.baker, &reporter)?;
    if prepared.valid_payouts.is_empty() {
        log::info!("cycle {}: nothing to pay out", cycle);
        return Ok(0);
    }

    let section = Arc::new(ProtectedSection::new());
    section.install_os_handler();
    let results = execute_payouts(
        &prepared,
        &ExecutePayoutsEngines {
            collector: engines.collector.clone(),
            signer: engines.signer.clone(),
            transactor: engines.transactor.clone(),
            admin_notify: admin_notify.clone(),
        },
        &reporter,
        &ExecutePayoutsOptions::default(),
        section,
    )
    .await?;
    engines.hooks.close_scoped().await;

    let failed = results.iter().filter(|r| !r.is_success()).count();
    if failed > 0 {
        (admin_notify)(&format!(
            "cycle {}: {} of {} batches failed",
            cycle,
            failed,
            results.len()
        ));
    } else {
        notifications::notify_payouts_processed(
            &config.notifications,
            &prepared.blueprint.summary,
            None,
        )
        .await;
    }
    Ok(results.len())
}

pub async fn run(
    config_path: &Path,
    workdir: &Path,
    notification_delay: i64,
    check_frequency: u64,
) -> Result<()> {
    let engines = load_configuration_and_engines(config_path, workdir).await?;

    let mut monitor = CycleMonitor::spawn(
        engines.collector.clone(),
        CycleMonitorOptions {
            notification_delay,
            check_frequency_secs: check_frequency,
        },
    );
    print_info("tracking cycles... (cancel with Ctrl-C)");

    // Ctrl-C cancels the monitor; the stream then closes and the loop ends
    {
        let monitor_cancel = monitor.cancel_handle();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            log::warn!("interrupt received, stopping cycle monitor");
            monitor_cancel();
        });
    }

    while let Some(cycle) = monitor.next_completed_cycle().await {
        log::info!("cycle {} completed, starting payout", cycle);
        match pay_cycle(&engines, workdir, cycle).await {
            Ok(batches) => log::info!("cycle {} paid out in {} batches", cycle, batches),
            Err(err) => {
                log::error!("failed to pay out cycle {} - {}", cycle, err);
                (admin_notifier(&engines.config))(&format!(
                    "failed to pay out cycle {} - {}",
                    cycle, err
                ));
            }
        }
    }

    engines.hooks.close_all().await;
    print_info("cycle monitor stopped");
    Ok(())
}
