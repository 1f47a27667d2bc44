// ─────────────────────────────────────────────────────────────────
// Execution loop. Batches are signed, broadcast, and confirmed in
// order inside a protected section; a partial report is written after
// every batch so a crash or interrupt can be reconciled on the next
// run. Per-batch failures are recorded, never propagated mid-loop.
// ─────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::address::Address;
use crate::batch::{split_into_batches, BatchingConfiguration};
use crate::engines::{DispatchOptions, ExecutePayoutsEngines, ExecutePayoutsOptions};
use crate::error::{BatchErrorKind, Result};
use crate::ops::OpExecutionContext;
use crate::prepare::PreparePayoutsResult;
use crate::protected::ProtectedSection;
use crate::recipe::RecipeBatch;
use crate::report::PayoutReport;
use crate::reports_store::ReporterEngine;

/// Per-batch progress through dispatch.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Pending,
    Building,
    Dispatched,
    FailedBuild,
    Confirmed,
    FailedBroadcast,
    FailedConfirm,
    UserTerminated,
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub batch: RecipeBatch,
    pub op_hash: String,
    pub status: BatchStatus,
    pub error_kind: Option<BatchErrorKind>,
    pub error_message: String,
}

impl BatchResult {
    pub fn is_success(&self) -> bool {
        self.status == BatchStatus::Confirmed
    }

    fn success(batch: RecipeBatch, op_hash: String) -> BatchResult {
        BatchResult {
            batch,
            op_hash,
            status: BatchStatus::Confirmed,
            error_kind: None,
            error_message: String::new(),
        }
    }

    fn failed(
        batch: RecipeBatch,
        op_hash: String,
        status: BatchStatus,
        kind: BatchErrorKind,
        message: String,
    ) -> BatchResult {
        BatchResult {
            batch,
            op_hash,
            status,
            error_kind: Some(kind),
            error_message: message,
        }
    }

    pub fn to_reports(&self, baker: &Address, cycle: i64) -> Vec<PayoutReport> {
        self.batch
            .0
            .iter()
            .map(|recipe| {
                PayoutReport::from_recipe(
                    recipe,
                    baker,
                    cycle,
                    &self.op_hash,
                    self.is_success(),
                    &self.error_message,
                )
            })
            .collect()
    }
}

pub type BatchResults = Vec<BatchResult>;

fn results_to_reports(results: &[BatchResult], baker: &Address, cycle: i64) -> Vec<PayoutReport> {
    results
        .iter()
        .flat_map(|r| r.to_reports(baker, cycle))
        .collect()
}

async fn execute_payout_batch(
    engines: &ExecutePayoutsEngines,
    section: &ProtectedSection,
    batch_id: &str,
    batch: RecipeBatch,
    source: &Address,
    dispatch_options: &DispatchOptions,
) -> BatchResult {
    log::info!("creating batch {} ({} transactions)", batch_id, batch.len());
    let mut op = match batch.to_operation(source, dispatch_options.ttl) {
        Ok(op) => op,
        Err(err) => {
            log::warn!("batch {} - {}", batch_id, err);
            return BatchResult::failed(
                batch,
                String::new(),
                BatchStatus::FailedBuild,
                BatchErrorKind::OperationContextCreationFailed,
                err.to_string(),
            );
        }
    };
    let build_result = async {
        engines
            .transactor
            .complete(&mut op, &engines.signer.public_key())
            .await?;
        engines.signer.sign(&mut op).await
    }
    .await;
    if let Err(err) = build_result {
        log::warn!("batch {} - {}", batch_id, err);
        return BatchResult::failed(
            batch,
            String::new(),
            BatchStatus::FailedBuild,
            BatchErrorKind::OperationContextCreationFailed,
            err.to_string(),
        );
    }

    log::info!("broadcasting batch {}", batch_id);
    let mut op_ctx = OpExecutionContext::new(op);
    if let Err(err) = op_ctx
        .dispatch(engines.transactor.as_ref(), dispatch_options)
        .await
    {
        log::warn!("failed to broadcast batch {} - {}", batch_id, err);
        return BatchResult::failed(
            batch,
            op_ctx.op_hash(),
            BatchStatus::FailedBroadcast,
            BatchErrorKind::OperationBroadcastFailed,
            err.to_string(),
        );
    }

    log::info!(
        "waiting for confirmation of batch {} ({})",
        batch_id,
        op_ctx.op_hash()
    );
    // pause the protected section so an interrupt can cancel the wait
    match section.interruptible(op_ctx.wait_for_apply()).await {
        Some(Ok(())) => {
            log::info!("batch {} - success", batch_id);
            BatchResult::success(batch, op_ctx.op_hash())
        }
        Some(Err(err)) => {
            log::warn!("failed to apply batch {} - {}", batch_id, err);
            BatchResult::failed(
                batch,
                op_ctx.op_hash(),
                BatchStatus::FailedConfirm,
                BatchErrorKind::OperationConfirmationFailed,
                err.to_string(),
            )
        }
        None => {
            log::warn!("confirmation wait of batch {} canceled by user", batch_id);
            BatchResult::failed(
                batch,
                op_ctx.op_hash(),
                BatchStatus::UserTerminated,
                BatchErrorKind::UserTerminated,
                "terminated by user".to_string(),
            )
        }
    }
}

/// `Execute(Batches, context) -> BatchResults`. Always returns the
/// per-batch result vector; the caller decides whether failures propagate.
pub async fn execute_payouts(
    prepared: &PreparePayoutsResult,
    engines: &ExecutePayoutsEngines,
    reporter: &dyn ReporterEngine,
    options: &ExecutePayoutsOptions,
    section: Arc<ProtectedSection>,
) -> Result<BatchResults> {
    let cycle = prepared.blueprint.cycle;
    let baker = prepared.baker.clone();

    let batching = BatchingConfiguration {
        mix_in_contract_calls: options.mix_in_contract_calls,
        mix_in_fa_transfers: options.mix_in_fa_transfers,
        ..Default::default()
    };
    let batches = split_into_batches(&prepared.valid_payouts, &batching);
    let batch_count = batches.len();
    let source = engines.signer.pkh();
    let dispatch_options = DispatchOptions::default();

    section.start();
    log::info!("paying out in {} batches", batch_count);
    let mut results: BatchResults = Vec::with_capacity(batch_count);
    let mut termination_notified = false;
    for (index, batch) in batches.into_iter().enumerate() {
        // cumulative partial report for crash recovery
        if let Err(err) = reporter.report_payouts(&results_to_reports(&results, &baker, cycle)) {
            log::warn!("failed to write partial report of payouts - {}", err);
        }

        if section.signaled() {
            results.push(BatchResult::failed(
                batch,
                String::new(),
                BatchStatus::UserTerminated,
                BatchErrorKind::UserTerminated,
                "terminated by user".to_string(),
            ));
            if !termination_notified {
                (engines.admin_notify)("Payouts execution terminated by user");
                termination_notified = true;
            }
            continue;
        }

        let batch_id = format!("{}/{}", index + 1, batch_count);
        results.push(
            execute_payout_batch(
                engines,
                &section,
                &batch_id,
                batch,
                &source,
                &dispatch_options,
            )
            .await,
        );
    }

    // final combined report: this run's results plus prior-run successes
    let mut failure_detected = false;
    let mut all_reports = results_to_reports(&results, &baker, cycle);
    all_reports.extend(prepared.reports_of_past_successful.iter().cloned());
    if let Err(err) = reporter.report_payouts(&all_reports) {
        log::warn!("failed to report sent payouts - {}", err);
        failure_detected = true;
    }
    if let Err(err) = reporter.report_invalid_payouts(cycle, &prepared.invalid_payouts) {
        log::warn!("failed to report invalid payouts - {}", err);
        failure_detected = true;
    }
    if let Err(err) = reporter.report_cycle_summary(&prepared.blueprint.summary) {
        log::warn!("failed to report cycle summary - {}", err);
        failure_detected = true;
    }
    if !failure_detected {
        log::info!("all payout reports written successfully");
    }

    section.stop();
    Ok(results)
}
