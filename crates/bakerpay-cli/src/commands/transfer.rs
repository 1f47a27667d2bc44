// `transfer` - ad-hoc transfers from the payout wallet.

use std::path::Path;

use bakerpay_core::address::Address;
use bakerpay_core::engines::DispatchOptions;
use bakerpay_core::enums::TxKind;
use bakerpay_core::error::{PayoutError, Result};
use bakerpay_core::ops::{Operation, TransferArgs};
use bakerpay_core::{
    mutez_to_tez_string, tez_to_mutez, Mutez, DEFAULT_OPERATION_TTL,
    DEFAULT_REQUIRED_CONFIRMATIONS,
};

use crate::commands::common::{load_configuration_and_engines, require_confirmation};
use crate::print_success;

struct PlainTransfer {
    destination: Address,
    amount: Mutez,
}

impl TransferArgs for PlainTransfer {
    fn tx_kind(&self) -> TxKind {
        TxKind::Tez
    }
    fn destination(&self) -> &Address {
        &self.destination
    }
    fn amount(&self) -> Mutez {
        self.amount
    }
    fn fa_contract(&self) -> Option<&Address> {
        None
    }
    fn fa_token_id(&self) -> Option<u64> {
        None
    }
}

pub async fn run(
    config_path: &Path,
    workdir: &Path,
    args: Vec<String>,
    amounts_in_mutez: bool,
    confirm: bool,
) -> Result<()> {
    if args.is_empty() || args.len() % 2 != 0 {
        return Err(PayoutError::Input(
            "invalid number of arguments (expects pairs of destination and amount)".to_string(),
        ));
    }

    let mut transfers = Vec::with_capacity(args.len() / 2);
    let mut total: Mutez = 0;
    for pair in args.chunks(2) {
        let destination = Address::parse(&pair[0]).map_err(|e| {
            PayoutError::Input(format!("invalid destination address '{}' - {}", pair[0], e))
        })?;
        let amount: Mutez = if amounts_in_mutez {
            pair[1]
                .parse()
                .map_err(|e| PayoutError::Input(format!("invalid amount '{}' - {}", pair[1], e)))?
        } else {
            let tez: f64 = pair[1]
                .parse()
                .map_err(|e| PayoutError::Input(format!("invalid amount '{}' - {}", pair[1], e)))?;
            tez_to_mutez(tez)
        };
        if amount == 0 {
            return Err(PayoutError::Input(format!(
                "amount '{}' is zero after conversion",
                pair[1]
            )));
        }
        total += amount;
        transfers.push(PlainTransfer {
            destination,
            amount,
        });
    }

    let engines = load_configuration_and_engines(config_path, workdir).await?;

    if !confirm {
        let destinations: Vec<String> =
            transfers.iter().map(|t| t.destination.to_string()).collect();
        require_confirmation(&format!(
            "do you really want to transfer {} to {}",
            mutez_to_tez_string(total),
            destinations.join(", ")
        ))?;
    }

    let mut op = Operation::new()
        .with_source(engines.signer.pkh())
        .with_ttl(DEFAULT_OPERATION_TTL);
    for transfer in &transfers {
        op.add_transfer(transfer)?;
    }

    engines
        .transactor
        .complete(&mut op, &engines.signer.public_key())
        .await
        .map_err(|e| PayoutError::Dispatch(format!("failed to complete tx - {}", e)))?;
    engines
        .signer
        .sign(&mut op)
        .await
        .map_err(|e| PayoutError::Signer(format!("failed to sign tx - {}", e)))?;

    log::info!(
        "transferring tez... waiting for {} confirmations",
        DEFAULT_REQUIRED_CONFIRMATIONS
    );
    let result = engines
        .transactor
        .dispatch(&op, &DispatchOptions::default())
        .await
        .map_err(|e| PayoutError::Dispatch(format!("failed to dispatch tx - {}", e)))?;
    result.wait_for_apply().await?;

    print_success(&format!("transfer successful ({})", result.op_hash()));
    Ok(())
}
