// Shared command plumbing: configuration + engine loading and the
// interactive confirmation prompt.

use std::io::{BufRead, IsTerminal, Write};
use std::path::Path;
use std::sync::Arc;

use bakerpay_core::config::{load_configuration, RuntimeConfiguration};
use bakerpay_core::engines::{
    AdminNotifier, CollectorEngine, HookDispatcher, NoopHookDispatcher, SignerEngine,
    TransactorEngine,
};
use bakerpay_core::error::{PayoutError, Result};
use bakerpay_clients::{load_signer, DefaultCollector, DefaultTransactor};
use bakerpay_extension::ExtensionStore;

use crate::notifications;

pub struct Engines {
    pub config: RuntimeConfiguration,
    pub collector: Arc<dyn CollectorEngine>,
    pub signer: Arc<dyn SignerEngine>,
    pub transactor: Arc<dyn TransactorEngine>,
    pub hooks: Arc<dyn HookDispatcher>,
}

pub async fn load_configuration_and_engines(
    config_path: &Path,
    workdir: &Path,
) -> Result<Engines> {
    let config = load_configuration(config_path)?;

    let signer = load_signer(config.payouts.wallet_mode, workdir, None)
        .await
        .map_err(|e| PayoutError::Signer(format!("failed to load signer - {}", e)))?;
    let collector =
        DefaultCollector::connect(&config.network.rpc_url, &config.network.indexer_url).await?;
    let transactor =
        DefaultTransactor::connect(&config.network.rpc_url, &config.network.indexer_url).await?;

    let hooks: Arc<dyn HookDispatcher> = if config.extensions.is_empty() {
        Arc::new(NoopHookDispatcher)
    } else {
        Arc::new(ExtensionStore::register(&config.extensions)?)
    };

    Ok(Engines {
        config,
        collector: Arc::new(collector),
        signer,
        transactor: Arc::new(transactor),
        hooks,
    })
}

/// Prompt the operator for a yes/no confirmation. Refuses when stdout is
/// not a terminal, so unattended runs must pass `--confirm`.
pub fn require_confirmation(message: &str) -> Result<()> {
    if !std::io::stdout().is_terminal() {
        return Err(PayoutError::Canceled);
    }
    print!("{} [y/N]: ", message);
    std::io::stdout()
        .flush()
        .map_err(|e| PayoutError::Input(e.to_string()))?;
    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(|e| PayoutError::Input(e.to_string()))?;
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => Ok(()),
        _ => Err(PayoutError::Canceled),
    }
}

/// Admin-notify closure handed to the pipeline; fans out to all
/// admin-flagged notificators in the background.
pub fn admin_notifier(config: &RuntimeConfiguration) -> AdminNotifier {
    let configurations = config.notifications.clone();
    Arc::new(move |message: &str| {
        let configurations = configurations.clone();
        let message = message.to_string();
        tokio::spawn(async move {
            notifications::notify_admins(&configurations, &message).await;
        });
    })
}
