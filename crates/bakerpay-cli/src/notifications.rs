// Notificator backends. Failures are logged warnings, never errors.

use bakerpay_core::config::RuntimeNotificatorConfiguration;
use bakerpay_core::error::{PayoutError, Result};
use bakerpay_core::recipe::CyclePayoutSummary;

pub async fn payout_summary_notify(
    configuration: &RuntimeNotificatorConfiguration,
    summary: &CyclePayoutSummary,
) -> Result<()> {
    match configuration.kind.as_str() {
        "stdout" => {
            let line = serde_json::to_string(summary)
                .map_err(|e| PayoutError::Input(e.to_string()))?;
            println!("PAYOUTS PROCESSED: {}", line);
            Ok(())
        }
        "webhook" => {
            let url = configuration
                .url
                .as_deref()
                .ok_or_else(|| PayoutError::Configuration("webhook notificator has no url".into()))?;
            let payload = serde_json::json!({
                "event": "payouts_processed",
                "cycle": summary.cycle,
                "summary": summary,
            });
            post_webhook(url, &payload).await
        }
        other => Err(PayoutError::Configuration(format!(
            "unknown notificator type '{}'",
            other
        ))),
    }
}

pub async fn admin_notify(
    configuration: &RuntimeNotificatorConfiguration,
    message: &str,
) -> Result<()> {
    match configuration.kind.as_str() {
        "stdout" => {
            println!("ADMIN: {}", message);
            Ok(())
        }
        "webhook" => {
            let url = configuration
                .url
                .as_deref()
                .ok_or_else(|| PayoutError::Configuration("webhook notificator has no url".into()))?;
            let payload = serde_json::json!({
                "event": "admin_notification",
                "message": message,
            });
            post_webhook(url, &payload).await
        }
        other => Err(PayoutError::Configuration(format!(
            "unknown notificator type '{}'",
            other
        ))),
    }
}

async fn post_webhook(url: &str, payload: &serde_json::Value) -> Result<()> {
    let response = reqwest::Client::new()
        .post(url)
        .json(payload)
        .send()
        .await
        .map_err(|e| PayoutError::Input(format!("webhook delivery failed: {}", e)))?;
    if !response.status().is_success() {
        return Err(PayoutError::Input(format!(
            "webhook returned {}",
            response.status()
        )));
    }
    Ok(())
}

/// Notify every configured notificator, optionally filtered by type.
pub async fn notify_payouts_processed(
    configurations: &[RuntimeNotificatorConfiguration],
    summary: &CyclePayoutSummary,
    filter: Option<&str>,
) {
    for configuration in configurations {
        if let Some(filter) = filter {
            if configuration.kind != filter {
                continue;
            }
        }
        log::info!("sending notification with {}", configuration.kind);
        if let Err(err) = payout_summary_notify(configuration, summary).await {
            log::warn!("failed to send notification - {}", err);
        }
    }
}

pub async fn notify_admins(configurations: &[RuntimeNotificatorConfiguration], message: &str) {
    for configuration in configurations.iter().filter(|c| c.is_admin) {
        log::info!("sending admin notification with {}", configuration.kind);
        if let Err(err) = admin_notify(configuration, message).await {
            log::warn!("failed to send admin notification - {}", err);
        }
    }
}
