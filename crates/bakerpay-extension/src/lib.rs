// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BAKERPAY - EXTENSION HOOK DISPATCHER
//
// Invokes registered extensions at pipeline hook points over JSON-RPC
// 2.0. Read-only hooks are fire-and-forget notifications; read-write
// hooks replace the payload with the extension's result. MethodNotFound
// means "hook not implemented" and is never an error.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod rpc;
pub mod stdio;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use bakerpay_core::config::ExtensionDefinition;
use bakerpay_core::engines::HookDispatcher;
use bakerpay_core::enums::{
    ExtensionErrorAction, ExtensionLifespan, ExtensionRpcKind, Hook, HookMode,
};
use bakerpay_core::error::{PayoutError, Result};

use crate::rpc::{HookPayload, RpcResponse};
use crate::stdio::StdioEndpoint;

/// Transport side of one loaded extension.
#[async_trait]
pub trait ExtensionEndpoint: Send {
    async fn request(
        &mut self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<RpcResponse>;
    async fn notify(&mut self, method: &str, params: Value, timeout: Duration) -> Result<()>;
    async fn close(&mut self);
}

struct Extension {
    definition: ExtensionDefinition,
    endpoint: Option<Box<dyn ExtensionEndpoint>>,
}

impl std::fmt::Debug for Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extension")
            .field("definition", &self.definition)
            .field("endpoint", &self.endpoint.is_some())
            .finish()
    }
}

impl Extension {
    fn load(&mut self) -> Result<()> {
        if self.endpoint.is_some() {
            return Ok(());
        }
        log::debug!("loading extension {}", self.definition.name);
        let endpoint = StdioEndpoint::spawn(
            &self.definition.name,
            &self.definition.command,
            &self.definition.args,
        )?;
        self.endpoint = Some(Box::new(endpoint));
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut endpoint) = self.endpoint.take() {
            log::debug!("closing extension {}", self.definition.name);
            endpoint.close().await;
        }
    }

    /// Mode the definition registers for this hook. A specific hook entry
    /// overrides an `all` entry; test hooks have fixed modes.
    fn matched_mode(&self, hook: Hook) -> Option<HookMode> {
        if hook == Hook::TestNotify {
            return Some(HookMode::ReadOnly);
        }
        if hook == Hook::TestRequest {
            return Some(HookMode::ReadWrite);
        }
        let mut matched = None;
        for spec in &self.definition.hooks {
            if spec.id == hook {
                return Some(spec.mode);
            }
            if spec.id == Hook::All {
                matched = Some(spec.mode);
            }
        }
        matched
    }
}

/// Registered extensions in invocation order.
pub struct ExtensionStore {
    extensions: Vec<Mutex<Extension>>,
}

impl std::fmt::Debug for ExtensionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionStore")
            .field("extensions", &self.extensions)
            .finish()
    }
}

impl ExtensionStore {
    /// Register extensions from configuration. Only stdio transports are
    /// supported; other declared kinds are rejected here.
    pub fn register(definitions: &[ExtensionDefinition]) -> Result<ExtensionStore> {
        let mut extensions = Vec::with_capacity(definitions.len());
        for definition in definitions {
            if definition.kind != ExtensionRpcKind::Stdio {
                return Err(PayoutError::Configuration(format!(
                    "extension '{}': transport {:?} is not supported (only stdio)",
                    definition.name, definition.kind
                )));
            }
            extensions.push(Mutex::new(Extension {
                definition: definition.clone(),
                endpoint: None,
            }));
        }
        Ok(ExtensionStore { extensions })
    }

    /// Test/bench constructor with pre-loaded endpoints.
    pub fn with_endpoints(
        pairs: Vec<(ExtensionDefinition, Box<dyn ExtensionEndpoint>)>,
    ) -> ExtensionStore {
        ExtensionStore {
            extensions: pairs
                .into_iter()
                .map(|(definition, endpoint)| {
                    Mutex::new(Extension {
                        definition,
                        endpoint: Some(endpoint),
                    })
                })
                .collect(),
        }
    }

    async fn invoke_once(
        extension: &mut Extension,
        hook: Hook,
        mode: HookMode,
        version: &str,
        data: &mut Value,
        changed: &mut bool,
    ) -> Result<()> {
        extension.load()?;
        let endpoint = extension.endpoint.as_mut().expect("loaded above");
        let timeout = Duration::from_secs(extension.definition.timeout_s);
        let params = serde_json::to_value(HookPayload {
            version: version.to_string(),
            data: data.clone(),
        })
        .expect("envelope serialization cannot fail");

        match mode {
            HookMode::ReadOnly => endpoint.notify(hook.method(), params, timeout).await,
            HookMode::ReadWrite => {
                let response = endpoint.request(hook.method(), params, timeout).await?;
                if response.is_method_not_found() {
                    // extensions are not required to implement every hook
                    return Ok(());
                }
                if let Some(error) = response.error {
                    return Err(PayoutError::Hook {
                        hook: hook.to_string(),
                        message: format!("{} (code {})", error.message, error.code),
                    });
                }
                if let Some(result) = response.result {
                    *data = result;
                    *changed = true;
                }
                Ok(())
            }
        }
    }
}

#[async_trait]
impl HookDispatcher for ExtensionStore {
    async fn dispatch(
        &self,
        hook: Hook,
        version: &str,
        data: Value,
    ) -> Result<Option<Value>> {
        let mut current = data;
        let mut changed = false;

        for entry in &self.extensions {
            let mut extension = entry.lock().await;
            let mode = match extension.matched_mode(hook) {
                Some(mode) => mode,
                None => continue,
            };
            log::debug!(
                "executing hook {} with mode {:?} on extension {}",
                hook,
                mode,
                extension.definition.name
            );

            let attempts = extension.definition.retry.max(1);
            let retry_delay = Duration::from_secs(extension.definition.retry_delay_s);
            let mut outcome = Ok(());
            for attempt in 0..attempts {
                if attempt > 0 {
                    tokio::time::sleep(retry_delay).await;
                }
                outcome = Self::invoke_once(
                    &mut extension,
                    hook,
                    mode,
                    version,
                    &mut current,
                    &mut changed,
                )
                .await;
                if outcome.is_ok() {
                    break;
                }
            }

            if extension.definition.lifespan == ExtensionLifespan::Transient {
                extension.close().await;
            }

            if let Err(err) = outcome {
                match extension.definition.error_action {
                    ExtensionErrorAction::Continue => {
                        log::warn!(
                            "extension {} failed on {} - {} (continuing)",
                            extension.definition.name,
                            hook,
                            err
                        );
                    }
                    ExtensionErrorAction::Stop => return Err(err),
                }
            }
        }

        Ok(changed.then_some(current))
    }

    async fn close_scoped(&self) {
        for entry in &self.extensions {
            let mut extension = entry.lock().await;
            if extension.definition.lifespan == ExtensionLifespan::Scoped {
                extension.close().await;
            }
        }
    }

    async fn close_all(&self) {
        for entry in &self.extensions {
            entry.lock().await.close().await;
        }
    }
}
