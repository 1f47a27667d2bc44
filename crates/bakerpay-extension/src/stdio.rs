// Extension endpoint speaking line-delimited JSON-RPC over a child
// process's stdio.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use bakerpay_core::error::{PayoutError, Result};

use crate::rpc::{RpcRequest, RpcResponse, CLOSE_METHOD};
use crate::ExtensionEndpoint;

pub struct StdioEndpoint {
    name: String,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
}

fn hook_error(name: &str, message: String) -> PayoutError {
    PayoutError::Hook {
        hook: name.to_string(),
        message,
    }
}

impl StdioEndpoint {
    pub fn spawn(name: &str, command: &str, args: &[String]) -> Result<StdioEndpoint> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| hook_error(name, format!("failed to spawn '{}': {}", command, e)))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| hook_error(name, "extension stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| hook_error(name, "extension stdout unavailable".to_string()))?;
        Ok(StdioEndpoint {
            name: name.to_string(),
            child,
            stdin,
            stdout: BufReader::new(stdout),
            next_id: 1,
        })
    }

    async fn write_line(&mut self, request: &RpcRequest) -> Result<()> {
        let mut line = serde_json::to_vec(request)
            .map_err(|e| hook_error(&self.name, e.to_string()))?;
        line.push(b'\n');
        self.stdin
            .write_all(&line)
            .await
            .map_err(|e| hook_error(&self.name, format!("write failed: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| hook_error(&self.name, format!("flush failed: {}", e)))
    }

    /// Read lines until the response with the given id arrives. Extensions
    /// may interleave unrelated output; non-matching lines are skipped.
    async fn read_response(&mut self, id: u64) -> Result<RpcResponse> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = self
                .stdout
                .read_line(&mut line)
                .await
                .map_err(|e| hook_error(&self.name, format!("read failed: {}", e)))?;
            if read == 0 {
                return Err(hook_error(&self.name, "extension closed stdout".to_string()));
            }
            match serde_json::from_str::<RpcResponse>(line.trim()) {
                Ok(response) if response.id == Some(id) => return Ok(response),
                Ok(_) => continue,
                Err(_) => {
                    log::trace!("extension {} noise: {}", self.name, line.trim());
                    continue;
                }
            }
        }
    }
}

#[async_trait]
impl ExtensionEndpoint for StdioEndpoint {
    async fn request(
        &mut self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<RpcResponse> {
        let id = self.next_id;
        self.next_id += 1;
        let request = RpcRequest::new(id, method, params);
        self.write_line(&request).await?;
        tokio::time::timeout(timeout, self.read_response(id))
            .await
            .map_err(|_| hook_error(&self.name, format!("request '{}' timed out", method)))?
    }

    async fn notify(&mut self, method: &str, params: Value, timeout: Duration) -> Result<()> {
        let request = RpcRequest::notification(method, params);
        tokio::time::timeout(timeout, self.write_line(&request))
            .await
            .map_err(|_| hook_error(&self.name, format!("notify '{}' timed out", method)))?
    }

    async fn close(&mut self) {
        let close = RpcRequest::notification(CLOSE_METHOD, Value::Null);
        let _ = self.write_line(&close).await;
        // give the extension a moment to exit on its own
        let graceful =
            tokio::time::timeout(Duration::from_millis(500), self.child.wait()).await;
        if graceful.is_err() {
            let _ = self.child.kill().await;
        }
    }
}
