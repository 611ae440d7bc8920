//! Command handler for processing IPC requests
//!
//! Translates IPC commands into interceptor operations and builds the
//! acknowledgment each request receives.

use serde_json::json;

use crate::common::{error::IpcError, Error, Result};
use crate::intercept::{Interceptor, OutputChannel, Registration, Resolution};
use crate::ipc::protocol::{Command, Response};

/// Handle an IPC command on behalf of `channel`
pub async fn handle_command(
    interceptor: &mut Interceptor,
    channel: &OutputChannel,
    id: u64,
    command: Command,
) -> Response {
    match handle_command_inner(interceptor, channel, command).await {
        Ok(result) => Response::success(id, result),
        Err(e) => Response::error(id, IpcError::from(&e)),
    }
}

async fn handle_command_inner(
    interceptor: &mut Interceptor,
    channel: &OutputChannel,
    command: Command,
) -> Result<serde_json::Value> {
    match command {
        // === Session Management ===
        Command::Attach { target } => {
            let registration = interceptor.attach(&target, channel).await?;
            Ok(json!({
                "status": "attached",
                "target": target,
                "already_attached": registration == Registration::AlreadyAttached,
            }))
        }

        Command::Detach { target } => {
            let detached = interceptor.detach(&target, channel).await;
            Ok(json!({
                "status": "detached",
                "target": target,
                "was_attached": detached,
            }))
        }

        // === Resolution ===
        Command::ContinueRequest { exchange_id, patch } => {
            let resolution = interceptor
                .continue_request(&exchange_id, patch.as_ref())
                .await;
            resolution_result("continued", resolution)
        }

        Command::ContinueResponse { exchange_id, patch } => {
            let resolution = interceptor
                .continue_response(&exchange_id, patch.as_ref())
                .await;
            resolution_result("fulfilled", resolution)
        }

        Command::Block { exchange_id } => {
            let resolution = interceptor.block(&exchange_id).await;
            resolution_result("blocked", resolution)
        }

        // === Inspection ===
        Command::FetchBody {
            target,
            exchange_id,
        } => {
            let body = interceptor.fetch_body(&target, &exchange_id, channel).await;
            Ok(serde_json::to_value(body)?)
        }

        Command::ListTargets => {
            let targets = interceptor.list_targets().await?;
            Ok(json!({ "targets": targets }))
        }

        Command::Status => Ok(serde_json::to_value(interceptor.status())?),

        // Handled by the server loop before dispatch
        Command::Shutdown => Err(Error::Internal(
            "shutdown must be handled by the daemon loop".to_string(),
        )),
    }
}

/// Unknown ids are a quiet no-op; transport failures surface as errors
fn resolution_result(action: &str, resolution: Resolution) -> Result<serde_json::Value> {
    match resolution {
        Resolution::Dispatched => Ok(json!({ "status": action, "dispatched": true })),
        Resolution::UnknownExchange => Ok(json!({
            "status": "ignored",
            "dispatched": false,
            "reason": "unknown exchange",
        })),
        Resolution::TransportFailed(message) => Err(Error::Transport(message)),
    }
}
