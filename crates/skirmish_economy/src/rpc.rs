//! # JSON RPC Facade
//!
//! String in, string out. Transport framing lives elsewhere; this layer only
//! decodes payloads, resolves identity and maps errors to wire codes.
//!
//! | Kind            | Code | Message                     |
//! |-----------------|------|-----------------------------|
//! | validation      | 3    | specific                    |
//! | rejection       | 9    | specific                    |
//! | infrastructure  | 13   | generic (details only logged) |

use serde::de::DeserializeOwned;
use skirmish_shared::{NotifyMatchStartRequest, SubmitMatchResultRequest};
use thiserror::Error;

use crate::error::{EconomyError, ErrorKind};
use crate::lifecycle::MatchService;

/// Message returned for every infrastructure failure.
pub const INTERNAL_ERROR_MESSAGE: &str = "internal error, please retry";

/// Error returned to the client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("rpc error {code}: {message}")]
pub struct RpcError {
    /// Wire status code.
    pub code: u32,
    /// Client-safe message.
    pub message: String,
}

impl From<EconomyError> for RpcError {
    fn from(e: EconomyError) -> Self {
        let message = match e.kind() {
            ErrorKind::Validation | ErrorKind::Rejected => e.to_string(),
            ErrorKind::Infrastructure | ErrorKind::Configuration => {
                tracing::error!("RPC failed: {}", e);
                INTERNAL_ERROR_MESSAGE.to_string()
            }
        };
        Self {
            code: e.status_code(),
            message,
        }
    }
}

fn identity(user_id: Option<&str>) -> Result<&str, RpcError> {
    match user_id {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(EconomyError::MissingIdentity.into()),
    }
}

fn decode<T: DeserializeOwned>(payload: &str) -> Result<T, RpcError> {
    serde_json::from_str(payload).map_err(|e| EconomyError::Malformed(e.to_string()).into())
}

/// `notify_match_start`. Returns `{}`.
///
/// # Errors
///
/// See the module table.
pub fn rpc_notify_match_start(
    service: &MatchService,
    user_id: Option<&str>,
    payload: &str,
) -> Result<String, RpcError> {
    let owner = identity(user_id)?;
    let request: NotifyMatchStartRequest = decode(payload)?;
    service.notify_match_start(owner, &request)?;
    Ok("{}".to_string())
}

/// `submit_match_result`. Returns the reward payload JSON; retries get the
/// cached bytes back unchanged.
///
/// # Errors
///
/// See the module table.
pub fn rpc_submit_match_result(
    service: &MatchService,
    user_id: Option<&str>,
    payload: &str,
) -> Result<String, RpcError> {
    let owner = identity(user_id)?;
    let request: SubmitMatchResultRequest = decode(payload)?;
    Ok(service.submit_match_result(owner, &request)?.response)
}
