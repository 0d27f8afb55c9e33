use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("detector script not found: {0}")]
    ScriptNotFound(PathBuf),
    #[error("failed to launch detector process: {0}")]
    ProcessLaunchFailure(String),
    #[error("timed out after {timeout:?} connecting to detector at {endpoint}")]
    ConnectionTimeout { endpoint: String, timeout: Duration },
    #[error("connection to detector lost: {0}")]
    ConnectionLost(String),
}
