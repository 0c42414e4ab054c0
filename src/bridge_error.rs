//! Typed failure taxonomy for bridge command execution.
//!
//! Every protocol-level failure signal funnels through `classify_failure`;
//! no other component interprets transport diagnostics. The `Display` text of
//! each member is the single human-readable string handed to callers outside
//! the engine.

use thiserror::Error;

/// Codes reported when automation consent for the target application has
/// been denied.
pub const PERMISSION_DENIED_CODES: [i32; 2] = [-1743, -10004];
/// Codes reported when the target process is unavailable.
pub const APP_NOT_RUNNING_CODES: [i32; 2] = [-600, -10810];
/// Code reported when an object addressed by identifier does not exist.
pub const OBJECT_NOT_FOUND_CODE: i32 = -1728;

/// Failure taxonomy for every public engine operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("Permission denied. Grant automation access to the Music app in System Settings > Privacy & Security > Automation.")]
    PermissionDenied,
    #[error("Music app is not running. Open the Music app and try again.")]
    TargetAppNotRunning,
    #[error("The requested item was not found in the Music library.")]
    ObjectNotFound,
    #[error("Received an invalid response from the Music app.")]
    InvalidResponse,
    #[error("Failed to execute automation command: {0}")]
    ExecutionFailed(String),
}

/// Maps a numeric protocol error code to the taxonomy. Undocumented codes
/// become `ExecutionFailed` carrying the raw diagnostic text.
pub fn classify_code(code: i32, message: &str) -> BridgeError {
    if PERMISSION_DENIED_CODES.contains(&code) {
        return BridgeError::PermissionDenied;
    }
    if APP_NOT_RUNNING_CODES.contains(&code) {
        return BridgeError::TargetAppNotRunning;
    }
    if code == OBJECT_NOT_FOUND_CODE {
        return BridgeError::ObjectNotFound;
    }
    BridgeError::ExecutionFailed(message.trim().to_string())
}

/// Classifies a failed transport run from its diagnostic text.
///
/// The transport appends the numeric code in parentheses at the end of the
/// error line, e.g. `execution error: ... (-1728)`. Diagnostics without a
/// recognizable code become `ExecutionFailed` with the text attached.
pub fn classify_failure(stderr: &str) -> BridgeError {
    match extract_error_code(stderr) {
        Some(code) => classify_code(code, stderr),
        None => BridgeError::ExecutionFailed(stderr.trim().to_string()),
    }
}

fn extract_error_code(stderr: &str) -> Option<i32> {
    let open = stderr.rfind('(')?;
    let rest = &stderr[open + 1..];
    let close = rest.find(')')?;
    rest[..close].trim().parse::<i32>().ok()
}
