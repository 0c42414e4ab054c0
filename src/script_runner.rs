//! Transport seam for executing command text against the automation bridge.

use std::process::Command;

/// Raw outcome of one transport run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Whether the transport process exited cleanly.
    pub success: bool,
    /// Response text in recoverable source form.
    pub stdout: String,
    /// Diagnostic text, carrying the numeric error code on failure.
    pub stderr: String,
}

impl RunOutput {
    /// Convenience constructor for a failed run with only a diagnostic.
    pub fn failure(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Executes one script against the bridge. Implementations must not be
/// called concurrently; the executor serializes all access.
pub trait ScriptRunner: Send + Sync {
    fn run(&self, script: &str) -> RunOutput;
}

/// Production transport: the system `osascript` binary in source-form output
/// mode (`-s s`), which prints sequences and quoted strings recoverably.
pub struct OsaScriptRunner;

impl ScriptRunner for OsaScriptRunner {
    fn run(&self, script: &str) -> RunOutput {
        match Command::new("osascript")
            .arg("-s")
            .arg("s")
            .arg("-e")
            .arg(script)
            .output()
        {
            Ok(output) => RunOutput {
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Err(err) => RunOutput::failure(format!("failed to launch osascript: {}", err)),
        }
    }
}
