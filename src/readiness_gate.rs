//! Keeps the target application running before bridge commands execute.

use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::script_builder::ScriptBuilder;
use crate::script_runner::ScriptRunner;

/// Default poll cadence: 50 polls at 100 ms, ~5 s ceiling.
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const READY_POLL_ATTEMPTS: u32 = 50;

/// Process-level view of the target application.
pub trait ProcessControl: Send {
    /// Whether the target process is currently running. Must not trigger an
    /// automation-consent prompt or launch anything.
    fn is_running(&self) -> bool;
    /// Fire-and-forget launch request. Launching an already-running process
    /// is a no-op, so this is safe to call repeatedly.
    fn request_launch(&self);
}

/// `ProcessControl` over the real bridge: a pure running probe plus
/// `open -b <bundle-id>`.
pub struct OsaProcessControl {
    runner: Arc<dyn ScriptRunner>,
    app_id: String,
    probe_script: String,
}

impl OsaProcessControl {
    pub fn new(runner: Arc<dyn ScriptRunner>, app_id: impl Into<String>) -> Self {
        let app_id = app_id.into();
        let probe_script = ScriptBuilder::new(&app_id).running_probe().script;
        Self {
            runner,
            app_id,
            probe_script,
        }
    }
}

impl ProcessControl for OsaProcessControl {
    fn is_running(&self) -> bool {
        let output = self.runner.run(&self.probe_script);
        if !output.success {
            return false;
        }
        match crate::descriptor::parse_and_decode(&output.stdout) {
            Ok(value) => value.scalar() == Some("running"),
            Err(_) => false,
        }
    }

    fn request_launch(&self) {
        if let Err(err) = Command::new("open").arg("-b").arg(&self.app_id).spawn() {
            warn!(
                "ReadinessGate: launch request for {} failed: {}",
                self.app_id, err
            );
        }
    }
}

/// Bounded launch-and-poll gate run before every gated command.
///
/// The gate never hard-fails: if the target still is not running when the
/// polls are exhausted, the command is issued anyway and the failure surfaces
/// as a typed classification from the command itself.
pub struct ReadinessGate {
    control: Box<dyn ProcessControl>,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl ReadinessGate {
    pub fn new(control: Box<dyn ProcessControl>) -> Self {
        Self::with_polling(control, READY_POLL_INTERVAL, READY_POLL_ATTEMPTS)
    }

    pub fn with_polling(
        control: Box<dyn ProcessControl>,
        poll_interval: Duration,
        poll_attempts: u32,
    ) -> Self {
        Self {
            control,
            poll_interval,
            poll_attempts,
        }
    }

    /// Returns whether the target is running when the gate releases.
    pub fn ensure_ready(&self) -> bool {
        if self.control.is_running() {
            return true;
        }
        debug!("ReadinessGate: target not running, requesting launch");
        self.control.request_launch();
        for _ in 0..self.poll_attempts {
            if self.control.is_running() {
                return true;
            }
            std::thread::sleep(self.poll_interval);
        }
        warn!(
            "ReadinessGate: target still not running after {} polls, issuing command anyway",
            self.poll_attempts
        );
        false
    }
}
