//! Serialized execution channel to the automation bridge.
//!
//! Exactly one worker owns the transport; callers submit from any thread and
//! commands run strictly one at a time, in arrival order. Concurrent
//! automation calls corrupt the target application's selection and timing
//! state, so nothing here may ever run two scripts at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use log::{debug, warn};
use tokio::sync::broadcast;

use crate::bridge_error::{classify_failure, BridgeError};
use crate::descriptor::{parse_and_decode, ScriptValue};
use crate::protocol::EngineEvent;
use crate::readiness_gate::ReadinessGate;
use crate::script_builder::{BridgeRequest, ResponseMode};
use crate::script_runner::ScriptRunner;

/// Outcome of one bridge command.
pub type CommandResult = Result<ScriptValue, BridgeError>;

struct QueuedCommand {
    request: BridgeRequest,
    cancelled: Arc<AtomicBool>,
    reply: mpsc::SyncSender<CommandResult>,
}

/// Claim on a submitted command's eventual result.
pub struct CommandTicket {
    cancelled: Arc<AtomicBool>,
    reply: mpsc::Receiver<CommandResult>,
}

impl CommandTicket {
    /// Removes the command from the queue if it has not started yet. There is
    /// no cancellation for a command already in flight; the bridge enforces
    /// its own per-category timeout.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Blocks until the command completes.
    pub fn wait(self) -> CommandResult {
        self.reply.recv().unwrap_or_else(|_| {
            Err(BridgeError::ExecutionFailed(
                "bridge worker terminated before replying".to_string(),
            ))
        })
    }
}

/// Cloneable submission handle to the single bridge worker.
#[derive(Clone)]
pub struct BridgeHandle {
    sender: mpsc::Sender<QueuedCommand>,
}

impl BridgeHandle {
    /// Enqueues a command without blocking. Commands complete in submission
    /// order; there is exactly one worker.
    pub fn submit(&self, request: BridgeRequest) -> CommandTicket {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let cancelled = Arc::new(AtomicBool::new(false));
        let command = QueuedCommand {
            request,
            cancelled: cancelled.clone(),
            reply: reply_tx,
        };
        if let Err(mpsc::SendError(command)) = self.sender.send(command) {
            let _ = command.reply.try_send(Err(BridgeError::ExecutionFailed(
                "bridge worker is not running".to_string(),
            )));
        }
        CommandTicket {
            cancelled,
            reply: reply_rx,
        }
    }

    /// Submits and waits for completion.
    pub fn execute(&self, request: BridgeRequest) -> CommandResult {
        self.submit(request).wait()
    }
}

/// Owner of the serialized bridge worker.
pub struct BridgeExecutor;

impl BridgeExecutor {
    /// Spawns the worker thread and returns its submission handle. The worker
    /// exits once every handle is dropped and the queue drains.
    pub fn spawn(
        runner: Arc<dyn ScriptRunner>,
        gate: ReadinessGate,
        events: broadcast::Sender<EngineEvent>,
    ) -> BridgeHandle {
        let (sender, receiver) = mpsc::channel::<QueuedCommand>();
        thread::Builder::new()
            .name("bridge-executor".to_string())
            .spawn(move || worker_loop(receiver, runner, gate, events))
            .expect("failed to spawn bridge executor thread");
        BridgeHandle { sender }
    }
}

fn worker_loop(
    receiver: mpsc::Receiver<QueuedCommand>,
    runner: Arc<dyn ScriptRunner>,
    gate: ReadinessGate,
    events: broadcast::Sender<EngineEvent>,
) {
    while let Ok(command) = receiver.recv() {
        process_command(command, runner.as_ref(), &gate, &events);
    }
    debug!("BridgeExecutor: all handles dropped, worker exiting");
}

fn process_command(
    command: QueuedCommand,
    runner: &dyn ScriptRunner,
    gate: &ReadinessGate,
    events: &broadcast::Sender<EngineEvent>,
) {
    let QueuedCommand {
        request,
        cancelled,
        reply,
    } = command;

    if cancelled.load(Ordering::SeqCst) {
        debug!(
            "BridgeExecutor: '{}' removed from queue before execution",
            request.label
        );
        let _ = reply.try_send(Err(BridgeError::ExecutionFailed(
            "command removed from the queue before execution".to_string(),
        )));
        return;
    }

    let _ = events.send(EngineEvent::CommandStarted {
        label: request.label,
    });

    if request.gated {
        debug!("BridgeExecutor: awaiting readiness for '{}'", request.label);
        gate.ensure_ready();
    }

    debug!("BridgeExecutor: executing '{}'", request.label);
    let output = runner.run(&request.script);
    let result = interpret_output(&request, output);
    let success = result.is_ok();

    let _ = events.send(EngineEvent::CommandFinished {
        label: request.label,
        success,
    });
    let _ = reply.try_send(result);
}

fn interpret_output(request: &BridgeRequest, output: crate::script_runner::RunOutput) -> CommandResult {
    if !output.success {
        debug!("BridgeExecutor: classifying failure for '{}'", request.label);
        return Err(classify_failure(&output.stderr));
    }
    match request.mode {
        // An imperative command that ran without a reported error succeeded,
        // whether or not the bridge printed anything.
        ResponseMode::NoOutput => Ok(ScriptValue::Missing),
        ResponseMode::Expect => {
            debug!("BridgeExecutor: decoding response for '{}'", request.label);
            parse_and_decode(&output.stdout).map_err(|err| {
                warn!(
                    "BridgeExecutor: undecodable response for '{}': {}",
                    request.label, err
                );
                BridgeError::InvalidResponse
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BridgeExecutor, BridgeHandle};
    use crate::bridge_error::BridgeError;
    use crate::protocol::EngineEvent;
    use crate::readiness_gate::{ProcessControl, ReadinessGate};
    use crate::script_builder::{BridgeRequest, ResponseMode};
    use crate::script_runner::{RunOutput, ScriptRunner};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};
    use tokio::sync::broadcast;

    struct AlwaysRunning;

    impl ProcessControl for AlwaysRunning {
        fn is_running(&self) -> bool {
            true
        }
        fn request_launch(&self) {}
    }

    /// Runs a fixed closure per script, recording busy windows.
    struct ScriptedRunner {
        respond: Box<dyn Fn(&str) -> RunOutput + Send + Sync>,
        busy_windows: Mutex<Vec<(Instant, Instant)>>,
        delay: Duration,
    }

    impl ScriptedRunner {
        fn new(respond: impl Fn(&str) -> RunOutput + Send + Sync + 'static) -> Self {
            Self {
                respond: Box::new(respond),
                busy_windows: Mutex::new(Vec::new()),
                delay: Duration::from_millis(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    impl ScriptRunner for ScriptedRunner {
        fn run(&self, script: &str) -> RunOutput {
            let started = Instant::now();
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            let output = (self.respond)(script);
            self.busy_windows
                .lock()
                .expect("busy window lock should not be poisoned")
                .push((started, Instant::now()));
            output
        }
    }

    fn spawn(runner: Arc<ScriptedRunner>) -> (BridgeHandle, broadcast::Receiver<EngineEvent>) {
        let (events, observer) = broadcast::channel(64);
        let gate = ReadinessGate::with_polling(
            Box::new(AlwaysRunning),
            Duration::from_millis(1),
            1,
        );
        let handle = BridgeExecutor::spawn(runner, gate, events);
        (handle, observer)
    }

    fn request(label: &'static str, mode: ResponseMode) -> BridgeRequest {
        BridgeRequest {
            script: format!("return \"{}\"", label),
            mode,
            label,
            gated: true,
        }
    }

    fn ok_output(stdout: &str) -> RunOutput {
        RunOutput {
            success: true,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    #[test]
    fn test_expected_response_is_decoded() {
        let runner = Arc::new(ScriptedRunner::new(|_| ok_output("{\"a\", \"b\"}\n")));
        let (handle, _) = spawn(runner);
        let value = handle
            .execute(request("listing", ResponseMode::Expect))
            .expect("scripted response should decode");
        assert_eq!(value.into_string_items(), vec!["a", "b"]);
    }

    #[test]
    fn test_no_output_command_succeeds_silently() {
        let runner = Arc::new(ScriptedRunner::new(|_| ok_output("")));
        let (handle, _) = spawn(runner);
        let value = handle
            .execute(request("delete", ResponseMode::NoOutput))
            .expect("clean exit with no output is success");
        assert!(value.is_missing());
    }

    #[test]
    fn test_transport_failure_is_classified() {
        let runner = Arc::new(ScriptedRunner::new(|_| {
            RunOutput::failure("execution error: not authorized (-1743)")
        }));
        let (handle, _) = spawn(runner);
        let error = handle
            .execute(request("listing", ResponseMode::Expect))
            .expect_err("failed run should classify");
        assert_eq!(error, BridgeError::PermissionDenied);
    }

    #[test]
    fn test_undecodable_expected_response_is_invalid() {
        let runner = Arc::new(ScriptedRunner::new(|_| ok_output("{\"oops\"")));
        let (handle, _) = spawn(runner);
        let error = handle
            .execute(request("listing", ResponseMode::Expect))
            .expect_err("truncated response should fail decoding");
        assert_eq!(error, BridgeError::InvalidResponse);
    }

    #[test]
    fn test_cancelled_command_never_reaches_the_transport() {
        // Occupy the worker with a slow command so the second one is still
        // queued when it gets cancelled.
        let runner = Arc::new(
            ScriptedRunner::new(|_| ok_output("\"x\"")).with_delay(Duration::from_millis(80)),
        );
        let (handle, _) = spawn(runner.clone());
        let busy = handle.submit(request("busy", ResponseMode::Expect));
        std::thread::sleep(Duration::from_millis(10));
        let ticket = handle.submit(request("cancelled", ResponseMode::Expect));
        ticket.cancel();
        busy.wait().expect("the in-flight command should finish");
        let error = ticket.wait().expect_err("cancelled command should error");
        assert!(matches!(error, BridgeError::ExecutionFailed(_)));
        // Only the first command ever touched the transport.
        assert_eq!(
            runner
                .busy_windows
                .lock()
                .expect("busy window lock should not be poisoned")
                .len(),
            1
        );
    }

    #[test]
    fn test_concurrent_submissions_execute_serially_in_fifo_order() {
        let runner = Arc::new(
            ScriptedRunner::new(|_| ok_output("\"done\""))
                .with_delay(Duration::from_millis(15)),
        );
        let (handle, mut observer) = spawn(runner.clone());

        let labels = ["first", "second", "third", "fourth"];
        let tickets: Vec<_> = labels
            .iter()
            .map(|&label| handle.submit(request(label, ResponseMode::Expect)))
            .collect();
        for ticket in tickets {
            ticket.wait().expect("scripted command should succeed");
        }

        // Busy windows must be strictly sequential, never overlapping.
        let windows = runner
            .busy_windows
            .lock()
            .expect("busy window lock should not be poisoned")
            .clone();
        assert_eq!(windows.len(), labels.len());
        for pair in windows.windows(2) {
            assert!(
                pair[0].1 <= pair[1].0,
                "bridge commands must not overlap in time"
            );
        }

        // The event stream brackets each command, in submission order.
        let mut seen = Vec::new();
        while let Ok(event) = observer.try_recv() {
            seen.push(event);
        }
        assert_eq!(seen.len(), labels.len() * 2);
        for (index, label) in labels.iter().enumerate() {
            match &seen[index * 2] {
                EngineEvent::CommandStarted { label: started } => assert_eq!(started, label),
                other => panic!("expected CommandStarted, got {:?}", other),
            }
            match &seen[index * 2 + 1] {
                EngineEvent::CommandFinished {
                    label: finished,
                    success,
                } => {
                    assert_eq!(finished, label);
                    assert!(*success);
                }
                other => panic!("expected CommandFinished, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_cloned_handles_share_one_worker() {
        let runner = Arc::new(ScriptedRunner::new(|_| ok_output("\"x\"")));
        let (handle, _) = spawn(runner.clone());
        let clone = handle.clone();
        drop(handle);
        clone
            .execute(request("alive", ResponseMode::Expect))
            .expect("worker should still serve the surviving handle");
        assert_eq!(
            runner
                .busy_windows
                .lock()
                .expect("busy window lock should not be poisoned")
                .len(),
            1
        );
    }
}
