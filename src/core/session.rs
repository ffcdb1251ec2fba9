// src/core/session.rs

//! # Execution Session
//!
//! Accepts one request at a time, runs it through the driver to completion and reports a
//! terminal status. Every path ends back in `SessionState::Idle`:
//!
//! ```text
//! Idle ──submit──▶ Running ──prompt────────────────▶ Idle   (Ok / Error from exit code)
//!                          ├─interrupt─▶ Aborted ───▶ Idle   (Abort)
//!                          └─end of stream─▶ Restarting ─▶ Idle   (Ok, child respawned)
//! ```
//!
//! Output is dispatched while the command runs, on the caller's thread, in the order it was
//! produced.

use crate::{
    CancellationToken,
    core::{
        config::ConfigError,
        dispatcher::{EventSink, OutputDispatcher},
        driver::{DriverError, ReplDriver},
        extractor::{ContentExtractor, MarkerExtractor},
        kernel_info::KernelInfo,
        matcher::PromptSpec,
    },
    models::{
        ExecutionOutcome, ExecutionRequest, ExecutionStatus, KernelConfig, OutboundEvent,
        StreamName,
    },
    system::process::ProcessSpec,
};
use std::sync::atomic::Ordering;
use thiserror::Error;
use uuid::Uuid;

/// Error name reported when the interpreter could not be brought back.
pub const RESTART_FAILED: &str = "RestartFailed";
/// Error name reported once automatic restarts are exhausted.
pub const RESTART_LIMIT: &str = "RestartLimit";
/// Error name for driver failures that are neither interrupts nor end-of-stream.
pub const DRIVER_ERROR: &str = "DriverError";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Aborted,
    Restarting,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to start the interpreter: {0}")]
    Driver(#[from] DriverError),
}

pub struct ExecutionSession {
    id: Uuid,
    config: KernelConfig,
    process_spec: ProcessSpec,
    prompts: PromptSpec,
    driver: Option<ReplDriver>,
    dispatcher: OutputDispatcher,
    state: SessionState,
    banner: String,
    consecutive_restarts: u32,
}

impl std::fmt::Debug for ExecutionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("pid", &self.driver.as_ref().map(ReplDriver::pid))
            .field("dispatcher", &self.dispatcher)
            .field("consecutive_restarts", &self.consecutive_restarts)
            .finish_non_exhaustive()
    }
}

impl ExecutionSession {
    /// Spawns the interpreter and runs its setup, using the marker-line content extractor.
    pub fn start(config: KernelConfig) -> Result<Self, SessionError> {
        Self::with_extractor(config, Box::new(MarkerExtractor))
    }

    pub fn with_extractor(
        config: KernelConfig,
        extractor: Box<dyn ContentExtractor>,
    ) -> Result<Self, SessionError> {
        let process_spec = config.process_spec()?;
        let prompts = config.prompt_spec()?;
        let mut session = Self {
            id: Uuid::new_v4(),
            config,
            process_spec,
            prompts,
            driver: None,
            dispatcher: OutputDispatcher::new(extractor),
            state: SessionState::Idle,
            banner: String::new(),
            consecutive_restarts: 0,
        };
        session.spawn_driver()?;
        log::info!(
            "[{}] Session started with '{}'.",
            session.id,
            session.process_spec.program
        );
        Ok(session)
    }

    /// Runs one request to completion and reports how it ended.
    ///
    /// Never fails as a whole: interpreter crashes, interrupts and restart failures are all
    /// expressed in the returned outcome. `cancel` is cleared before and after the execution.
    pub fn submit(
        &mut self,
        request: &ExecutionRequest,
        sink: &mut dyn EventSink,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome {
        let count = request.execution_count;
        if request.code.trim().is_empty() {
            return ExecutionOutcome::ok(count);
        }

        cancel.store(false, Ordering::SeqCst);
        scopeguard::defer! {
            cancel.store(false, Ordering::SeqCst);
        }

        if self.driver.is_none() {
            if let Err(outcome) = self.revive(request, sink) {
                self.set_state(SessionState::Idle);
                return outcome;
            }
        }

        let Some(driver) = self.driver.as_mut() else {
            return ExecutionOutcome::error(count, DRIVER_ERROR, t!("session.error.not_running"));
        };
        self.state = SessionState::Running;
        log::trace!("[{}] Running execution {}.", self.id, count);
        let result = stream_into(
            driver,
            &mut self.dispatcher,
            request.code.trim_end(),
            request.silent,
            sink,
            cancel,
        );

        let outcome = match result {
            Ok(()) => {
                self.consecutive_restarts = 0;
                self.check_exit_code(request, sink)
            }
            Err(DriverError::Interrupted) => self.abort(request, sink),
            Err(DriverError::Eof { remaining }) => self.recover_from_eof(&remaining, request, sink),
            Err(e) => {
                log::warn!("[{}] Execution failed: {}", self.id, e);
                self.dispatcher
                    .emit_stream(StreamName::Stderr, format!("{e}\n"), request.silent, sink);
                ExecutionOutcome::error(count, DRIVER_ERROR, e.to_string())
            }
        };
        self.set_state(SessionState::Idle);
        outcome
    }

    /// Replaces the interpreter with a fresh one and re-enables automatic restarts.
    pub fn restart(&mut self) -> Result<(), SessionError> {
        self.consecutive_restarts = 0;
        self.spawn_driver()?;
        Ok(())
    }

    pub fn kernel_info(&self) -> KernelInfo {
        KernelInfo::new(&self.config.kernel, &self.banner)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn dispatcher(&self) -> &OutputDispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Text the interpreter printed before its first prompt.
    pub fn banner(&self) -> &str {
        &self.banner
    }

    pub fn pid(&self) -> Option<u32> {
        self.driver.as_ref().map(ReplDriver::pid)
    }

    pub fn is_running(&self) -> bool {
        self.driver.is_some()
    }

    /// Stops the interpreter. A later `submit` spawns a new one.
    pub fn shutdown(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            log::info!("[{}] Shutting down interpreter (PID: {}).", self.id, driver.pid());
            driver.terminate();
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            log::trace!("[{}] {:?} -> {:?}", self.id, self.state, state);
            self.state = state;
        }
    }

    /// Tears down any current child, spawns a new one and runs the configured setup.
    fn spawn_driver(&mut self) -> Result<(), DriverError> {
        if let Some(mut old) = self.driver.take() {
            old.terminate();
        }
        self.dispatcher.reset();

        let mut driver = ReplDriver::spawn(
            &self.process_spec,
            self.prompts.clone(),
            self.config.command_timeout(),
        )?;
        let banner = driver.wait_for_banner(self.config.startup_timeout())?;
        if let Some(change) = &self.config.prompt.change {
            driver.change_prompt(change)?;
        }
        for command in &self.config.session.init_commands {
            log::debug!("[{}] Running setup command {:?}.", self.id, command);
            driver.run_command(command, None)?;
        }

        log::debug!("[{}] Interpreter ready (PID: {}).", self.id, driver.pid());
        self.banner = banner;
        self.driver = Some(driver);
        Ok(())
    }

    /// Called when a request arrives and no child is running.
    fn revive(
        &mut self,
        request: &ExecutionRequest,
        sink: &mut dyn EventSink,
    ) -> Result<(), ExecutionOutcome> {
        if self.restarts_exhausted() {
            let message = format!(
                t!("session.error.restart_limit"),
                count = self.consecutive_restarts
            );
            self.dispatcher
                .emit_stream(StreamName::Stderr, format!("{message}\n"), request.silent, sink);
            return Err(ExecutionOutcome::error(
                request.execution_count,
                RESTART_LIMIT,
                message,
            ));
        }
        self.respawn(request, sink)
    }

    fn respawn(
        &mut self,
        request: &ExecutionRequest,
        sink: &mut dyn EventSink,
    ) -> Result<(), ExecutionOutcome> {
        self.set_state(SessionState::Restarting);
        log::info!("[{}] Respawning interpreter.", self.id);
        self.spawn_driver().map_err(|e| {
            log::warn!("[{}] Respawn failed: {}", self.id, e);
            if let Some(mut driver) = self.driver.take() {
                driver.terminate();
            }
            let message = format!(t!("session.error.restart_failed"), error = e);
            self.dispatcher
                .emit_stream(StreamName::Stderr, format!("{message}\n"), request.silent, sink);
            ExecutionOutcome::error(request.execution_count, RESTART_FAILED, message)
        })
    }

    fn restarts_exhausted(&self) -> bool {
        self.config
            .session
            .max_consecutive_restarts
            .is_some_and(|max| self.consecutive_restarts > max)
    }

    fn restart_notice(&self) -> String {
        let notice = self
            .config
            .session
            .restart_notice
            .as_deref()
            .unwrap_or(t!("session.info.restarting"));
        format!("{notice}\n")
    }

    /// The child went away mid-execution: flush what it printed and bring up a new one.
    fn recover_from_eof(
        &mut self,
        remaining: &str,
        request: &ExecutionRequest,
        sink: &mut dyn EventSink,
    ) -> ExecutionOutcome {
        log::info!("[{}] Interpreter exited during execution.", self.id);
        self.set_state(SessionState::Restarting);
        self.dispatcher.dispatch(remaining, request.silent, sink);
        if let Some(mut driver) = self.driver.take() {
            driver.terminate();
        }

        self.consecutive_restarts += 1;
        if let Err(outcome) = self.revive_with_notice(request, sink) {
            return outcome;
        }
        ExecutionOutcome::ok(request.execution_count)
    }

    fn revive_with_notice(
        &mut self,
        request: &ExecutionRequest,
        sink: &mut dyn EventSink,
    ) -> Result<(), ExecutionOutcome> {
        if !self.restarts_exhausted() {
            let notice = self.restart_notice();
            self.dispatcher.dispatch(&notice, request.silent, sink);
        }
        self.revive(request, sink)
    }

    /// Delivers the interrupt and waits for the interpreter to show its prompt again.
    fn abort(&mut self, request: &ExecutionRequest, sink: &mut dyn EventSink) -> ExecutionOutcome {
        self.set_state(SessionState::Aborted);
        let count = request.execution_count;
        let Some(driver) = self.driver.as_mut() else {
            return ExecutionOutcome::abort(count);
        };

        log::info!("[{}] Interrupting interpreter (PID: {}).", self.id, driver.pid());
        if let Err(e) = driver.send_interrupt() {
            log::warn!("[{}] {}", self.id, e);
        }

        let recovered = match driver.expect_prompt(None) {
            Ok(drained) => {
                self.dispatcher.dispatch(&drained, request.silent, sink);
                return ExecutionOutcome::abort(count);
            }
            Err(DriverError::Eof { remaining } | DriverError::Timeout { remaining, .. }) => {
                log::warn!(
                    "[{}] Interpreter did not come back after the interrupt; restarting.",
                    self.id
                );
                self.recover_from_eof(&remaining, request, sink)
            }
            Err(e) => {
                log::warn!("[{}] Resynchronization failed: {}", self.id, e);
                self.recover_from_eof("", request, sink)
            }
        };
        // A restart that failed or hit the limit wins over the abort.
        match recovered.status {
            ExecutionStatus::Error { .. } => recovered,
            ExecutionStatus::Ok | ExecutionStatus::Abort => ExecutionOutcome::abort(count),
        }
    }

    /// Runs the configured exit-code command, if any, and turns a non-zero status into an error.
    fn check_exit_code(
        &mut self,
        request: &ExecutionRequest,
        sink: &mut dyn EventSink,
    ) -> ExecutionOutcome {
        let count = request.execution_count;
        let (Some(command), Some(driver)) = (
            self.config.session.exit_code_command.as_deref(),
            self.driver.as_mut(),
        ) else {
            return ExecutionOutcome::ok(count);
        };

        let output = match driver.run_command(command, None) {
            Ok(output) => output,
            Err(DriverError::Eof { remaining }) => {
                return self.recover_from_eof(&remaining, request, sink);
            }
            Err(e) => {
                log::warn!("[{}] Could not read the exit code: {}", self.id, e);
                return ExecutionOutcome::ok(count);
            }
        };

        let code = output.trim().parse::<i64>().unwrap_or_else(|_| {
            log::debug!("[{}] Unparseable exit code {:?}.", self.id, output);
            1
        });
        if code == 0 {
            return ExecutionOutcome::ok(count);
        }

        let outcome = ExecutionOutcome::error(count, "", code.to_string());
        sink.send(OutboundEvent::Error {
            ename: String::new(),
            evalue: code.to_string(),
            traceback: Vec::new(),
        });
        outcome
    }
}

/// Streams `code` through the driver, dispatching each event as soon as it is read.
fn stream_into(
    driver: &mut ReplDriver,
    dispatcher: &mut OutputDispatcher,
    code: &str,
    silent: bool,
    sink: &mut dyn EventSink,
    cancel: &CancellationToken,
) -> Result<(), DriverError> {
    for event in driver.stream_command(code, cancel)? {
        dispatcher.dispatch(event?.text(), silent, sink);
    }
    Ok(())
}
