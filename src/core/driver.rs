// src/core/driver.rs

//! # Interactive Process Driver
//!
//! Runs commands against a long-lived interpreter and detects, from its raw output, when each
//! command has finished (the prompt came back). Two modes exist:
//!
//! - **Non-incremental** (`run_command`, `expect_prompt`): one bounded wait for the prompt; all
//!   output is returned as a single string. Used for startup and setup commands.
//! - **Incremental** (`stream_command`): an ordered iterator of `OutputEvent`s, produced as soon
//!   as a line terminator, a bare carriage return or the prompt is seen. Unbounded, but
//!   interruptible through a `CancellationToken`.

use crate::{
    CancellationToken,
    constants::{CARRIAGE_RETURN_GRACE, EOF_DRAIN_LIMIT, READ_POLL_INTERVAL},
    core::matcher::{PatternKind, PatternMatch, PromptError, PromptMatcher, PromptSpec},
    models::{OutputEvent, PromptChange},
    system::{
        decoder::Utf8Decoder,
        process::{ProcessError, ProcessHandle, ProcessSpec, ReadOutcome},
    },
};
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("The interpreter closed its output stream.")]
    Eof { remaining: String },
    #[error("Timed out after {waited:?} waiting for the interpreter prompt.")]
    Timeout { waited: Duration, remaining: String },
    #[error("Execution was interrupted.")]
    Interrupted,
    #[error("No command was given to the interpreter.")]
    EmptyCommand,
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Which prompt ended the last wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Primary,
    Continuation,
}

#[derive(Debug)]
struct Found {
    kind: PatternKind,
    before: String,
}

/// The child's output as an expect-style buffer: decoded text not yet claimed by a match.
#[derive(Debug)]
struct ExpectStream {
    process: ProcessHandle,
    decoder: Utf8Decoder,
    buffer: String,
    closed: bool,
}

impl ExpectStream {
    /// Blocks until `matcher` finds something in the unread output.
    ///
    /// Order of checks per iteration: a match in the buffer, end-of-stream, the interrupt flag,
    /// the deadline. Output already buffered is therefore always handed out before an interrupt
    /// or a timeout is reported.
    fn expect(
        &mut self,
        matcher: &PromptMatcher,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Found, DriverError> {
        let started = Instant::now();
        let deadline = timeout.map(|t| started + t);
        let mut grace_spent = false;

        loop {
            if let Some(found) = matcher.find(&self.buffer) {
                let trailing_cr = found.kind == PatternKind::Cr && found.end == self.buffer.len();
                if trailing_cr && !grace_spent && !self.closed {
                    // The `\n` of a `\r\n` may still be in the next chunk.
                    grace_spent = true;
                    if self.fill(CARRIAGE_RETURN_GRACE) {
                        continue;
                    }
                }
                return Ok(self.consume(found));
            }

            if self.closed {
                return Err(DriverError::Eof {
                    remaining: std::mem::take(&mut self.buffer),
                });
            }

            if let Some(token) = cancel {
                if token.load(Ordering::SeqCst) {
                    log::debug!("Interrupt requested while waiting for output.");
                    return Err(DriverError::Interrupted);
                }
            }

            let wait = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(DriverError::Timeout {
                            waited: started.elapsed(),
                            remaining: std::mem::take(&mut self.buffer),
                        });
                    }
                    remaining.min(READ_POLL_INTERVAL)
                }
                None => READ_POLL_INTERVAL,
            };
            self.fill(wait);
        }
    }

    /// Reads at most one chunk. Returns whether any text was appended to the buffer.
    fn fill(&mut self, wait: Duration) -> bool {
        match self.process.read(wait) {
            ReadOutcome::Data(chunk) => {
                let text = self.decoder.decode(&chunk);
                log::trace!("<- {:?}", text);
                self.buffer.push_str(&text);
                !text.is_empty()
            }
            ReadOutcome::Pending => false,
            ReadOutcome::Closed => {
                if self.closed {
                    return false;
                }
                self.closed = true;
                log::debug!("Interpreter output stream closed.");
                let tail = self.decoder.finish();
                self.buffer.push_str(&tail);
                !tail.is_empty()
            }
        }
    }

    fn consume(&mut self, found: PatternMatch) -> Found {
        let mut before: String = self.buffer.drain(..found.end).collect();
        before.truncate(found.start);
        Found {
            kind: found.kind,
            before,
        }
    }

    /// Collects whatever the dead child still has in flight, then reports end-of-stream.
    fn drain_to_eof(&mut self) -> DriverError {
        let deadline = Instant::now() + EOF_DRAIN_LIMIT;
        while !self.closed && Instant::now() < deadline {
            self.fill(READ_POLL_INTERVAL);
        }
        DriverError::Eof {
            remaining: std::mem::take(&mut self.buffer),
        }
    }
}

/// Owns the interpreter process and the prompt matchers.
#[derive(Debug)]
pub struct ReplDriver {
    stream: ExpectStream,
    prompts: PromptSpec,
    line_matcher: PromptMatcher,
    prompt_matcher: PromptMatcher,
    timeout: Duration,
    last_prompt: Option<PromptKind>,
}

impl ReplDriver {
    /// Spawns the interpreter. Nothing is read yet; call `wait_for_banner` next.
    ///
    /// `timeout` bounds every non-incremental wait that does not pass its own.
    pub fn spawn(
        spec: &ProcessSpec,
        prompts: PromptSpec,
        timeout: Duration,
    ) -> Result<Self, DriverError> {
        let process = ProcessHandle::spawn(spec)?;
        Ok(Self {
            stream: ExpectStream {
                process,
                decoder: Utf8Decoder::new(),
                buffer: String::new(),
                closed: false,
            },
            line_matcher: PromptMatcher::incremental(&prompts),
            prompt_matcher: PromptMatcher::prompts_only(&prompts),
            prompts,
            timeout,
            last_prompt: None,
        })
    }

    /// Waits for the interpreter's first prompt and returns everything printed before it.
    pub fn wait_for_banner(&mut self, timeout: Duration) -> Result<String, DriverError> {
        let matcher = PromptMatcher::primary_only(&self.prompts);
        let found = self.stream.expect(&matcher, Some(timeout), None)?;
        self.last_prompt = Some(PromptKind::Primary);
        log::debug!("Interpreter ready (PID: {}).", self.stream.process.pid());
        Ok(found.before)
    }

    /// Sends the prompt-change command and switches to matching the new prompts.
    pub fn change_prompt(&mut self, change: &PromptChange) -> Result<(), DriverError> {
        let new_prompts = PromptSpec::new(change.primary.clone(), change.continuation.clone())?;
        let command = change
            .command
            .replace("{prompt}", new_prompts.primary())
            .replace("{continuation}", new_prompts.continuation().unwrap_or(""));

        log::debug!("Changing interpreter prompt to {:?}.", new_prompts.primary());
        self.send_line(&command)?;
        self.line_matcher = PromptMatcher::incremental(&new_prompts);
        self.prompt_matcher = PromptMatcher::prompts_only(&new_prompts);
        self.prompts = new_prompts;
        self.expect_prompt(None)?;
        Ok(())
    }

    /// Runs `command` and returns its whole output once the prompt is back.
    ///
    /// Multi-line commands are sent one line at a time, waiting for a prompt after each.
    pub fn run_command(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<String, DriverError> {
        let mut lines = split_command(command)?;
        let mut output = String::new();
        while let Some(line) = lines.pop_front() {
            self.send_line(&line)?;
            output.push_str(&self.expect_prompt(timeout)?);
        }
        Ok(output)
    }

    /// Sends `command` and returns the stream of its output events.
    ///
    /// The iterator ends after the prompt following the last line. No timeout applies; the
    /// wait is abandoned only when `cancel` is set (yielding `DriverError::Interrupted`) or the
    /// interpreter goes away (`DriverError::Eof`).
    pub fn stream_command<'a>(
        &'a mut self,
        command: &str,
        cancel: &'a CancellationToken,
    ) -> Result<CommandOutput<'a>, DriverError> {
        let mut lines = split_command(command)?;
        if let Some(first) = lines.pop_front() {
            self.send_line(&first)?;
        }
        Ok(CommandOutput {
            driver: self,
            cancel,
            pending_lines: lines,
            finished: false,
        })
    }

    /// Blocks (bounded) until a prompt appears; returns the output before it.
    pub fn expect_prompt(&mut self, timeout: Option<Duration>) -> Result<String, DriverError> {
        let timeout = timeout.unwrap_or(self.timeout);
        let found = self
            .stream
            .expect(&self.prompt_matcher, Some(timeout), None)?;
        self.last_prompt = prompt_kind(found.kind);
        Ok(found.before)
    }

    pub fn send_interrupt(&mut self) -> Result<(), DriverError> {
        self.stream.process.send_interrupt()?;
        Ok(())
    }

    pub fn last_prompt(&self) -> Option<PromptKind> {
        self.last_prompt
    }

    pub fn prompts(&self) -> &PromptSpec {
        &self.prompts
    }

    pub fn pid(&self) -> u32 {
        self.stream.process.pid()
    }

    pub fn is_alive(&mut self) -> bool {
        self.stream.process.is_alive()
    }

    pub fn terminate(&mut self) {
        self.stream.process.terminate();
    }

    fn send_line(&mut self, line: &str) -> Result<(), DriverError> {
        log::trace!("-> {:?}", line);
        match self.stream.process.send_line(line) {
            Ok(()) => Ok(()),
            Err(e) if e.is_disconnect() => {
                log::debug!("Interpreter input is closed: {}", e);
                Err(self.stream.drain_to_eof())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Output events of one command, in the order the bytes were produced.
#[derive(Debug)]
pub struct CommandOutput<'a> {
    driver: &'a mut ReplDriver,
    cancel: &'a CancellationToken,
    pending_lines: VecDeque<String>,
    finished: bool,
}

impl Iterator for CommandOutput<'_> {
    type Item = Result<OutputEvent, DriverError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let driver = &mut *self.driver;
            let found = match driver
                .stream
                .expect(&driver.line_matcher, None, Some(self.cancel))
            {
                Ok(found) => found,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };

            let Found { kind, mut before } = found;
            match kind {
                PatternKind::CrLf | PatternKind::Lf => {
                    before.push('\n');
                    return Some(Ok(OutputEvent::LineComplete(before)));
                }
                PatternKind::Cr => {
                    before.push('\r');
                    return Some(Ok(OutputEvent::CarriageReturn(before)));
                }
                PatternKind::Prompt | PatternKind::Continuation => {
                    driver.last_prompt = prompt_kind(kind);
                    match self.pending_lines.pop_front() {
                        Some(line) => {
                            if let Err(e) = driver.send_line(&line) {
                                self.finished = true;
                                return Some(Err(e));
                            }
                        }
                        None => self.finished = true,
                    }
                    if !before.is_empty() {
                        return Some(Ok(OutputEvent::PromptReached(before)));
                    }
                }
            }
        }
        None
    }
}

fn prompt_kind(kind: PatternKind) -> Option<PromptKind> {
    match kind {
        PatternKind::Prompt => Some(PromptKind::Primary),
        PatternKind::Continuation => Some(PromptKind::Continuation),
        PatternKind::CrLf | PatternKind::Lf | PatternKind::Cr => None,
    }
}

/// Splits a command into the lines sent one by one. A trailing newline adds an empty line.
fn split_command(command: &str) -> Result<VecDeque<String>, DriverError> {
    let mut lines: VecDeque<String> = command.lines().map(str::to_string).collect();
    if command.ends_with('\n') {
        lines.push_back(String::new());
    }
    if lines.is_empty() {
        return Err(DriverError::EmptyCommand);
    }
    Ok(lines)
}
