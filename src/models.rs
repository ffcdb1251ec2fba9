// src/models.rs

//! Shared data types: configuration, execution requests/outcomes, output and content models.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::constants::{
    DEFAULT_CHANGED_CONTINUATION, DEFAULT_CHANGED_PROMPT, DEFAULT_PRIMARY_PROMPT,
    DEFAULT_TIMEOUT_SECS,
};

// --- EXECUTION MODELS ---

/// One command submitted by the front-end. Consumed synchronously, never queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub code: String,
    pub execution_count: u32,
    /// When set, nothing produced by this execution is forwarded to the front-end.
    pub silent: bool,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>, execution_count: u32) -> Self {
        Self {
            code: code.into(),
            execution_count,
            silent: false,
        }
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }
}

/// The terminal status of one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExecutionStatus {
    Ok,
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
    Abort,
}

/// What `ExecutionSession::submit` reports back for every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    #[serde(flatten)]
    pub status: ExecutionStatus,
    pub execution_count: u32,
}

impl ExecutionOutcome {
    pub fn ok(execution_count: u32) -> Self {
        Self {
            status: ExecutionStatus::Ok,
            execution_count,
        }
    }

    pub fn abort(execution_count: u32) -> Self {
        Self {
            status: ExecutionStatus::Abort,
            execution_count,
        }
    }

    pub fn error(execution_count: u32, ename: impl Into<String>, evalue: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Error {
                ename: ename.into(),
                evalue: evalue.into(),
                traceback: Vec::new(),
            },
            execution_count,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ExecutionStatus::Ok
    }

    pub fn is_abort(&self) -> bool {
        self.status == ExecutionStatus::Abort
    }
}

// --- OUTPUT MODELS ---

/// A classified unit of interpreter output, produced by the incremental read loop.
///
/// The carried text is everything buffered since the previous event, with `\n` appended for
/// completed lines and `\r` for bare carriage returns. The text before a prompt carries no
/// terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    LineComplete(String),
    CarriageReturn(String),
    PromptReached(String),
}

impl OutputEvent {
    pub fn text(&self) -> &str {
        match self {
            Self::LineComplete(text) | Self::CarriageReturn(text) | Self::PromptReached(text) => {
                text
            }
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::LineComplete(text) | Self::CarriageReturn(text) | Self::PromptReached(text) => {
                text
            }
        }
    }
}

/// Output channel of a stream event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamName {
    Stdout,
    Stderr,
}

/// Values that are not persisted with the output (currently only the display id).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_id: Option<String>,
}

/// A rich-content object: mime bundle, metadata and transient data.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DisplayPayload {
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub transient: Transient,
}

impl DisplayPayload {
    /// A payload with a single mime entry.
    pub fn new(mime_type: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut data = Map::new();
        data.insert(mime_type.into(), value.into());
        Self {
            data,
            ..Self::default()
        }
    }

    pub fn with_display_id(mut self, display_id: impl Into<String>) -> Self {
        self.transient.display_id = Some(display_id.into());
        self
    }

    pub fn display_id(&self) -> Option<&str> {
        self.transient.display_id.as_deref()
    }

    /// The `text/plain` representation, if the bundle has one.
    pub fn plain_text(&self) -> Option<&str> {
        self.data.get("text/plain").and_then(Value::as_str)
    }
}

/// One item produced by a content extractor.
#[derive(Debug, Clone, PartialEq)]
pub enum RichContent {
    /// Ordinary text that belongs on the standard output channel.
    StreamText(String),
    /// An item that could not be turned into content; the message goes to stderr.
    ErrorMarker(String),
    Display(DisplayPayload),
}

/// Result of running a content extractor over one output batch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Extraction {
    pub plain: String,
    pub items: Vec<RichContent>,
}

impl Extraction {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            plain: text.into(),
            items: Vec::new(),
        }
    }
}

/// An event delivered to the front-end.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "msg_type", rename_all = "snake_case")]
pub enum OutboundEvent {
    Stream {
        name: StreamName,
        text: String,
    },
    DisplayData(DisplayPayload),
    UpdateDisplayData(DisplayPayload),
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
}

// --- `irepl.toml` MODELS ---

/// Represents the deserialized structure of an `irepl.toml` file.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct KernelConfig {
    #[serde(default)]
    pub interpreter: InterpreterConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub kernel: KernelMetadata,
}

/// How to launch the interpreter.
///
/// Either `command` (a full command line, split shell-style) or `program` is required. `args` are
/// appended after whatever `command` already contains.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct InterpreterConfig {
    pub command: Option<String>,
    pub program: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PromptConfig {
    #[serde(default = "default_primary_prompt")]
    pub primary: String,
    pub continuation: Option<String>,
    /// Replaces the interpreter's own prompt with one ordinary output cannot contain.
    pub change: Option<PromptChange>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            primary: default_primary_prompt(),
            continuation: None,
            change: None,
        }
    }
}

/// A command that switches the interpreter's prompt. `{prompt}` and `{continuation}` in
/// `command` are replaced by the new prompts.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PromptChange {
    pub command: String,
    #[serde(default = "default_changed_prompt")]
    pub primary: String,
    #[serde(default = "default_changed_continuation")]
    pub continuation: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Setup commands run (non-incrementally) after every spawn.
    #[serde(default)]
    pub init_commands: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub startup_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub command_timeout_secs: u64,
    pub restart_notice: Option<String>,
    /// Stop respawning after this many end-of-stream restarts without a successful execution.
    pub max_consecutive_restarts: Option<u32>,
    /// Command printing the status of the last execution; enables the error outcome.
    pub exit_code_command: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            init_commands: Vec::new(),
            startup_timeout_secs: DEFAULT_TIMEOUT_SECS,
            command_timeout_secs: DEFAULT_TIMEOUT_SECS,
            restart_notice: None,
            max_consecutive_restarts: None,
            exit_code_command: None,
        }
    }
}

/// Descriptive metadata reported through `KernelInfo`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct KernelMetadata {
    #[serde(default = "default_implementation")]
    pub implementation: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
    /// Overrides the banner captured from the interpreter at startup.
    pub banner: Option<String>,
}

impl Default for KernelMetadata {
    fn default() -> Self {
        Self {
            implementation: default_implementation(),
            language: default_language(),
            file_extension: default_file_extension(),
            banner: None,
        }
    }
}

fn default_primary_prompt() -> String {
    DEFAULT_PRIMARY_PROMPT.to_string()
}

fn default_changed_prompt() -> String {
    DEFAULT_CHANGED_PROMPT.to_string()
}

fn default_changed_continuation() -> Option<String> {
    Some(DEFAULT_CHANGED_CONTINUATION.to_string())
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_implementation() -> String {
    "irepl".to_string()
}

fn default_language() -> String {
    "shell".to_string()
}

fn default_file_extension() -> String {
    ".sh".to_string()
}
