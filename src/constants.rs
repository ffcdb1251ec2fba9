// src/constants.rs

use std::time::Duration;

/// The name of the directory holding irepl configuration (inside the system config dir).
pub const CONFIG_DIR_NAME: &str = "irepl";

/// The name of the main configuration file.
pub const CONFIG_FILENAME: &str = "irepl.toml";

/// Prompt printed by the default interpreter loop and expected by default.
pub const DEFAULT_PRIMARY_PROMPT: &str = "# ";

/// Prompt installed by `prompt.change` when no explicit one is configured.
pub const DEFAULT_CHANGED_PROMPT: &str = "[IREPL_PROMPT>";

/// Continuation prompt installed by `prompt.change` when no explicit one is configured.
pub const DEFAULT_CHANGED_CONTINUATION: &str = "[IREPL_PROMPT+";

/// A minimal shell read-eval-print loop, used when no interpreter is configured.
pub const DEFAULT_INTERPRETER_COMMAND: &str =
    "sh -c 'P=\"# \"; while printf \"%s\" \"$P\"; IFS= read -r line; do eval \"$line\"; done'";

/// Timeout for the non-incremental waits (startup, setup commands, interrupt resync).
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// How long a blocked read waits before re-checking for an interrupt request.
pub const READ_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long a trailing `\r` is held back in case the matching `\n` is still in flight.
pub const CARRIAGE_RETURN_GRACE: Duration = Duration::from_millis(20);

/// Size of the buffer the terminal reader thread reads into.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Terminal size the interpreter sees.
pub const PTY_ROWS: u16 = 24;
pub const PTY_COLS: u16 = 80;

/// `TERM` given to the interpreter unless configured, so it prints no escape sequences.
pub const DEFAULT_TERM: &str = "dumb";

/// Console input that ends an interactive session.
pub const CONSOLE_QUIT_COMMAND: &str = ":quit";

/// How long to keep collecting output after the interpreter's input turned out to be closed.
pub const EOF_DRAIN_LIMIT: Duration = Duration::from_millis(500);
