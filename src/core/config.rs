// src/core/config.rs

//! Loading and resolving `irepl.toml`.
//!
//! The configuration is read once, up front, and handed to the session as an immutable value.
//! When no file exists at the default location, one is generated from `KernelConfig::default()`
//! so users have something to edit.

use crate::{
    constants::{CONFIG_DIR_NAME, CONFIG_FILENAME, DEFAULT_INTERPRETER_COMMAND},
    core::matcher::{PromptError, PromptSpec},
    models::{InterpreterConfig, KernelConfig},
    system::process::ProcessSpec,
};
use lazy_static::lazy_static;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

lazy_static! {
    static ref IREPL_CONFIG_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
    #[error("Could not create config directory at '{path}': {source}")]
    ConfigDirCreation {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration in '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize the configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Could not split interpreter command '{0}' into arguments.")]
    InvalidCommand(String),
    #[error("No interpreter is configured: set `interpreter.command` or `interpreter.program`.")]
    MissingInterpreter,
    #[error("Failed to expand '{value}': {reason}")]
    Expansion { value: String, reason: String },
    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// Returns the irepl configuration directory (`~/.config/irepl`), creating it if needed.
///
/// The path is computed once per process and cached.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    let mut cached = IREPL_CONFIG_DIR
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if let Some(path) = &*cached {
        return Ok(path.clone());
    }

    let path = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join(CONFIG_DIR_NAME);
    if !path.exists() {
        fs::create_dir_all(&path).map_err(|e| ConfigError::ConfigDirCreation {
            path: path.display().to_string(),
            source: e,
        })?;
    }

    *cached = Some(path.clone());
    Ok(path)
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    config_dir().map(|dir| dir.join(CONFIG_FILENAME))
}

/// Loads the configuration from `explicit` or, failing that, from the default location.
///
/// An explicitly named file must exist. A missing default file is generated first.
pub fn load_config(explicit: Option<&Path>) -> Result<(KernelConfig, PathBuf), ConfigError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = default_config_path()?;
            if !path.exists() {
                log::info!("No configuration found, writing defaults to '{}'.", path.display());
                write_default(&path)?;
            }
            path
        }
    };

    log::debug!("Loading configuration from '{}'.", path.display());
    let content = fs::read_to_string(&path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    let config = parse_config(&content, &path)?;
    Ok((config, path))
}

pub fn parse_config(content: &str, origin: &Path) -> Result<KernelConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::Parse {
        path: origin.display().to_string(),
        source: e,
    })
}

/// Writes the default configuration to `path`, creating parent directories.
pub fn write_default(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ConfigError::ConfigDirCreation {
            path: parent.display().to_string(),
            source: e,
        })?;
    }
    let content = toml::to_string_pretty(&KernelConfig::default_with_interpreter())?;
    fs::write(path, content).map_err(|e| ConfigError::Write {
        path: path.display().to_string(),
        source: e,
    })
}

impl KernelConfig {
    /// A configuration that runs `command` (split shell-style) with default prompts.
    pub fn for_command(command: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.interpreter.command = Some(command.into());
        config
    }

    /// The defaults, with the built-in shell loop filled in as the interpreter.
    pub fn default_with_interpreter() -> Self {
        Self::for_command(DEFAULT_INTERPRETER_COMMAND)
    }

    /// Resolves the `[interpreter]` table into a spawnable process description.
    pub fn process_spec(&self) -> Result<ProcessSpec, ConfigError> {
        resolve_interpreter(&self.interpreter)
    }

    pub fn prompt_spec(&self) -> Result<PromptSpec, ConfigError> {
        Ok(PromptSpec::new(
            self.prompt.primary.clone(),
            self.prompt.continuation.clone(),
        )?)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.session.startup_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.session.command_timeout_secs)
    }
}

fn resolve_interpreter(interpreter: &InterpreterConfig) -> Result<ProcessSpec, ConfigError> {
    let mut words = match (&interpreter.command, &interpreter.program) {
        (Some(command), _) => shlex::split(command)
            .filter(|words| !words.is_empty())
            .ok_or_else(|| ConfigError::InvalidCommand(command.clone()))?,
        (None, Some(program)) => vec![program.clone()],
        (None, None) => return Err(ConfigError::MissingInterpreter),
    }
    .into_iter();

    let program = words.next().ok_or(ConfigError::MissingInterpreter)?;
    let mut spec = ProcessSpec::new(expand(&program)?)
        .args(words)
        .args(interpreter.args.iter().cloned());
    spec.env = interpreter.env.clone();
    spec.working_dir = interpreter
        .working_dir
        .as_deref()
        .map(|dir| expand(dir).map(|expanded| dunce::simplified(Path::new(&expanded)).to_path_buf()))
        .transpose()?;
    Ok(spec)
}

/// Expands `~` and environment variables.
fn expand(value: &str) -> Result<String, ConfigError> {
    shellexpand::full(value)
        .map(|expanded| expanded.into_owned())
        .map_err(|e| ConfigError::Expansion {
            value: value.to_string(),
            reason: e.to_string(),
        })
}
