// src/cli/handlers/exec.rs

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use crate::{
    cli::{
        handlers::commons::{self, AppContext},
        render::TerminalSink,
    },
    models::{ExecutionRequest, ExecutionStatus},
};

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Execution was interrupted.")]
    Interrupted,
    #[error("Execution failed: {0}")]
    Failed(String),
}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true, about = "Runs one piece of code and exits.")]
struct ExecArgs {
    /// The code to run; several words are joined with spaces.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    code: Vec<String>,

    /// Read the code from a file instead.
    #[arg(long, short, conflicts_with = "code")]
    file: Option<PathBuf>,

    /// Print outbound events and the outcome as JSON lines.
    #[arg(long)]
    json: bool,

    /// Run without forwarding any output.
    #[arg(long)]
    silent: bool,

    /// Execution counter reported with the outcome.
    #[arg(long, default_value_t = 1)]
    count: u32,
}

pub fn handle(args: Vec<String>, context: &AppContext) -> Result<()> {
    let exec_args = ExecArgs::try_parse_from(&args)?;
    let code = match &exec_args.file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!(t!("exec.error.read_file"), path = path.display()))?,
        None => exec_args.code.join(" "),
    };
    if code.trim().is_empty() {
        return Err(anyhow!(t!("exec.error.no_code")));
    }

    let mut session = context.start_session()?;
    commons::spawn_interrupt_listener(context.cancellation_token.clone())?;

    let mut sink = TerminalSink::new(exec_args.json);
    let request = ExecutionRequest::new(code, exec_args.count).silent(exec_args.silent);
    let outcome = session.submit(&request, &mut sink, &context.cancellation_token);
    session.shutdown();

    if exec_args.json {
        sink.print_outcome(&outcome);
    }
    match outcome.status {
        ExecutionStatus::Ok => Ok(()),
        ExecutionStatus::Abort => Err(ExecError::Interrupted.into()),
        ExecutionStatus::Error { ename, evalue, .. } if ename.is_empty() => {
            Err(ExecError::Failed(format!("exit status {}", evalue)).into())
        }
        ExecutionStatus::Error { ename, evalue, .. } => {
            Err(ExecError::Failed(format!("{}: {}", ename, evalue)).into())
        }
    }
}
