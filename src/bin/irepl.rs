// src/bin/irepl.rs

use clap::Parser;
use colored::*;
use irepl::cli::{Cli, dispatcher, handlers::exec::ExecError};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Sets up logging, parses arguments, dispatches to the handler and reports errors in one place.
fn main() {
    let cancellation_token = Arc::new(AtomicBool::new(false));
    env_logger::init();

    if let Err(e) = dispatcher::dispatch(Cli::parse(), cancellation_token) {
        // An interrupted execution exits like a shell would, without an error message.
        if matches!(e.downcast_ref::<ExecError>(), Some(ExecError::Interrupted)) {
            std::process::exit(130);
        }

        eprintln!("\n{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}
