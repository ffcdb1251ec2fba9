// src/cli/handlers/console.rs

use anyhow::Result;
use clap::Parser;
use colored::*;
use dialoguer::{Input, theme::ColorfulTheme};

use crate::{
    cli::{handlers::commons::{self, AppContext}, render::TerminalSink},
    constants::CONSOLE_QUIT_COMMAND,
    models::ExecutionRequest,
};

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Starts an interactive console connected to the interpreter."
)]
struct ConsoleArgs {
    /// Print outbound events as JSON lines.
    #[arg(long)]
    json: bool,
}

/// Reads code from the terminal and runs each entry as one execution, until `:quit` or EOF.
pub fn handle(args: Vec<String>, context: &AppContext) -> Result<()> {
    let console_args = ConsoleArgs::try_parse_from(&args)?;
    let mut session = context.start_session()?;
    commons::spawn_interrupt_listener(context.cancellation_token.clone())?;

    let info = session.kernel_info();
    if !info.banner.is_empty() {
        println!("{}", info.banner.dimmed());
    }
    println!(
        "{}",
        format!(t!("console.info.welcome"), implementation = info.implementation).green()
    );

    let theme = ColorfulTheme::default();
    let mut sink = TerminalSink::new(console_args.json);
    let mut execution_count: u32 = 1;

    loop {
        let code = match Input::<String>::with_theme(&theme)
            .with_prompt(format!(t!("console.prompt"), count = execution_count))
            .allow_empty(true)
            .interact_text()
        {
            Ok(code) => code,
            Err(e) => {
                log::debug!("Console input ended: {}", e);
                break;
            }
        };
        if code.trim() == CONSOLE_QUIT_COMMAND {
            break;
        }
        if code.trim().is_empty() {
            continue;
        }

        let request = ExecutionRequest::new(code, execution_count);
        let outcome = session.submit(&request, &mut sink, &context.cancellation_token);
        if outcome.is_abort() {
            eprintln!("{}", t!("console.info.interrupted").yellow());
        }
        sink.print_outcome(&outcome);
        execution_count += 1;
    }

    session.shutdown();
    println!("{}", t!("console.info.goodbye"));
    Ok(())
}
