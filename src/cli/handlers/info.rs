// src/cli/handlers/info.rs

use crate::cli::handlers::commons::AppContext;
use anyhow::Result;
use clap::Parser;
use colored::*;

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Starts the interpreter and shows what it reports about itself."
)]
struct InfoArgs {
    /// Print the information as JSON.
    #[arg(long)]
    json: bool,
}

pub fn handle(args: Vec<String>, context: &AppContext) -> Result<()> {
    let info_args = InfoArgs::try_parse_from(&args)?;
    let mut session = context.start_session()?;
    let info = session.kernel_info();
    let pid = session.pid();
    session.shutdown();

    if info_args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("\n--- {} ---", info.implementation.yellow());
    println!("  {:<24} {}", "implementation version".blue(), info.implementation_version);
    println!("  {:<24} {}", "language".blue(), info.language);
    println!(
        "  {:<24} {}",
        "language version".blue(),
        info.language_version.as_deref().unwrap_or("unknown")
    );
    println!("  {:<24} {}", "file extension".blue(), info.file_extension);
    if let Some(pid) = pid {
        println!("  {:<24} {}", "interpreter pid".blue(), pid);
    }
    if !info.banner.is_empty() {
        println!("\n{}", info.banner.dimmed());
    }
    Ok(())
}
