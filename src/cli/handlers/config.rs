// src/cli/handlers/config.rs

use crate::{cli::handlers::commons::AppContext, core::config};
use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::fs;

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Shows the configuration in use, or writes the default one."
)]
struct ConfigArgs {
    /// Write the default configuration if the file does not exist yet.
    #[arg(long)]
    init: bool,
}

pub fn handle(args: Vec<String>, context: &AppContext) -> Result<()> {
    let config_args = ConfigArgs::try_parse_from(&args)?;
    let path = match &context.config_path {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };

    if config_args.init {
        if path.exists() {
            println!("{}", format!(t!("config.info.exists"), path = path.display()).yellow());
        } else {
            config::write_default(&path)?;
            println!("{}", format!(t!("config.info.created"), path = path.display()).green());
        }
        return Ok(());
    }

    let (_, path) = context.load_config()?;
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    println!("{}", format!(t!("config.info.path"), path = path.display()).blue());
    println!("\n{}", content.trim_end());
    Ok(())
}
