// src/cli/dispatcher.rs

use anyhow::{Result, anyhow};

use crate::{
    CancellationToken,
    cli::{
        Cli,
        handlers::{self, commons::AppContext},
    },
};

/// Command run when none is given.
const DEFAULT_COMMAND: &str = "console";

/// A command, its aliases and its handler.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    handler: fn(Vec<String>, &AppContext) -> Result<()>,
}

/// The single source of truth for all commands.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "config",
        aliases: &[],
        handler: handlers::config::handle,
    },
    CommandDefinition {
        name: "console",
        aliases: &["repl"],
        handler: handlers::console::handle,
    },
    CommandDefinition {
        name: "exec",
        aliases: &["run"],
        handler: handlers::exec::handle,
    },
    CommandDefinition {
        name: "info",
        aliases: &[],
        handler: handlers::info::handle,
    },
];

fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

/// Routes the parsed command line to its handler.
pub fn dispatch(cli: Cli, cancellation_token: CancellationToken) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    let mut args = cli.args.into_iter();
    let name = args.next().unwrap_or_else(|| DEFAULT_COMMAND.to_string());
    let command = find_command(&name).ok_or_else(|| {
        let available: Vec<&str> = COMMAND_REGISTRY.iter().map(|cmd| cmd.name).collect();
        anyhow!(
            t!("cli.error.unknown_command"),
            name = name,
            available = available.join(", ")
        )
    })?;

    let context = AppContext::new(cli.config, cancellation_token);
    (command.handler)(args.collect(), &context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_resolve_by_name_and_alias() {
        assert_eq!(find_command("exec").map(|c| c.name), Some("exec"));
        assert_eq!(find_command("repl").map(|c| c.name), Some("console"));
        assert!(find_command("tree").is_none());
    }

    #[test]
    fn test_unknown_command_lists_available_ones() {
        let cli = Cli {
            config: None,
            args: vec!["bogus".to_string()],
        };
        let err = dispatch(cli, CancellationToken::default()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("bogus"));
        assert!(message.contains("config, console, exec, info"));
    }
}
