//! Config command - client configuration management.

use anyhow::Result;
use clap::{Args, Subcommand};
use switchboard_config::EnvOverrides;

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved connection settings
    Show,

    /// Show configuration file path
    Path,

    /// Show the current context name
    CurrentContext,

    /// List available contexts
    GetContexts,

    /// Switch to a different context
    UseContext {
        /// Context name to switch to
        name: String,
    },
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Path => cmd_path(ctx),
        ConfigCommand::CurrentContext => cmd_current_context(ctx),
        ConfigCommand::GetContexts => cmd_get_contexts(ctx),
        ConfigCommand::UseContext { name } => cmd_use_context(ctx, &name),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let settings = config.resolve(ctx.context.as_deref(), &EnvOverrides::from_env())?;

    println!("# Switchboard Connection\n");
    println!("context:        {}", settings.context);
    println!("server:         {}", settings.server_url);
    println!("tenant:         {}", settings.tenant_id);
    println!("participant:    {}", settings.participant_id);
    println!("credential:     {:?}", settings.credential);
    println!();
    println!("# Sync\n");
    print!("{}", serde_yaml::to_string(&config.sync)?);
    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    if let Some(path) = ctx.config_path() {
        println!("{}", path.display());
    } else {
        eprintln!("Could not determine config directory");
    }
    Ok(())
}

fn cmd_current_context(ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;

    match &config.current_context {
        Some(name) => println!("{}", name),
        None => {
            println!("No current context set. Use 'switchboard config use-context <name>' to set one.")
        }
    }
    Ok(())
}

fn cmd_get_contexts(ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;

    if config.contexts.is_empty() {
        println!("No contexts configured.");
        return Ok(());
    }

    let current = config.current_context.as_deref();

    println!("CURRENT   NAME            SERVER");
    for context in &config.contexts {
        let marker = if current == Some(context.name.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{}         {:<15} {}", marker, context.name, context.server);
    }
    Ok(())
}

fn cmd_use_context(ctx: &Context, name: &str) -> Result<()> {
    let mut config = ctx.load_config()?;
    config.use_context(name)?;
    ctx.save_config(&config)?;

    println!("Switched to context \"{}\".", name);
    Ok(())
}
