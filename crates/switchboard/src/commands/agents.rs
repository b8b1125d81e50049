//! Agents command - list the agent catalog.

use anyhow::Result;
use clap::Args;
use console::style;

use super::Context;

/// Arguments for the agents command.
#[derive(Args, Debug)]
pub struct AgentsArgs {
    /// Output as JSON (for scripting)
    #[arg(long)]
    pub json: bool,
}

/// Run the agents command.
pub async fn run(args: AgentsArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&config.agents)?);
        return Ok(());
    }

    if config.agents.is_empty() {
        println!("No agents configured.");
        println!();
        println!("Add entries under `agents:` in the client config.");
        return Ok(());
    }

    println!("{:<24} {:<28} CHANNEL", "ID", "NAME");
    for agent in &config.agents {
        println!(
            "{:<24} {:<28} {}",
            style(&agent.id).cyan(),
            agent.display_name,
            agent.channel_id
        );
        if ctx.verbose && !agent.capabilities.is_empty() {
            println!("{:<24} {}", "", style(agent.capabilities.join(", ")).dim());
        }
    }
    Ok(())
}
