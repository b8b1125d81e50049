//! Chat command - interactive session with an agent.

use anyhow::{Context as _, Result};
use clap::Args;
use tokio::sync::mpsc;
use tracing::info;

use switchboard_config::EnvOverrides;
use switchboard_core::{DataRouter, SyncEngine};
use switchboard_ws::WsTransport;

use super::Context;
use super::console::{Console, register_renderers};

/// Arguments for the chat command.
#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Agent id from the catalog to open the session with
    #[arg(short, long)]
    pub agent: Option<String>,

    /// Document scope to bind the conversation to
    #[arg(short, long)]
    pub scope: Option<String>,
}

/// Run the chat command.
pub async fn run(args: ChatArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let settings = config
        .resolve(ctx.context.as_deref(), &EnvOverrides::from_env())
        .context("resolving connection settings")?;
    let agent = args
        .agent
        .as_deref()
        .map(|id| config.agent(id).cloned())
        .transpose()?;

    info!(
        context = %settings.context,
        server = %settings.server_url,
        participant_id = %settings.participant_id,
        "Opening session"
    );

    let (transport, transport_events) = WsTransport::new(settings.ws_settings(&config.sync));
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let router = DataRouter::new();
    let _renderers = register_renderers(&router);

    let engine = SyncEngine::new(
        config.sync.to_sync_config(),
        transport,
        settings.participant_id.clone(),
        events_tx,
    )?
    .with_router(router);
    let handle = engine.spawn(transport_events);

    handle.select_scope(args.scope.clone())?;
    handle.select_agent(agent.clone())?;
    handle.connect()?;

    let mut console = Console::new(config.agents.clone(), settings, agent, args.scope, ctx.verbose);
    let result = console.run(&handle, events_rx).await;

    handle.shutdown().await;
    result
}
