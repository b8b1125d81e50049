//! Line-oriented console over a running sync engine.
//!
//! Input is read by rustyline on a dedicated thread and forwarded over a
//! channel, so the console can wait on keyboard input and session events at
//! the same time.

use std::collections::HashSet;

use anyhow::Result;
use console::{Style, style};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use switchboard_config::ConnectionSettings;
use switchboard_core::{
    Agent, ChatEntry, ConnectionState, DataRouter, DataSubscription, Direction, EngineHandle,
    HandlerError, SUBJECT_FIELD, SessionEvent, SubscriptionKey,
};

/// Data subject carrying agent work-log entries.
pub const WORK_LOG_SUBJECT: &str = "WorkLog";

/// Data subject carrying document state changes.
pub const DOCUMENT_UPDATE_SUBJECT: &str = "DocumentUpdate";

// ─────────────────────────────────────────────────────────────────────────────
// Input
// ─────────────────────────────────────────────────────────────────────────────

enum Input {
    Line(String),
    Interrupted,
    Eof,
    Failed(String),
}

/// Read lines on a plain thread; a blocked readline must not hold up
/// runtime shutdown.
fn spawn_input(tx: mpsc::UnboundedSender<Input>) {
    std::thread::spawn(move || {
        let config = Config::builder()
            .history_ignore_space(true)
            .auto_add_history(true)
            .build();
        let mut editor: Editor<(), DefaultHistory> = match Editor::with_config(config) {
            Ok(editor) => editor,
            Err(e) => {
                let _ = tx.send(Input::Failed(e.to_string()));
                return;
            }
        };

        loop {
            let input = match editor.readline(&prompt()) {
                Ok(line) => Input::Line(line),
                Err(ReadlineError::Interrupted) => Input::Interrupted,
                Err(ReadlineError::Eof) => Input::Eof,
                Err(e) => Input::Failed(e.to_string()),
            };
            let last = matches!(input, Input::Eof | Input::Failed(_));
            if tx.send(input).is_err() || last {
                break;
            }
        }
    });
}

fn prompt() -> String {
    format!("{} ", style("switchboard>").cyan().bold())
}

// ─────────────────────────────────────────────────────────────────────────────
// Slash commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
pub enum SlashCommand {
    Quit,
    Help,
    Agents,
    /// `/agent` shows the current agent, `/agent <id>` switches, `/agent -` releases.
    Agent(Option<String>),
    /// `/doc` clears the scope, `/doc <scope>` sets it.
    Doc(Option<String>),
    Status,
    Connect,
    Unknown(String),
}

impl SlashCommand {
    pub fn parse(input: &str) -> Self {
        let mut parts = input.trim().trim_start_matches('/').split_whitespace();
        let cmd = parts.next().unwrap_or("");
        let arg = parts.next().map(str::to_string);

        match cmd {
            "quit" | "q" | "exit" => Self::Quit,
            "help" | "h" | "?" => Self::Help,
            "agents" => Self::Agents,
            "agent" => Self::Agent(arg),
            "doc" => Self::Doc(arg),
            "status" => Self::Status,
            "connect" => Self::Connect,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Control flow for the console loop.
pub enum ControlFlow {
    Continue,
    Exit,
}

// ─────────────────────────────────────────────────────────────────────────────
// Data renderers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkLogEntry {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// Register the console's work-log and document renderers on `router`.
pub fn register_renderers(router: &DataRouter) -> Vec<DataSubscription> {
    let work_log = router.subscribe_typed(WORK_LOG_SUBJECT, |entry: WorkLogEntry| {
        let title = entry
            .title
            .or(entry.detail)
            .ok_or_else(|| HandlerError::from("work-log entry has no title or detail"))?;
        let status = entry.status.unwrap_or_else(|| "info".to_string());
        println!(
            "  {} {} {}",
            style("▸").magenta(),
            style(format!("[{status}]")).dim(),
            title
        );
        Ok(())
    });

    let document = router.subscribe_typed(DOCUMENT_UPDATE_SUBJECT, |fields: Map<String, Value>| {
        let changed: Vec<&str> = fields
            .keys()
            .map(String::as_str)
            .filter(|k| *k != SUBJECT_FIELD)
            .collect();
        println!(
            "  {} document updated: {}",
            style("✎").blue(),
            if changed.is_empty() {
                "(no fields)".to_string()
            } else {
                changed.join(", ")
            }
        );
        Ok(())
    });

    vec![work_log, document]
}

// ─────────────────────────────────────────────────────────────────────────────
// Console
// ─────────────────────────────────────────────────────────────────────────────

/// Console state, rebuilt from the engine's event stream.
pub struct Console {
    catalog: Vec<Agent>,
    settings: ConnectionSettings,
    verbose: bool,
    connection: ConnectionState,
    agent: Option<Agent>,
    scope: Option<String>,
    subscribed: Option<SubscriptionKey>,
    pending: HashSet<String>,
    queued: usize,
}

impl Console {
    pub fn new(
        catalog: Vec<Agent>,
        settings: ConnectionSettings,
        agent: Option<Agent>,
        scope: Option<String>,
        verbose: bool,
    ) -> Self {
        Self {
            catalog,
            settings,
            verbose,
            connection: ConnectionState::Disconnected,
            agent,
            scope,
            subscribed: None,
            pending: HashSet::new(),
            queued: 0,
        }
    }

    /// Run until the user quits or the engine stops.
    pub async fn run(
        &mut self,
        engine: &EngineHandle,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
    ) -> Result<()> {
        self.print_welcome();

        let (input_tx, mut input) = mpsc::unbounded_channel();
        spawn_input(input_tx);

        loop {
            tokio::select! {
                line = input.recv() => match line {
                    Some(Input::Line(line)) => {
                        if let ControlFlow::Exit = self.handle_line(engine, line.trim()) {
                            break;
                        }
                    }
                    Some(Input::Interrupted) => {
                        self.print_dim("(Interrupted - type /quit to exit)");
                    }
                    Some(Input::Failed(e)) => {
                        self.print_error(&format!("Input error: {}", e));
                        break;
                    }
                    Some(Input::Eof) | None => break,
                },
                event = events.recv() => match event {
                    Some(event) => self.render(event),
                    None => {
                        self.print_error("session engine stopped");
                        break;
                    }
                },
            }
        }

        self.print_dim("Goodbye!");
        Ok(())
    }

    fn handle_line(&mut self, engine: &EngineHandle, line: &str) -> ControlFlow {
        if line.is_empty() {
            return ControlFlow::Continue;
        }

        let result = if line.starts_with('/') {
            match SlashCommand::parse(line) {
                SlashCommand::Quit => return ControlFlow::Exit,
                command => self.handle_slash_command(engine, command),
            }
        } else if self.agent.is_none() {
            self.print_dim("No agent selected. Use /agents and /agent <id>.");
            Ok(())
        } else {
            engine.send_chat(line).map_err(Into::into)
        };

        if let Err(e) = result {
            self.print_error(&format!("{}", e));
        }
        ControlFlow::Continue
    }

    fn handle_slash_command(&mut self, engine: &EngineHandle, command: SlashCommand) -> Result<()> {
        match command {
            SlashCommand::Quit => {}
            SlashCommand::Help => self.print_help(),
            SlashCommand::Agents => self.print_agents(),
            SlashCommand::Agent(None) => match &self.agent {
                Some(agent) => println!("Current agent: {} ({})", agent.display_name, agent.id),
                None => self.print_dim("No agent selected"),
            },
            SlashCommand::Agent(Some(id)) if id == "-" => {
                self.agent = None;
                engine.select_agent(None)?;
            }
            SlashCommand::Agent(Some(id)) => {
                let Some(agent) = self.catalog.iter().find(|a| a.id == id).cloned() else {
                    self.print_error(&format!("Unknown agent: {}", id));
                    self.print_dim("Type /agents to list the catalog");
                    return Ok(());
                };
                self.print_dim(&format!("Switching to {}", agent.display_name));
                self.agent = Some(agent.clone());
                engine.select_agent(Some(agent))?;
            }
            SlashCommand::Doc(scope) => {
                match &scope {
                    Some(scope) => self.print_dim(&format!("Document scope: {}", scope)),
                    None => self.print_dim("Document scope cleared"),
                }
                self.scope = scope.clone();
                engine.select_scope(scope)?;
            }
            SlashCommand::Status => self.print_status(),
            SlashCommand::Connect => engine.connect()?,
            SlashCommand::Unknown(cmd) => {
                self.print_error(&format!("Unknown command: /{}", cmd));
                self.print_dim("Type /help for available commands");
            }
        }
        Ok(())
    }

    fn render(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::ConnectionChanged(state) => {
                self.connection = state;
                self.print_dim(&format!("[{}]", state));
            }
            SessionEvent::Subscribed(key) => {
                self.print_dim(&format!("[subscribed to {}]", key));
                self.subscribed = Some(key);
            }
            SessionEvent::Unsubscribed(key) => {
                if self.subscribed.as_ref() == Some(&key) {
                    self.subscribed = None;
                }
            }
            SessionEvent::Chat(entry) => self.print_chat(&entry),
            SessionEvent::Handoff(message) => {
                let payload = message.data.map(|d| d.to_string()).unwrap_or_default();
                println!("{} {}", style("[handoff]").yellow().bold(), payload);
            }
            SessionEvent::RequestSent { correlation_id } => {
                self.queued = self.queued.saturating_sub(1);
                self.pending.insert(correlation_id);
            }
            SessionEvent::ResponseReceived { correlation_id } => {
                self.pending.remove(&correlation_id);
            }
            SessionEvent::RequestAbandoned { correlation_id } => {
                self.pending.remove(&correlation_id);
                if self.verbose {
                    self.print_dim(&format!("[request {} abandoned]", correlation_id));
                }
            }
            SessionEvent::Queued { depth } => {
                self.queued = depth;
                self.print_dim(&format!("(queued until subscribed, {} waiting)", depth));
            }
            SessionEvent::HistoryLoaded { delivered, .. } => {
                if delivered > 0 || self.verbose {
                    self.print_dim(&format!("[history: {} message(s)]", delivered));
                }
            }
            SessionEvent::Error(e) => self.print_error(&e.to_string()),
        }
    }

    fn print_chat(&self, entry: &ChatEntry) {
        let text = entry.message.text.as_deref().unwrap_or_default();
        let speaker = match entry.message.direction {
            Direction::Outgoing => style("you>".to_string()).green().bold(),
            Direction::Incoming => {
                let name = self
                    .agent
                    .as_ref()
                    .map(|a| a.display_name.as_str())
                    .unwrap_or("agent");
                style(format!("{}>", name)).cyan().bold()
            }
        };
        if entry.is_history {
            let dim = Style::new().dim();
            println!("{} {}", dim.apply_to(speaker), dim.apply_to(text));
        } else {
            println!("{} {}", speaker, text);
        }
    }

    fn print_welcome(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Switchboard").bold().cyan());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!(
            "{}",
            dim.apply_to(format!(
                "{} as {} ({})",
                self.settings.server_url, self.settings.participant_id, self.settings.context
            ))
        );
        println!(
            "{}",
            dim.apply_to("Use /help for commands, Ctrl+D to exit.")
        );
        println!();
    }

    fn print_help(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Available Commands").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("  {}  - Exit the console", style("/quit, /q").cyan());
        println!("  {}  - Show this help", style("/help, /h, /?").cyan());
        println!("  {}  - List the agent catalog", style("/agents").cyan());
        println!("  {}  - Switch agent (- to release)", style("/agent <id>").cyan());
        println!("  {}  - Set or clear the document scope", style("/doc [scope]").cyan());
        println!("  {}  - Show session status", style("/status").cyan());
        println!("  {}  - Reconnect after giving up", style("/connect").cyan());
        println!();
    }

    fn print_agents(&self) {
        if self.catalog.is_empty() {
            self.print_dim("No agents configured");
            return;
        }
        for agent in &self.catalog {
            let marker = if self.agent.as_ref().map(|a| &a.id) == Some(&agent.id) {
                "*"
            } else {
                " "
            };
            println!("{} {:<24} {}", marker, style(&agent.id).cyan(), agent.display_name);
        }
    }

    fn print_status(&self) {
        let dim = Style::new().dim();
        let connection = match self.connection {
            ConnectionState::Connected => Style::new().green().apply_to("● connected"),
            ConnectionState::Connecting => Style::new().yellow().apply_to("● connecting"),
            ConnectionState::Disconnected => Style::new().red().apply_to("● disconnected"),
        };
        println!("Connection:   {}", connection);
        println!(
            "Agent:        {}",
            self.agent
                .as_ref()
                .map(|a| a.display_name.as_str())
                .unwrap_or("-")
        );
        println!("Scope:        {}", self.scope.as_deref().unwrap_or("-"));
        println!(
            "Subscription: {}",
            self.subscribed
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string())
        );
        println!(
            "{}",
            dim.apply_to(format!(
                "{} pending request(s), {} queued message(s)",
                self.pending.len(),
                self.queued
            ))
        );
    }

    fn print_dim(&self, msg: &str) {
        let dim = Style::new().dim();
        println!("{}", dim.apply_to(msg));
    }

    fn print_error(&self, msg: &str) {
        let red = Style::new().red();
        println!("{} {}", red.apply_to("Error:"), msg);
    }
}
