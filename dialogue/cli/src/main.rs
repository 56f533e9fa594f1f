//! Dialogue - Terminal Driver for the Dialogue Presentation Engine
//!
//! Runs a conversation with the configured character in a terminal. Revealed
//! text streams to stdout with expression changes and sound cues shown
//! inline; logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Talk to the character (needs GOOGLE_API_KEY)
//! dialogue
//!
//! # Canned replies, no network
//! dialogue --offline
//!
//! # Custom config and history
//! dialogue --config ./dialogue.toml --history /tmp/history.dat
//!
//! # Write the transcript (JSON lines) and exit
//! dialogue --export transcript.txt
//!
//! # Verbose logging
//! RUST_LOG=debug dialogue
//! ```
//!
//! # Signals
//!
//! - `SIGINT` (Ctrl+C): cancel any in-flight reply and exit

mod input;
mod render;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use dialogue_core::{
    backend::ChatBackend, history, load_config_from_path, load_options, ConfigOverrides,
    Controller, ControllerOptions, ConversationState, EngineConfig, FileHistoryStore,
    GeminiBackend, HistoryStore, ScriptedBackend, SettingsSource, SharedSettings, StreamAdapter,
};

use input::{parse_command, Command, HELP};
use render::Presenter;

/// Lines the offline character cycles through
const OFFLINE_LINES: &[&str] = &[
    "[happy]Oh! Hi there! I can't reach my thoughts right now, but I'm listening.",
    "[thinking]Hmm... that's a good one. [sfx:chime]Let me think about it.",
    "[confused]I'm not sure I follow... [normal]could you say it another way?",
];

/// Dialogue - talk to a character in the terminal
#[derive(Parser, Debug)]
#[command(name = "dialogue")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "DIALOGUE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Model name override
    #[arg(short = 'm', long, value_name = "MODEL")]
    model: Option<String>,

    /// History file override
    #[arg(long, value_name = "FILE")]
    history: Option<PathBuf>,

    /// Options file override
    #[arg(long, value_name = "FILE")]
    options: Option<PathBuf>,

    /// Reveal at a steady rate without punctuation pauses
    #[arg(long)]
    no_pauses: bool,

    /// Use canned replies instead of the network backend
    #[arg(long)]
    offline: bool,

    /// Write the transcript to FILE and exit
    #[arg(long, value_name = "FILE")]
    export: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "DIALOGUE_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(model) = &self.model {
            overrides = overrides.with_model(model.clone());
        }
        if let Some(path) = &self.history {
            overrides = overrides.with_history_path(path.clone());
        }
        if let Some(path) = &self.options {
            overrides = overrides.with_options_path(path.clone());
        }
        if self.no_pauses {
            overrides = overrides.with_punctuation_pauses(false);
        }
        overrides
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("dialogue={level},dialogue_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn build_backend(config: &EngineConfig, offline: bool) -> Result<Arc<dyn ChatBackend>> {
    if offline {
        info!("Offline mode, using scripted replies");
        let lines = OFFLINE_LINES.iter().map(|l| (*l).to_string()).collect();
        return Ok(Arc::new(ScriptedBackend::cycling(lines)));
    }

    let backend = GeminiBackend::from_config(&config.backend)
        .context("Cannot start the network backend (set GOOGLE_API_KEY or pass --offline)")?;
    info!(model = backend.model(), "Using Gemini backend");
    Ok(Arc::new(backend))
}

fn export_transcript(store: &FileHistoryStore, path: &Path) -> Result<()> {
    let conversation = store
        .load()
        .with_context(|| format!("Failed to read history at {}", store.path().display()))?;
    let file = fs::File::create(path)
        .with_context(|| format!("Failed to create export file: {}", path.display()))?;
    history::export(&conversation, std::io::BufWriter::new(file))?;
    info!(turns = conversation.len(), path = %path.display(), "Transcript exported");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = load_config_from_path(args.config.clone())?;
    let options = load_options(&config.options_path);
    if let Some(model) = options.ai_model_name.as_ref().filter(|m| !m.trim().is_empty()) {
        config.backend.model = model.trim().to_string();
    }
    args.overrides().apply(&mut config);
    info!(source = %config.source(), "Configuration loaded");

    let store = FileHistoryStore::new(&config.history_path);
    if let Some(path) = &args.export {
        return export_transcript(&store, path);
    }

    let settings = SharedSettings::new(options.to_settings());
    let backend = build_backend(&config, args.offline)?;
    let adapter = StreamAdapter::new(backend, config.retry.clone());

    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
    let mut controller = Controller::new(
        adapter,
        Box::new(store),
        config.catalog(),
        ControllerOptions::from_config(&config),
        msg_tx,
    );
    let mut presenter = Presenter::stdout(config.character.name.clone());

    // Terminal lines arrive on their own task so the tick loop never waits on stdin
    let (line_tx, mut line_rx) = mpsc::channel::<String>(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    if controller.load_history()? == 0 {
        controller.greet()?;
    }
    println!("{HELP}\n");

    let mut interval = tokio::time::interval(config.tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_tick = tokio::time::Instant::now();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
            line = line_rx.recv() => {
                let Some(line) = line else {
                    info!("Input closed, shutting down");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(Command::Quit) => break,
                    Ok(Command::Help) => println!("{HELP}"),
                    Ok(edit) if edit.is_settings_edit() && controller.state() != ConversationState::MenuOpen => {
                        println!("Open the menu with /menu to change settings");
                    }
                    Ok(Command::Speed(speed)) => settings.update(|s| s.reveal_rate_per_char = speed.per_char()),
                    Ok(Command::Name(name)) => settings.update(|s| s.display_name = name),
                    Ok(Command::Volume(volume)) => settings.update(|s| s.volume = volume),
                    Ok(Command::Verb(verb)) => {
                        if let Err(e) = controller.handle(verb) {
                            println!("({e})");
                        }
                    }
                    Err(e) => println!("{e}"),
                }
            }
            now = interval.tick() => {
                let elapsed = now.saturating_duration_since(last_tick);
                last_tick = now;

                let snapshot = settings.snapshot();
                controller.tick(elapsed, snapshot.clone());
                while let Ok(msg) = msg_rx.try_recv() {
                    if let Err(e) = presenter.present(&msg, &snapshot) {
                        warn!(error = %e, "Failed to write to terminal");
                    }
                }
            }
        }
    }

    controller.shutdown();
    info!("Dialogue stopped cleanly");
    Ok(())
}
