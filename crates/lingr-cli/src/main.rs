//! LINGR CLI
//!
//! Headless driver for the LINGR presence core.
//!
//! # Commands
//!
//! - `run`: keep the presence alive in real time, printing what it does
//! - `simulate`: drive it through virtual time and print a timeline
//! - `status`, `summon`, `evidence`, `episodes`, `settings`, `home`, `reset`:
//!   one-shot inspection and control against the same database
//!
//! Logging goes to stderr through env_logger. `RUST_LOG` wins over `-v`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use log::info;

use lingr::atoms::error::EngineResult;
use lingr::atoms::types::{Coordinates, EpisodeTrigger, EvidenceKind, Frequency, QuietHours};
use lingr::engine::events::{EventData, PresenceEvent};
use lingr::engine::store::StateStore;
use lingr::{Clock, Collaborators, ControlSettings, Presence, PresenceConfig, PresenceStatus};

mod platform;

use platform::{FixedLocation, PrintExecutor, TerminalTransport};

/// LINGR: an ambient presence that inhabits your device
#[derive(Parser)]
#[command(name = "lingr")]
#[command(version)]
#[command(about = "Run, simulate and inspect the LINGR presence")]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (TOML). Defaults to <config dir>/lingr/config.toml
    #[arg(long, env = "LINGR_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Database path, overriding the config file
    #[arg(long, env = "LINGR_DB", global = true)]
    db: Option<PathBuf>,

    /// Fixed RNG seed, overriding the config file
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Pretend the device is at LAT,LON
    #[arg(long, value_parser = platform::parse_coordinates, global = true)]
    location: Option<Coordinates>,

    /// Print JSON instead of text where it applies
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep the presence running in real time until Ctrl-C
    Run {
        /// Send a test notification on start
        #[arg(long)]
        test_notification: bool,
    },
    /// Drive the presence through virtual time
    Simulate {
        /// How much virtual time to cover
        #[arg(long, default_value_t = 24 * 60)]
        minutes: i64,
        /// Report interval in minutes
        #[arg(long, default_value_t = 60)]
        every: i64,
        /// Run against the real database instead of a throwaway one
        #[arg(long)]
        persist: bool,
    },
    /// Show the current state
    Status,
    /// Say something to it
    Summon {
        #[arg(required = true)]
        message: Vec<String>,
    },
    /// Inspect or edit the evidence log
    Evidence {
        #[command(subcommand)]
        action: EvidenceCommands,
    },
    /// Episode catalog and progress
    Episodes {
        #[command(subcommand)]
        action: EpisodeCommands,
    },
    /// Show or change control settings
    Settings {
        #[command(subcommand)]
        action: SettingsCommands,
    },
    /// Set the home base used for HOME/AWAY classification
    Home {
        #[arg(value_parser = platform::parse_coordinates)]
        coordinates: Coordinates,
    },
    /// Wipe all persisted state
    Reset {
        /// Skip the confirmation check
        #[arg(long)]
        yes: bool,
    },
    /// Print shell completions
    Completions { shell: clap_complete::Shell },
}

#[derive(Subcommand)]
enum EvidenceCommands {
    /// List entries, newest first
    List {
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Record an entry by hand
    Add {
        #[arg(value_enum)]
        kind: KindArg,
        description: String,
    },
    Remove { id: String },
    Clear,
}

#[derive(Subcommand)]
enum EpisodeCommands {
    /// Catalog with live status
    List,
    Start { id: String },
    /// Fire a named trigger at the active episode
    Trigger {
        #[arg(value_enum)]
        trigger: TriggerArg,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    Show,
    /// Change one or more settings; the rest keep their values
    Set {
        #[arg(long)]
        presence: Option<bool>,
        #[arg(long)]
        ambient: Option<bool>,
        #[arg(long, value_enum)]
        frequency: Option<FrequencyArg>,
        /// HH:MM-HH:MM
        #[arg(long, value_parser = QuietHours::parse)]
        quiet_hours: Option<QuietHours>,
        #[arg(long)]
        haptics: Option<bool>,
        #[arg(long)]
        location_awareness: Option<bool>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Capture,
    Message,
    Anomaly,
}

impl From<KindArg> for EvidenceKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Capture => EvidenceKind::Capture,
            KindArg::Message => EvidenceKind::Message,
            KindArg::Anomaly => EvidenceKind::Anomaly,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FrequencyArg {
    Low,
    Normal,
    High,
}

impl From<FrequencyArg> for Frequency {
    fn from(frequency: FrequencyArg) -> Self {
        match frequency {
            FrequencyArg::Low => Frequency::Low,
            FrequencyArg::Normal => Frequency::Normal,
            FrequencyArg::High => Frequency::High,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum TriggerArg {
    OpenApp,
    Scan,
    EvidenceAdded,
    SummonMessage,
    Timer,
    NotificationSent,
}

impl From<TriggerArg> for EpisodeTrigger {
    fn from(trigger: TriggerArg) -> Self {
        match trigger {
            TriggerArg::OpenApp => EpisodeTrigger::OpenApp,
            TriggerArg::Scan => EpisodeTrigger::Scan,
            TriggerArg::EvidenceAdded => EpisodeTrigger::EvidenceAdded,
            TriggerArg::SummonMessage => EpisodeTrigger::SummonMessage,
            TriggerArg::Timer => EpisodeTrigger::Timer,
            TriggerArg::NotificationSent => EpisodeTrigger::NotificationSent,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_target(false)
        .init();

    if let Err(e) = execute(cli).await {
        eprintln!("lingr: {e}");
        std::process::exit(1);
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lingr")
        .join("config.toml")
}

fn load_config(cli: &Cli) -> EngineResult<PresenceConfig> {
    let path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = PresenceConfig::load(&path)?;
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    Ok(config)
}

fn collaborators(transport: Arc<TerminalTransport>, location: Option<Coordinates>, quiet: bool) -> Collaborators {
    Collaborators {
        transport,
        location: Arc::new(FixedLocation::new(location)),
        executor: Arc::new(PrintExecutor::new(quiet)),
    }
}

/// One-shot commands run with a muted transport, leaving the day's
/// notification budget to `run`.
async fn open_one_shot(cli: &Cli) -> EngineResult<Presence> {
    let config = load_config(cli)?;
    let transport = Arc::new(TerminalTransport::new(true));
    let presence = Presence::open(config, Clock::system(), collaborators(transport, cli.location, false))?;
    presence.initialize().await;
    Ok(presence)
}

async fn execute(cli: Cli) -> EngineResult<()> {
    match &cli.command {
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "lingr", &mut std::io::stdout());
            Ok(())
        }
        Commands::Run { test_notification } => run_live(&cli, *test_notification).await,
        Commands::Simulate { minutes, every, persist } => simulate(&cli, *minutes, *every, *persist).await,
        _ => {
            let presence = open_one_shot(&cli).await?;
            let result = one_shot(&cli, &presence).await;
            presence.shutdown();
            result
        }
    }
}

async fn one_shot(cli: &Cli, presence: &Presence) -> EngineResult<()> {
    match &cli.command {
        Commands::Status => print_status(&presence.status(), cli.json)?,
        Commands::Summon { message } => {
            let response = presence.process_message(&message.join(" ")).await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}", response.response_text);
            }
        }
        Commands::Evidence { action } => evidence(cli, presence, action).await?,
        Commands::Episodes { action } => episodes(cli, presence, action).await?,
        Commands::Settings { action } => settings(cli, presence, action).await?,
        Commands::Home { coordinates } => {
            presence.set_home_base(*coordinates).await;
            println!("Home base set. Environment: {}", presence.environment_mode());
        }
        Commands::Reset { yes } => {
            if !*yes {
                println!("This erases all evidence, episodes and settings. Re-run with --yes.");
                return Ok(());
            }
            presence.reset_all().await;
            println!("Reset.");
        }
        Commands::Run { .. } | Commands::Simulate { .. } | Commands::Completions { .. } => {}
    }
    Ok(())
}

// ── Output ─────────────────────────────────────────────────────────────────

fn print_status(status: &PresenceStatus, json: bool) -> EngineResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(status)?);
        return Ok(());
    }
    println!("Mood:          {} ({:.2}){}", status.mood, status.intensity, if status.in_cooldown { ", cooling down" } else { "" });
    println!("Environment:   {}", status.environment);
    println!("Evidence:      {}", status.evidence_count);
    println!(
        "Episode:       {}",
        status
            .active_episode
            .as_ref()
            .map_or_else(|| "none".to_string(), |a| format!("{} (step {})", a.episode_id, a.current_step_index + 1))
    );
    println!("Completed:     {}", if status.completed_episodes.is_empty() { "none".to_string() } else { status.completed_episodes.join(", ") });
    println!("Notifications: {}/{} today ({:?})", status.daily_notifications, status.daily_cap, status.ambient_phase);
    println!("Presence:      {}", if status.settings.presence_active { "active" } else { "paused" });
    Ok(())
}

fn describe_event(event: &PresenceEvent) -> Option<String> {
    match event.data.as_ref()? {
        EventData::EvidenceGeneration { evidence_type, description, .. } => {
            Some(format!("evidence ({}): {}", evidence_type.as_str(), description))
        }
        EventData::MoodShift { previous_mood, new_mood, .. } if previous_mood != new_mood => {
            Some(format!("mood {} -> {}", previous_mood, new_mood))
        }
        EventData::MessageRefresh { message, .. } => Some(format!("\"{}\"", message)),
        _ => None,
    }
}

// ── Subcommands ────────────────────────────────────────────────────────────

async fn evidence(cli: &Cli, presence: &Presence, action: &EvidenceCommands) -> EngineResult<()> {
    match action {
        EvidenceCommands::List { kind, limit } => {
            let wanted = kind.map(EvidenceKind::from);
            let entries: Vec<_> = presence
                .evidence()
                .into_iter()
                .filter(|e| wanted.map_or(true, |k| e.kind == k))
                .take(*limit)
                .collect();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }
            if entries.is_empty() {
                println!("No evidence.");
            }
            for entry in entries {
                println!(
                    "{}  {:<8} {}  {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.kind.as_str(),
                    entry.id,
                    entry.description
                );
            }
        }
        EvidenceCommands::Add { kind, description } => {
            let entry = presence.add_evidence((*kind).into(), description.clone(), None).await;
            println!("{}", entry.id);
        }
        EvidenceCommands::Remove { id } => {
            if presence.remove_evidence(id) {
                println!("Removed {}", id);
            } else {
                println!("No evidence with id {}", id);
            }
        }
        EvidenceCommands::Clear => {
            presence.clear_evidence();
            println!("Evidence cleared.");
        }
    }
    Ok(())
}

async fn episodes(cli: &Cli, presence: &Presence, action: &EpisodeCommands) -> EngineResult<()> {
    match action {
        EpisodeCommands::List => {
            let catalog = presence.episodes();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&catalog)?);
                return Ok(());
            }
            for episode in catalog {
                println!(
                    "{:>2}. {:<14} {:<9} {}",
                    episode.number,
                    episode.title,
                    episode.status.as_str(),
                    episode.teaser.as_deref().unwrap_or("")
                );
            }
        }
        EpisodeCommands::Start { id } => {
            if presence.start_episode(id) {
                println!("Started {}", id);
            } else {
                println!("Could not start {}", id);
            }
        }
        EpisodeCommands::Trigger { trigger } => {
            presence.fire_trigger((*trigger).into()).await;
            match presence.active_episode() {
                Some(active) => println!("{} at step {}", active.episode_id, active.current_step_index + 1),
                None => println!("No active episode."),
            }
        }
    }
    Ok(())
}

async fn settings(cli: &Cli, presence: &Presence, action: &SettingsCommands) -> EngineResult<()> {
    let mut current = presence.settings();
    if let SettingsCommands::Set {
        presence: active,
        ambient,
        frequency,
        quiet_hours,
        haptics,
        location_awareness,
    } = action
    {
        let updated = ControlSettings {
            presence_active: active.unwrap_or(current.presence_active),
            ambient_notifications_enabled: ambient.unwrap_or(current.ambient_notifications_enabled),
            frequency: frequency.map_or(current.frequency, Frequency::from),
            quiet_hours: quiet_hours.unwrap_or(current.quiet_hours),
            haptics_enabled: haptics.unwrap_or(current.haptics_enabled),
            location_awareness_enabled: location_awareness.unwrap_or(current.location_awareness_enabled),
        };
        presence.update_settings(updated.clone()).await;
        current = updated;
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&current)?);
    } else {
        println!("presence            {}", current.presence_active);
        println!("ambient             {}", current.ambient_notifications_enabled);
        println!("frequency           {} (cap {})", current.frequency.as_str(), current.frequency.daily_cap());
        println!("quiet hours         {}", current.quiet_hours);
        println!("haptics             {}", current.haptics_enabled);
        println!("location awareness  {}", current.location_awareness_enabled);
    }
    Ok(())
}

// ── Live and simulated runs ────────────────────────────────────────────────

fn print_events(presence: &Presence) {
    presence.subscribe(
        "cli",
        Arc::new(|event: &PresenceEvent| {
            if let Some(line) = describe_event(event) {
                println!("[{}] {}", event.timestamp.format("%H:%M:%S"), line);
            }
            Ok(())
        }),
    );
}

async fn run_live(cli: &Cli, test_notification: bool) -> EngineResult<()> {
    let config = load_config(cli)?;
    let transport = Arc::new(TerminalTransport::new(false));
    let presence = Presence::open(config, Clock::system(), collaborators(transport.clone(), cli.location, false))?;
    presence.initialize().await;
    print_events(&presence);
    presence.on_foreground().await;
    if test_notification && !presence.send_test_notification().await {
        println!("Test notification was not sent.");
    }

    let status = presence.status();
    println!("It is here. {} at {:.2}. Ctrl-C to leave.", status.mood, status.intensity);
    info!("[cli] Live run started");

    let tick = StdDuration::from_secs(1);
    loop {
        let now = Utc::now();
        let wait = presence
            .next_due()
            .and_then(|due| (due - now).to_std().ok())
            .map_or(tick, |d| d.min(tick));

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        presence.run_due().await;
        for notification in transport.take_due(Utc::now()) {
            println!(
                "[{}] >> {}: {}",
                notification.at.format("%H:%M:%S"),
                notification.payload.title,
                notification.payload.body
            );
        }
    }

    presence.shutdown();
    println!("It lingers.");
    Ok(())
}

async fn simulate(cli: &Cli, minutes: i64, every: i64, persist: bool) -> EngineResult<()> {
    let config = load_config(cli)?;
    let store = if persist {
        Arc::new(StateStore::open(Path::new(&config.db_path))?)
    } else {
        Arc::new(StateStore::open_in_memory()?)
    };
    let start = Utc::now();
    let clock = Clock::manual(start);
    let transport = Arc::new(TerminalTransport::new(false));
    let presence = Presence::new(config, clock.clone(), store, collaborators(transport.clone(), cli.location, true))?;
    presence.initialize().await;
    if !cli.json {
        print_events(&presence);
    }
    presence.on_foreground().await;

    let every = every.max(1);
    let mut elapsed = 0;
    let mut fired = 0;
    let mut delivered = 0;
    while elapsed < minutes {
        let step = every.min(minutes - elapsed);
        fired += presence.advance(Duration::minutes(step)).await;
        elapsed += step;

        let now = clock.now();
        // Crossing midnight is what a new app open would notice.
        if (now - Duration::minutes(step)).date_naive() != now.date_naive() {
            presence.on_foreground().await;
        }
        let due = transport.take_due(now);
        delivered += due.len();
        if cli.json {
            continue;
        }
        for notification in due {
            println!("[{}] >> {}", notification.at.format("%H:%M:%S"), notification.payload.body);
        }
        let status = presence.status();
        println!(
            "-- +{}m  {} {:.2}  evidence {}  notifications {}/{}",
            elapsed, status.mood, status.intensity, status.evidence_count, status.daily_notifications, status.daily_cap
        );
    }

    if cli.json {
        print_status(&presence.status(), true)?;
    } else {
        println!("{} timers fired, {} notifications delivered over {} virtual minutes.", fired, delivered, minutes);
    }
    presence.shutdown();
    Ok(())
}
