//! GemBridge CLI: run the WhatsApp bridge, poke Gemini, inspect sessions.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::*;
use tracing_subscriber::EnvFilter;

use gembridge_core::config::GemBridgeConfig;
use gembridge_core::dispatcher::Dispatcher;
use gembridge_core::manager::SessionManager;
use gembridge_core::message::Turn;
use gembridge_core::provider::LlmProvider;
use gembridge_core::store::SessionStore;
use gembridge_hub::channels::{WhatsAppChannel, WhatsAppConfig};
use gembridge_hub::providers::GeminiProvider;
use gembridge_hub::store::JsonSessionStore;
use gembridge_hub::sweep::IdleSweeper;

// ─── CLI Definition ────────────────────────────────────────

/// GemBridge — chat with Google Gemini over WhatsApp 🦀⚡
#[derive(Parser)]
#[command(name = "gembridge", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// 📱 Run the bridge service (default when no command is given)
    Run {
        /// Bridge URL (e.g. http://localhost:3001)
        #[arg(short, long)]
        bridge: Option<String>,

        /// Gemini API key (or use config / env)
        #[arg(short = 'k', long, env = "GEMINI_API_KEY")]
        api_key: Option<String>,

        /// Model to use (overrides config)
        #[arg(short, long)]
        model: Option<String>,

        /// Directory for session files
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Allowed phone numbers (comma-separated)
        #[arg(long)]
        allowed_numbers: Option<String>,
    },

    /// ❓ Send a single prompt to Gemini and print the reply
    Ask {
        /// The prompt to send
        prompt: String,

        /// Gemini API key (or use config / env)
        #[arg(short = 'k', long, env = "GEMINI_API_KEY")]
        api_key: Option<String>,

        /// Model to use
        #[arg(short, long)]
        model: Option<String>,
    },

    /// 📒 List stored sessions
    Sessions {
        /// Directory for session files
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },

    /// ⚙️  Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Key to set (e.g. api_key, model, bridge_url, max_history)
        key: String,
        /// Value to set
        value: String,
    },
    /// Print the config file location
    Path,
}

// ─── Helpers ───────────────────────────────────────────────

fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    let title = format!("    ║       ⚡ GemBridge v{} ⚡        ║", version);
    println!();
    println!(
        "{}",
        "    ╔══════════════════════════════════════╗".cyan()
    );
    println!("{}", title.cyan());
    println!(
        "{}",
        "    ║  WhatsApp ↔ Gemini session bridge  ║".cyan()
    );
    println!(
        "{}",
        "    ╚══════════════════════════════════════╝\n".cyan()
    );
}

/// Resolve the Gemini API key: CLI arg → saved config → env vars → error.
fn resolve_api_key(provided: Option<&str>, config: &GemBridgeConfig) -> anyhow::Result<String> {
    if let Some(key) = provided
        && !key.is_empty()
    {
        return Ok(key.to_string());
    }

    if let Some(key) = &config.provider.api_key
        && !key.is_empty()
    {
        return Ok(key.clone());
    }

    for var in ["GEMINI_API_KEY", "GOOGLE_API_KEY"] {
        if let Ok(val) = std::env::var(var)
            && !val.is_empty()
        {
            return Ok(val);
        }
    }

    anyhow::bail!(
        "No API key found!\n\n\
         • {} to set one\n\
         • Set the {} environment variable\n\
         • Pass {}",
        "gembridge config set api_key <KEY>".cyan(),
        "GEMINI_API_KEY".bold(),
        "--api-key <KEY>".cyan()
    )
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gembridge")
}

fn load_config() -> anyhow::Result<GemBridgeConfig> {
    Ok(GemBridgeConfig::load(&GemBridgeConfig::default_path())?)
}

// ─── Main ──────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,gembridge_core=debug,gembridge_hub=debug")
        }))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run {
            bridge,
            api_key,
            model,
            data_dir,
            allowed_numbers,
        }) => {
            run_bridge(
                bridge.as_deref(),
                api_key.as_deref(),
                model.as_deref(),
                data_dir,
                allowed_numbers.as_deref(),
            )
            .await?;
        }

        Some(Commands::Ask {
            prompt,
            api_key,
            model,
        }) => {
            run_ask(&prompt, api_key.as_deref(), model.as_deref()).await?;
        }

        Some(Commands::Sessions { data_dir }) => {
            run_sessions(data_dir).await?;
        }

        Some(Commands::Config { action }) => {
            run_config(action)?;
        }

        None => {
            run_bridge(None, None, None, None, None).await?;
        }
    }

    Ok(())
}

// ─── Commands ──────────────────────────────────────────────

async fn run_bridge(
    bridge: Option<&str>,
    api_key: Option<&str>,
    model: Option<&str>,
    data_dir: Option<PathBuf>,
    allowed_numbers: Option<&str>,
) -> anyhow::Result<()> {
    let mut config = load_config()?;
    config.provider.api_key = Some(resolve_api_key(api_key, &config)?);
    if let Some(model) = model {
        config.provider.model = model.to_string();
    }

    let bridge_url = bridge
        .map(|s| s.to_string())
        .unwrap_or_else(|| config.whatsapp.bridge_url.clone());
    let data_dir = data_dir.unwrap_or_else(default_data_dir);

    let allowed: Vec<String> = allowed_numbers
        .map(|s| {
            s.split(',')
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect()
        })
        .unwrap_or_else(|| config.whatsapp.allowed_numbers.clone());

    print_banner();
    println!(
        "  {} {}",
        "Mode:".dimmed(),
        "📱 WhatsApp Bridge".green().bold()
    );
    println!(
        "  {} {} │ {} {}",
        "Bridge:".dimmed(),
        bridge_url.green(),
        "Model:".dimmed(),
        config.provider.model.green()
    );
    println!(
        "  {} {}",
        "Data:".dimmed(),
        data_dir.display().to_string().dimmed()
    );
    if allowed.is_empty() {
        println!("  {} {}", "Access:".dimmed(), "Everyone".yellow());
    } else {
        println!("  {} {:?}", "Allowed:".dimmed(), allowed);
    }
    println!("\n  {}", "Press Ctrl+C to stop".dimmed());

    let store = Arc::new(JsonSessionStore::open(&data_dir)?);
    let provider = Arc::new(GeminiProvider::new(config.provider.clone()));
    let manager = Arc::new(SessionManager::new(store, provider, config.session.clone()));

    let mut channel = WhatsAppChannel::new(WhatsAppConfig {
        bridge_url,
        allowed_numbers: allowed,
        poll_interval_ms: config.whatsapp.poll_interval_ms,
    });
    let transport = Arc::new(channel.transport());

    let dispatcher = Arc::new(Dispatcher::new(
        manager.clone(),
        transport.clone(),
        config.messages.clone(),
        &config.whatsapp.prefix,
    ));

    channel.start(dispatcher).await?;
    let sweeper = IdleSweeper::start(
        manager,
        transport,
        config.session.idle_timeout_secs,
        config.session.sweep_interval_secs,
        config.messages.idle_closed.clone(),
    );

    tokio::signal::ctrl_c().await?;
    println!("\n{}", "🛑 Shutting down...".yellow());
    sweeper.stop().await;
    channel.stop().await;
    println!("{}", "👋 Goodbye!".cyan());

    Ok(())
}

async fn run_ask(prompt: &str, api_key: Option<&str>, model: Option<&str>) -> anyhow::Result<()> {
    let mut config = load_config()?;
    config.provider.api_key = Some(resolve_api_key(api_key, &config)?);
    if let Some(model) = model {
        config.provider.model = model.to_string();
    }

    let provider = GeminiProvider::new(config.provider.clone());
    match provider.generate(&[], &Turn::user(prompt)).await {
        Ok(reply) => println!("{}", reply),
        Err(e) => eprintln!("{}: {}", "Error".red(), e),
    }

    Ok(())
}

async fn run_sessions(data_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let data_dir = data_dir.unwrap_or_else(default_data_dir);
    let store = JsonSessionStore::open(&data_dir)?;
    let sessions = store.load().await?;

    if sessions.is_empty() {
        println!("No stored sessions.");
        return Ok(());
    }

    for (user_id, session) in &sessions {
        let state = if session.active {
            "● active".green()
        } else {
            "○ idle  ".dimmed()
        };
        println!(
            "  {} {} │ {} turn(s) │ last active {}",
            state,
            user_id.bold(),
            session.history.len().to_string().cyan(),
            session
                .last_active_at
                .format("%Y-%m-%d %H:%M:%S UTC")
                .to_string()
                .dimmed()
        );
    }

    Ok(())
}

fn run_config(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let mut config = load_config()?;
            if let Some(key) = config.provider.api_key.take() {
                let masked: String = key.chars().take(8).collect();
                config.provider.api_key = Some(format!("{}...", masked));
            }
            println!("{}", toml::to_string_pretty(&config)?);
        }

        ConfigAction::Set { key, value } => {
            let mut config = load_config()?;
            match key.as_str() {
                "api_key" => config.provider.api_key = Some(value.clone()),
                "model" => config.provider.model = value.clone(),
                "api_base" => config.provider.api_base = Some(value.clone()),
                "request_timeout_secs" => config.provider.request_timeout_secs = value.parse()?,
                "bridge_url" => config.whatsapp.bridge_url = value.clone(),
                "poll_interval_ms" => config.whatsapp.poll_interval_ms = value.parse()?,
                "prefix" => config.whatsapp.prefix = value.clone(),
                "max_history" => config.session.max_history = value.parse()?,
                "idle_timeout_secs" => config.session.idle_timeout_secs = value.parse()?,
                "sweep_interval_secs" => config.session.sweep_interval_secs = value.parse()?,
                "greeting_prompt" => config.session.greeting_prompt = value.clone(),
                "resume_prompt" => config.session.resume_prompt = value.clone(),
                other => anyhow::bail!("Unknown config key: {}", other),
            }
            config.save(&GemBridgeConfig::default_path())?;
            println!("{} {} = {}", "✅ Set".green(), key.bold(), value);
        }

        ConfigAction::Path => {
            println!("{}", GemBridgeConfig::default_path().display());
        }
    }

    Ok(())
}
