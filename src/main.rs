//! freebie CLI - idle a Steam session and claim free games.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use freebie::control;
use freebie::models::OfferPolicy;
use freebie::session::guard;
use freebie::{
    ActiveProducts, BridgeClient, CatalogScanner, ClaimExecutor, ClaimLoop, Config, Ledger,
    LogNotifier, Notifier, SentryStore, SessionManager, SessionSettings, SmtpNotifier, StoreClient,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

/// Buffered session events between the bridge pump and the manager.
const EVENT_BUFFER: usize = 32;

#[derive(Parser)]
#[command(name = "freebie")]
#[command(author = "Infernet <dev@infernet.org>")]
#[command(version)]
#[command(about = "Keeps a Steam session idling and claims free games as they appear")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "freebie.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Log on, idle the configured games and claim free offers (default)
    Run,

    /// Validate configuration file and required environment
    Validate,

    /// Show example configuration
    Example,

    /// Print the current two-factor code
    Code,

    /// List titles already recorded in the ledger
    Ledger,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# freebie configuration file
# Secrets are read from the environment variables named below.

[account]
username_env = "STEAM_USERNAME"
password_env = "STEAM_PASSWORD"
shared_secret_env = "STEAM_SHARED_SECRET"
persona_state = 1
games = [578080, 304930, 230410, 729460, 42700, 1222730, 414700, 1546990, 1547000, 242760, 281990, 383180]

[store]
base_url = "https://store.steampowered.com"
timeout_secs = 30
max_retries = 3
max_price = "free"
discount_threshold = 80
# country = "us"

[schedule]
min_interval_secs = 3600
max_interval_secs = 21600
claim_delay_ms = 2000
retry_delay_secs = 600
idle_refresh_secs = 3600
idle_pause_secs = 10
# "after_notify_attempt" or "after_notify_success"
ledger_policy = "after_notify_attempt"

[paths]
sentry_file = "sentry.bin"
ledger_file = "seen_promotions.txt"

[notify]
smtp_host = "smtp.gmail.com"
smtp_port = 587
sender_env = "SENDER_EMAIL"
sender_password_env = "SENDER_PASSWORD"
receiver_env = "RECEIVER_EMAIL"
subject = "New Free Steam Games Claimed!"
dry_run = false

[control]
enabled = true
bind = "0.0.0.0:3000"

[session]
bridge_url = "http://127.0.0.1:8787"
event_wait_secs = 25
"#;
    println!("{example}");
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load_or_default(path).with_context(|| format!("Failed to load config from {path:?}"))
}

async fn run(config: Config) -> Result<()> {
    // Fail fast on configuration before any session exists.
    let secrets = config
        .resolve_secrets()
        .context("Missing required configuration")?;
    let ledger = Ledger::open(&config.paths.ledger_file).context("Failed to open ledger")?;

    let store = Arc::new(StoreClient::new(&config.store, None)?);
    let bridge = Arc::new(BridgeClient::new(&config.session)?);
    let notifier: Arc<dyn Notifier> = if config.notify.dry_run {
        info!("Dry run: notifications are only logged");
        Arc::new(LogNotifier)
    } else {
        Arc::new(SmtpNotifier::new(&config.notify, &secrets)?)
    };

    let products = ActiveProducts::new(bridge.clone(), config.account.games.clone());

    if config.control.enabled {
        let bind = config.control.bind.clone();
        let products = products.clone();
        tokio::spawn(async move {
            if let Err(e) = control::serve(&bind, products).await {
                error!(error = %e, "Control surface stopped");
            }
        });
    }

    let claim_loop = ClaimLoop::new(
        CatalogScanner::new(
            store,
            OfferPolicy {
                discount_threshold: config.store.discount_threshold,
            },
            config.store.max_price.clone(),
        ),
        ClaimExecutor::new(bridge.clone()),
        notifier,
        ledger,
        config.schedule.clone(),
        config.notify.subject.clone(),
    );

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let pump = bridge.spawn_event_pump(tx);

    let manager = SessionManager::new(
        bridge,
        products,
        SentryStore::new(&config.paths.sentry_file),
        SessionSettings::from_config(&config, &secrets),
    );
    let outcome = manager.run(rx, claim_loop.run()).await;
    pump.abort();

    outcome.context("Steam session ended")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Example => {
            print_example_config();
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;
            config
                .resolve_secrets()
                .context("Failed to resolve secrets")?;

            info!("Configuration is valid");
            info!("  Games: {}", config.account.games.len());
            info!(
                "  Interval: {}s - {}s",
                config.schedule.min_interval_secs, config.schedule.max_interval_secs
            );
            info!("  Discount threshold: {}%", config.store.discount_threshold);
            info!("  Ledger policy: {:?}", config.schedule.ledger_policy);
            info!("  Ledger: {:?}", config.paths.ledger_file);
        }

        Commands::Code => {
            let config = load_config(&cli.config)?;
            let secret = std::env::var(&config.account.shared_secret_env)
                .with_context(|| format!("{} is not set", config.account.shared_secret_env))?;
            println!("{}", guard::auth_code(&secret)?);
        }

        Commands::Ledger => {
            let config = load_config(&cli.config)?;
            let ledger = Ledger::open(&config.paths.ledger_file)?;
            for title in ledger.titles() {
                println!("{title}");
            }
            info!(entries = ledger.len(), "Ledger listed");
        }

        Commands::Run => {
            let config = load_config(&cli.config)?;
            run(config).await?;
        }
    }

    Ok(())
}
