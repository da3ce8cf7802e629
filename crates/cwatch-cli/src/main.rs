mod monitor;
mod schedule;
mod settings;
mod store;
mod validate;

#[cfg(test)]
mod fakes;

use clap::{Parser, Subcommand};
use cwatch_scraper::{ChromeDriver, LaunchProfile, PageSession};
use tracing_subscriber::EnvFilter;

use crate::settings::CycleSettings;
use crate::store::PgStore;

#[derive(Debug, Parser)]
#[command(name = "cwatch")]
#[command(about = "Follower and post counter monitor for Instagram and TikTok handles")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scrape follower and post counts for every declared handle
    Monitor {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },
    /// Check new, edited or unresolved handles against the counter sites
    Validate {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check that the database is reachable
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = cwatch_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let Some(command) = cli.command else {
        tracing::info!("no command given; run `cwatch --help` for usage");
        return Ok(());
    };

    let pool = cwatch_db::connect(&config).await?;

    match command {
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            cwatch_db::ping(&pool).await?;
            tracing::info!("database reachable");
        }
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            cwatch_db::migrate(&pool).await?;
            tracing::info!("migrations complete");
        }
        Commands::Monitor { once } => {
            let settings = CycleSettings::monitor(&config)?;
            let store = PgStore::new(pool);
            let mut session = launch_session(&config, &settings).await?;
            monitor::run(&mut session, &store, &settings, once, shutdown_signal()).await?;
        }
        Commands::Validate { once } => {
            let settings = CycleSettings::validate(&config)?;
            let store = PgStore::new(pool);
            let mut session = launch_session(&config, &settings).await?;
            validate::run(&mut session, &store, &settings, once, shutdown_signal()).await?;
        }
    }

    Ok(())
}

async fn launch_session(
    config: &cwatch_core::AppConfig,
    settings: &CycleSettings,
) -> anyhow::Result<PageSession<ChromeDriver>> {
    let driver = ChromeDriver::launch(&LaunchProfile::from_app_config(config)).await?;
    Ok(PageSession::new(driver, settings.policy.clone()))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, closing browser");
}
