use clap::{Parser, Subcommand};
use herald::{
    builtin,
    dispatch::Dispatcher,
    platform::{ConsoleMessenger, InboundEvent, Messenger, RestPublisher},
    BotConfig, BotContext, Error, InternalResult, RegistrationSynchronizer, SyncOutcome,
    UnitLoader,
};
use serde_json::json;
use std::{path::PathBuf, sync::Arc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, env = "HERALD_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load all units and report what was found
    Check,
    /// Load all units and register slash commands if they changed
    Sync,
    /// Load, register, then dispatch JSON-lines events read from stdin
    Run,
}

async fn bootstrap(cli: &Cli) -> InternalResult<Arc<BotContext>> {
    let mut config = BotConfig::load(&cli.config)?;
    config.apply_env();
    info!("config loaded.");
    debug!("config: {:?}", config);

    let context = Arc::new(BotContext::new(config, builtin::catalog()));
    context.restore_cache().await;

    let report = UnitLoader::new(context.clone()).load_all().await?;
    info!(
        "{} units ready ({} loaded, {} cached, {} skipped, {} failed)",
        report.units(),
        report.loaded,
        report.cached,
        report.skipped,
        report.failed
    );
    Ok(context)
}

async fn register(context: &Arc<BotContext>) -> InternalResult<SyncOutcome> {
    let publisher = RestPublisher::from_config(context.config())?;
    let synchronizer = RegistrationSynchronizer::new(context.clone(), Arc::new(publisher)).await;
    Ok(synchronizer.sync().await)
}

async fn serve(context: Arc<BotContext>) -> InternalResult<()> {
    let messenger: Arc<dyn Messenger> = Arc::new(ConsoleMessenger::new());
    let dispatcher = Dispatcher::new(context.clone(), messenger);

    let user = context.config().client_id.clone().unwrap_or_default();
    context.emit("ready", &json!({ "user": user })).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("Input closed, shutting down...");
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read input: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<InboundEvent>(&line) {
                    Ok(event) => {
                        let dispatcher = dispatcher.clone();
                        tokio::spawn(async move {
                            let outcome = dispatcher.dispatch(event).await;
                            debug!("dispatch outcome: {:?}", outcome);
                        });
                    }
                    Err(e) => warn!("Ignoring malformed event: {}", e),
                }
            }
            result = &mut shutdown => {
                result.map_err(|e| Error::internal(format!("Failed to wait for Ctrl+C: {}", e)))?;
                info!("Shutdown signal received, performing clean shutdown...");
                break;
            }
        }
    }

    context.shutdown();
    Ok(())
}

async fn run(cli: &Cli) -> InternalResult<()> {
    let context = bootstrap(cli).await?;

    match cli.command {
        Command::Check => {
            let registry = context.registry().await;
            for unit in registry.structured_units() {
                println!("slash    {}", unit.name());
            }
            println!(
                "{} slash commands, {} message commands",
                registry.structured_len(),
                registry.prefixed_len()
            );
        }
        Command::Sync => {
            if let SyncOutcome::Failed { reason } = register(&context).await? {
                return Err(Error::internal(reason));
            }
        }
        Command::Run => {
            match register(&context).await {
                Ok(outcome) => debug!("registration: {:?}", outcome),
                Err(e) => warn!("Skipping slash command registration: {}", e),
            }
            serve(context).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // stdout carries the JSON-lines replies
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
