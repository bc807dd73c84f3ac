use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use switchboard::api::ApiServer;
use switchboard::{
    Authenticator, CachedAuthenticator, CallLogRepo, Config, StaticTokenAuthenticator, builtin, db,
};

/// Switchboard - RPC dispatch engine
#[derive(Parser)]
#[command(name = "switchboard", version, about)]
struct Cli {
    /// Path to config file (defaults to ~/.config/switchboard/config.toml)
    #[arg(short, long, global = true, env = "SWITCHBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve RPC calls over HTTP
    Serve {
        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Show the most recent logged calls
    Calls {
        /// Number of calls to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,switchboard=info",
        1 => "info,switchboard=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { port } => serve(config, port).await,
        Command::Calls { limit } => show_calls(&config, limit),
    }
}

async fn serve(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    let pool = db::init(&config.database.path)?;
    let repo = CallLogRepo::new(pool);

    let tokens = StaticTokenAuthenticator::from_grants(&config.auth.tokens)?;
    if tokens.is_empty() {
        tracing::warn!("no auth tokens configured - protected endpoints will reject every call");
    }
    let authenticator: Arc<dyn Authenticator> = if config.auth.cache_ttl_secs > 0 {
        Arc::new(CachedAuthenticator::new(
            Arc::new(tokens),
            Duration::from_secs(config.auth.cache_ttl_secs),
        ))
    } else {
        Arc::new(tokens)
    };

    let dispatcher = Arc::new(builtin::registry(repo, authenticator)?);

    ApiServer::new(dispatcher, port.unwrap_or(config.server.port))
        .rate_limit(config.server.rate_limit_per_minute)
        .max_body_bytes(config.server.max_body_bytes)
        .run()
        .await?;

    Ok(())
}

fn show_calls(config: &Config, limit: usize) -> anyhow::Result<()> {
    let repo = CallLogRepo::new(db::init(&config.database.path)?);
    let calls = repo.list_recent(limit)?;

    if calls.is_empty() {
        println!("No calls logged");
        return Ok(());
    }

    for call in calls {
        println!(
            "#{:<6} {}  {}/{}  {}  {}ms  user={}",
            call.id,
            call.started_at.format("%Y-%m-%d %H:%M:%S"),
            call.endpoint,
            call.method,
            call.outcome,
            call.duration_ms,
            call.user_id.as_deref().unwrap_or("-"),
        );
        if let Some(exception) = &call.exception {
            println!("        {exception}");
        }
    }

    Ok(())
}
