//! `ourafrica` - sign in and manage certificates from the terminal.

mod cmd;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use ourafrica_client::{ClientConfig, ClientError, OurAfricaClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ourafrica")]
#[command(about = "OurAfrica learning platform client")]
struct Cli {
    /// Work from the local cache only
    #[arg(long, global = true)]
    offline: bool,

    /// Backend base URL (overrides OURAFRICA_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: Option<String>,
    },

    /// Sign out and clear stored tokens
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Show session state and token expiry
    Status,

    /// Renew the access token now
    Refresh,

    /// Course completion certificates
    #[command(subcommand)]
    Certificates(cmd::certificates::CertificateCommands),
}

const DEFAULT_LOG_FILTER: &str = "warn,ourafrica_client=info";

#[tokio::main]
async fn main() {
    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(err) = run(Cli::parse()).await {
        report(&err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ClientConfig::from_env().context("Failed to load configuration")?;
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url;
    }
    config.offline |= cli.offline;
    tracing::debug!(?config, "Configuration loaded");

    let client = OurAfricaClient::from_config(&config)
        .await
        .context("Failed to open local session storage")?;

    match cli.command {
        Commands::Login { email } => cmd::auth::login(&client, email).await,
        Commands::Logout => cmd::auth::logout(&client).await,
        Commands::Whoami => cmd::auth::whoami(&client).await,
        Commands::Status => cmd::auth::status(&client),
        Commands::Refresh => cmd::auth::refresh(&client).await,
        Commands::Certificates(command) => cmd::certificates::run(&client, command).await,
    }
}

fn report(err: &anyhow::Error) {
    let Some(client_err) = err.downcast_ref::<ClientError>() else {
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        return;
    };

    let api = client_err.to_api_error();
    eprintln!("{} {}", "Error:".red().bold(), api.title);
    for detail in api.details.iter().flatten() {
        eprintln!("  {}", detail);
    }
    for (field, messages) in api.field_errors.iter().flatten() {
        eprintln!("  {}: {}", field.yellow(), messages.join(", "));
    }
    if client_err.is_unauthorized() {
        eprintln!("{}", "Run `ourafrica login` to sign in again.".dimmed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_filter_parses() {
        let filter = tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER).unwrap();
        assert_eq!(
            filter.max_level_hint(),
            Some(tracing_subscriber::filter::LevelFilter::INFO)
        );
    }
}
