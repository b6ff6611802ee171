mod app;
mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sha2::{Digest, Sha256};

use docferry_lib::config::{ConfigError, DEFAULT_CONFIG_FILE};
use docferry_lib::ops::error_class;

#[derive(Parser)]
#[command(name = "docferry-cli", about = "Resumable document migration with field-level PII encryption", version)]
struct Cli {
    /// Path to the TOML run configuration
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run (or resume) the migration
    Run {
        /// Force a dry run regardless of the config file
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the current checkpoint
    Status,

    /// Generate a fresh base64 field key
    Keygen {
        /// Also store the key in the OS keyring under this service
        #[arg(long, requires = "keyring_account")]
        keyring_service: Option<String>,
        /// Keyring account for the stored key
        #[arg(long, requires = "keyring_service")]
        keyring_account: Option<String>,
    },

    /// Print a migrated document with its encrypted fields decrypted
    Decrypt {
        /// Document id the fields were encrypted under
        #[arg(long)]
        id: String,
        /// Migrated document (JSON)
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let name = cli.command.name();

    let result = match cli.command {
        Command::Run { dry_run } => commands::run::run(&cli.config, dry_run, &cli.format).await,
        Command::Status => commands::status::run(&cli.config, &cli.format),
        Command::Keygen {
            keyring_service,
            keyring_account,
        } => commands::keygen::run(keyring_service.as_deref(), keyring_account.as_deref(), &cli.format),
        Command::Decrypt { id, file } => commands::decrypt::run(&cli.config, &id, &file),
    };

    if let Err(e) = result {
        if let Some(config_err) = e.downcast_ref::<ConfigError>() {
            log::error!("{}", config_err);
            std::process::exit(1);
        }
        // error text may carry document ids or payload fragments
        log::error!(
            "{} failed (error={}, messageSha256={})",
            name,
            error_class(e.root_cause()),
            hex::encode(Sha256::digest(format!("{:#}", e).as_bytes()))
        );
        std::process::exit(1);
    }
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Run { .. } => "run",
            Command::Status => "status",
            Command::Keygen { .. } => "keygen",
            Command::Decrypt { .. } => "decrypt",
        }
    }
}
