use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

use arena_realtime::config::{FileConfig, default_data_dir, load_config};

mod commands;

#[derive(Parser)]
#[command(name = "arena")]
#[command(about = "Command-line client for the Arena social backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Custom data directory (defaults to ~/.arena)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[arg(short, long, global = true, env = "ARENA_USERNAME")]
    username: Option<String>,

    #[arg(short, long, global = true, env = "ARENA_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and print the current profile as JSON
    Me,

    /// Create a new account with the global username and password
    Register(RegisterArgs),

    /// Log in, open the realtime connection, and print events until interrupted
    Watch,

    /// Use a power-up in the given slot
    PowerUp(PowerUpArgs),

    /// Upload a new avatar image
    Avatar(AvatarArgs),
}

#[derive(Parser)]
struct RegisterArgs {
    #[arg(long)]
    email: String,

    #[arg(long)]
    nickname: Option<String>,
}

#[derive(Parser)]
struct PowerUpArgs {
    #[arg(long)]
    slot: u8,
}

#[derive(Parser)]
struct AvatarArgs {
    /// Image file to upload
    file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "arena=debug,arena_realtime=debug,info"
    } else {
        "arena=info,arena_realtime=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir().context("no home directory; pass --data-dir")?,
    };
    let config: FileConfig = load_config(&data_dir)
        .extract()
        .with_context(|| format!("invalid configuration in {}", data_dir.display()))?;

    let account = commands::Account {
        username: cli.username,
        password: cli.password,
    };

    match cli.command {
        Commands::Me => commands::me(&config, &account).await,
        Commands::Register(args) => {
            commands::register(&config, &account, args.email, args.nickname).await
        }
        Commands::Watch => commands::watch(&config, &account).await,
        Commands::PowerUp(args) => commands::power_up(&config, &account, args.slot).await,
        Commands::Avatar(args) => commands::avatar(&config, &account, &args.file).await,
    }
}
