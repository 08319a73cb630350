mod commands;
mod config;
mod render;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use client_logging::{client_error, LogDestination};
use log::LevelFilter;

#[derive(Parser)]
#[command(name = "datamate")]
#[command(about = "Browse and upload DataMate datasets")]
#[command(version)]
struct Cli {
    /// RON config file; defaults are used when it does not exist.
    #[arg(long, global = true, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Also log to the terminal, at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "List datasets, optionally refreshing on an interval")]
    List(ListArgs),
    #[command(about = "Upload files into a dataset in checksummed chunks")]
    Upload(UploadArgs),
    #[command(about = "Write a config file holding the defaults")]
    InitConfig {
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(long, short)]
    pub keyword: Option<String>,

    /// `key=value`, repeatable. Multi-select values are comma separated.
    #[arg(long = "filter", short)]
    pub filters: Vec<String>,

    #[arg(long, default_value_t = 1)]
    pub page: u32,

    #[arg(long)]
    pub page_size: Option<u32>,

    /// Keep refreshing every polling interval until interrupted.
    #[arg(long)]
    pub poll: bool,

    /// Stop polling after this many refreshes.
    #[arg(long, requires = "poll")]
    pub ticks: Option<u32>,
}

#[derive(Args)]
pub struct UploadArgs {
    #[arg(long)]
    pub dataset_id: String,

    /// Dataset name shown in the task title; defaults to the id.
    #[arg(long)]
    pub name: Option<String>,

    /// Target directory inside the dataset.
    #[arg(long)]
    pub prefix: Option<String>,

    /// Ask the backend to unpack archives.
    #[arg(long)]
    pub archive: bool,

    /// Overrides `chunk_size` from the config.
    #[arg(long)]
    pub chunk_size: Option<u64>,

    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if let Err(err) = run(cli).await {
        client_error!("{:#}", err);
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_logging(cli: &Cli) {
    let file = cli
        .log_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(client_logging::DEFAULT_LOG_FILE));
    if cli.verbose {
        client_logging::initialize(LogDestination::Both(file), LevelFilter::Debug);
    } else {
        client_logging::initialize(LogDestination::File(file), LevelFilter::Info);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::InitConfig { force } => {
            config::save_config(&cli.config, &config::ClientConfig::default(), force)
        }
        Command::List(args) => {
            let config = config::load_config(&cli.config)?;
            commands::list(&config, args).await
        }
        Command::Upload(args) => {
            let config = config::load_config(&cli.config)?;
            commands::upload(&config, args).await
        }
    }
}
