use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::{App, LogNavigator};
use crate::config::ConfigLoader;
use crate::store;

pub mod commands;

use self::commands::{ListArgs, NewArgs};

#[derive(Parser, Debug)]
#[command(
    name = "memoriae",
    version,
    about = "Keyboard-first terminal browser for memoriae seeds"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over MEMORIAE_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over MEMORIAE_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch the interactive TUI (default)
    Tui,
    /// Capture a new seed from the command line
    New(NewArgs),
    /// Run a non-interactive projection and print matching seeds
    List(ListArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var("MEMORIAE_CONFIG", path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var("MEMORIAE_DATA", path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = loader.load_or_init()?;
    let store = store::init(&paths, &config.storage)?;

    let config = Arc::new(config);
    let command = cli.command.unwrap_or(Commands::Tui);
    match command {
        Commands::Tui => {
            let mut app = App::new(config, store, Box::new(LogNavigator));
            app.run()
        }
        Commands::New(args) => commands::new_seed(config, store, args),
        Commands::List(args) => commands::list_seeds(config, store, args),
    }
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
