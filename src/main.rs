//! notifier - XMPP notification client
//!
//! Connects to the notification servers with automatic candidate fallback,
//! failure diagnosis and reconnects, using an auth token stored in the
//! system keyring.

use clap::{Parser, Subcommand};
use notifier_core::{error::NotifierError, init_logging};

mod cli;

#[derive(Parser)]
#[command(name = "notifier")]
#[command(about = "XMPP notification client with automatic connection fallback")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Bare JID to log in as (user@domain)
        username: String,
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
    /// Store the auth token in the system keyring
    SetToken,
    /// Resolve the configured servers and list candidates in try order
    Candidates {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Connect and stay connected until Ctrl-C
    Connect,
}

fn main() {
    // Initialize logging
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(2);
    }

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { username, force } => cli::setup::run_init(&username, force),
        Commands::SetToken => cli::setup::run_set_token(),
        Commands::Candidates { json } => cli::candidates::run_candidates(json),
        Commands::Connect => cli::connect::run_connect(),
    };

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            let exit_code = match e {
                // Configuration errors (exit code 2)
                NotifierError::Config(_) | NotifierError::Toml(_) | NotifierError::TomlSerialize(_) => 2,
                // Keyring errors (exit code 2 for configuration/setup issues)
                NotifierError::Keyring(_) => 2,
                // Login and IO errors (exit code 1 - runtime)
                NotifierError::Login(_) | NotifierError::Io(_) => 1,
            };

            eprintln!("{}", e);
            std::process::exit(exit_code);
        }
    }
}
