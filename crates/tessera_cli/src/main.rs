//! Tessera CLI
//!
//! Command-line tools for Tessera sync.
//!
//! # Commands
//!
//! - `token` - Mint an HMAC-signed user token
//! - `verify-token` - Check a token and print the user it belongs to
//! - `replay` - Run a JSON script of push/pull messages against an in-memory server

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Tessera sync tools.
#[derive(Parser)]
#[command(name = "tessera")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mint a user token (printed as hex)
    Token {
        /// User the token is issued to
        user: String,

        /// Shared server secret
        #[arg(short, long)]
        secret: String,
    },

    /// Validate a hex token and print its user
    VerifyToken {
        /// Token in hex
        token: String,

        /// Shared server secret
        #[arg(short, long)]
        secret: String,

        /// Token lifetime in seconds
        #[arg(short, long, default_value = "86400")]
        expiry: u64,
    },

    /// Replay a script of sync messages against an in-memory server
    Replay {
        /// Path to the JSON script
        script: PathBuf,

        /// Pretty-print the JSON output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Token { user, secret } => {
            println!("{}", commands::token::mint(&user, secret.as_bytes())?);
        }
        Commands::VerifyToken {
            token,
            secret,
            expiry,
        } => {
            println!("{}", commands::token::verify(&token, secret.as_bytes(), expiry)?);
        }
        Commands::Replay { script, pretty } => {
            commands::replay::run(&script, pretty)?;
        }
        Commands::Version => {
            println!("Tessera CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
