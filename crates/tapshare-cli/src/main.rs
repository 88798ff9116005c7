//! TapShare CLI - Tap-to-share file transfer over the local network
//!
//! A sender registers files under a session id and waits for one receiver.
//! The receiver finds the sender by broadcasting the id and pulls the files
//! over a direct TCP connection.
//!
//! ## Quick Start
//!
//! ```bash
//! # Share files
//! tapshare send ./document.pdf ./photo.jpg
//!
//! # Receive them on another device
//! tapshare receive jt4f0c2a9b17d3e855
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::Parser;

mod commands;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Send(args) => commands::send::run(args, cli.quiet).await,
        Command::Receive(args) => commands::receive::run(args, cli.quiet).await,
        Command::Discover(args) => commands::discover::run(args).await,
        Command::Checksum(args) => commands::checksum::run(args).await,
        Command::Config(args) => commands::config::run(args),
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default_filter = if verbose {
        "info,tapshare=debug,tapshare_core=debug"
    } else if quiet {
        "error"
    } else {
        "warn,tapshare=info,tapshare_core=info"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
