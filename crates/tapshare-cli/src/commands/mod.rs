//! CLI command definitions and handlers.

use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

pub mod checksum;
pub mod config;
pub mod discover;
pub mod receive;
pub mod send;

/// Load configuration with graceful fallback to defaults.
///
/// A missing or unparsable config file yields the defaults.
pub fn load_config() -> tapshare_core::config::Config {
    tapshare_core::config::Config::load().unwrap_or_default()
}

/// Token cancelled on the first Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    token
}

/// Redraw the single progress line on stdout.
pub fn print_progress_line(line: &str) {
    print!("\r  {line:<72}");
    let _ = io::stdout().flush();
}

/// TapShare - Tap-to-share file transfer over the local network
#[derive(Parser)]
#[command(name = "tapshare")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Detailed logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Share files under a session id and wait for a receiver
    Send(SendArgs),

    /// Receive the files of a session
    Receive(ReceiveArgs),

    /// Look up which endpoint serves a session
    Discover(DiscoverArgs),

    /// Print the digest of a file
    Checksum(ChecksumArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for the send command
#[derive(Parser)]
pub struct SendArgs {
    /// Files to share
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Session id to register (generated when omitted)
    #[arg(short, long)]
    pub session: Option<String>,
}

/// Arguments for the receive command
#[derive(Parser)]
pub struct ReceiveArgs {
    /// Session id announced by the sender
    pub session: String,

    /// Output directory for received files
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Verify MD5 checksums after the transfer
    #[arg(long)]
    pub verify: bool,
}

/// Arguments for the discover command
#[derive(Parser)]
pub struct DiscoverArgs {
    /// Session id to look up
    pub session: String,
}

/// Arguments for the checksum command
#[derive(Parser)]
pub struct ChecksumArgs {
    /// File to hash
    pub file: PathBuf,

    /// Use SHA-256 instead of MD5
    #[arg(long)]
    pub sha256: bool,

    /// Compare against an expected hex digest
    #[arg(long)]
    pub expect: Option<String>,
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show all configuration
    Show,

    /// Show the configuration file path
    Path,

    /// Reset to defaults
    Reset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send() {
        let cli = Cli::try_parse_from(["tapshare", "send", "a.txt", "b.txt", "-s", "jt-custom"])
            .expect("parse");
        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.paths.len(), 2);
        assert_eq!(args.session.as_deref(), Some("jt-custom"));
    }

    #[test]
    fn test_send_requires_files() {
        assert!(Cli::try_parse_from(["tapshare", "send"]).is_err());
    }

    #[test]
    fn test_parse_receive_with_global_flags() {
        let cli = Cli::try_parse_from([
            "tapshare",
            "receive",
            "jt0000000000000000",
            "-o",
            "/tmp/in",
            "--verify",
            "-q",
        ])
        .expect("parse");
        assert!(cli.quiet);
        let Command::Receive(args) = cli.command else {
            panic!("expected receive");
        };
        assert_eq!(args.session, "jt0000000000000000");
        assert_eq!(args.output, Some(PathBuf::from("/tmp/in")));
        assert!(args.verify);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["tapshare", "-q", "-v", "config"]).is_err());
    }

    #[test]
    fn test_config_action_optional() {
        let cli = Cli::try_parse_from(["tapshare", "config"]).expect("parse");
        let Command::Config(args) = cli.command else {
            panic!("expected config");
        };
        assert!(args.action.is_none());
    }
}
