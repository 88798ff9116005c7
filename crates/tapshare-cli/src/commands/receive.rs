//! Receive command implementation.

use anyhow::{Context, Result};

use tapshare_core::file::format_size;
use tapshare_core::transfer::format_speed;
use tapshare_core::{PeerManager, VERSION};

use super::ReceiveArgs;

/// Run the receive command.
pub async fn run(args: ReceiveArgs, quiet: bool) -> Result<()> {
    let mut config = super::load_config();
    // a receiver never serves sessions
    config.network.answer_discovery = false;
    if args.verify {
        config.transfer.verify_checksums = true;
    }

    let output_dir = args
        .output
        .unwrap_or_else(|| config.storage.resolve_download_dir());

    if !quiet {
        println!();
        println!("TapShare v{}", VERSION);
        println!("{}", "-".repeat(37));
        println!();
        println!("  Searching for session {}...", args.session);
        println!();
    }

    let manager = PeerManager::start(config)
        .await
        .context("Failed to start peer manager")?;

    let on_progress = |pct: f64, message: &str| {
        if !quiet {
            super::print_progress_line(&format!("{pct:5.1}%  {message}"));
        }
    };

    let cancel = super::cancel_on_ctrl_c();
    let result = manager
        .try_receive_files(&args.session, &output_dir, Some(&on_progress), &cancel)
        .await;
    manager.stop().await;

    if !quiet {
        println!();
        println!();
    }
    let report = result.with_context(|| format!("Failed to receive session {}", args.session))?;

    if !quiet {
        for file in &report.files {
            println!("    {} ({})", file.path.display(), format_size(file.size));
        }
        println!();
        println!(
            "  Received {} files ({}) in {:.1}s at {}",
            report.files.len(),
            format_size(report.total_size),
            report.elapsed.as_secs_f64(),
            format_speed(report.bytes_per_second())
        );
        println!("  Saved to {}", output_dir.display());
        println!();
    }

    Ok(())
}
