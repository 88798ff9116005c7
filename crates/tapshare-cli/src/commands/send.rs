//! Send command implementation.

use std::sync::Mutex;

use anyhow::{bail, Context, Result};

use tapshare_core::file::format_size;
use tapshare_core::session::{generate_session_id, is_valid_session_id};
use tapshare_core::transfer::{format_eta, format_speed, TransferProgress};
use tapshare_core::{PeerManager, VERSION};

use super::SendArgs;

/// Run the send command.
pub async fn run(args: SendArgs, quiet: bool) -> Result<()> {
    let config = super::load_config();

    let session_id = args.session.unwrap_or_else(generate_session_id);
    if !is_valid_session_id(&session_id) {
        tracing::warn!("Session id {} is not in the generated format", session_id);
    }

    let manager = PeerManager::start(config)
        .await
        .context("Failed to start peer manager")?;

    let session = manager
        .try_create_session(&session_id, &args.paths)
        .await
        .context("Failed to create session")?;

    for skipped in session.skipped_files() {
        eprintln!("  Skipping {}: {}", skipped.path.display(), skipped.reason);
    }
    if session.manifest().is_empty() {
        manager.cleanup_session(&session_id).await;
        manager.stop().await;
        bail!("None of the given files can be shared");
    }

    if !quiet {
        println!();
        println!("TapShare v{}", VERSION);
        println!("{}", "-".repeat(37));
        println!();
        println!("  Session:  {}", session_id);
        println!("  Endpoint: {}", manager.advertised_endpoint());
        println!();
        for (_, info) in session.manifest().iter() {
            println!("    {} ({})", info.name, format_size(info.size));
        }
        println!();
        println!(
            "  {} files, {}. Waiting for receiver...",
            session.manifest().len(),
            format_size(session.total_size())
        );
        println!();
    }

    let tracker = Mutex::new(TransferProgress::new(
        session.manifest().len(),
        session.total_size(),
    ));
    let on_progress = |_: f64, message: &str| {
        if quiet {
            return;
        }
        let Ok(mut tracker) = tracker.lock() else {
            return;
        };

        let delta = session
            .transferred_size()
            .saturating_sub(tracker.total_bytes_transferred);
        tracker.record(delta);
        if let Some(name) = message.strip_prefix("Sending ") {
            if tracker.current_file_name != name {
                let next = tracker.current_file + 1;
                tracker.start_file(next, name);
            }
        }

        super::print_progress_line(&format!(
            "[{}/{}] {:5.1}%  {}  {}  ETA {}",
            tracker.current_file,
            tracker.total_files,
            tracker.percentage(),
            tracker.current_file_name,
            format_speed(tracker.speed_bps()),
            format_eta(tracker.eta()),
        ));
    };

    let cancel = super::cancel_on_ctrl_c();
    let result = manager
        .try_send_files(&session_id, Some(&on_progress), &cancel)
        .await;

    manager.cleanup_session(&session_id).await;
    manager.stop().await;

    if !quiet {
        println!();
        println!();
    }
    result.context("Transfer failed")?;

    if !quiet {
        println!("  Sent {} to the receiver.", format_size(session.total_size()));
        println!();
    }

    Ok(())
}
