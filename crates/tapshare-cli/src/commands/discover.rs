//! Discover command implementation.

use anyhow::{bail, Result};

use tapshare_core::discovery::DiscoveryClient;

use super::DiscoverArgs;

/// Run the discover command.
pub async fn run(args: DiscoverArgs) -> Result<()> {
    let config = super::load_config();
    let client = DiscoveryClient::from_config(&config);

    tracing::debug!("Querying {} for {}", client.target(), args.session);

    let cancel = super::cancel_on_ctrl_c();
    match client.find_with_cancel(&args.session, &cancel).await? {
        Some(endpoint) => {
            println!("{endpoint}");
            Ok(())
        }
        None => bail!("Session {} not found", args.session),
    }
}
