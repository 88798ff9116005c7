//! Checksum command implementation.

use anyhow::{bail, Context, Result};

use tapshare_core::checksum::{file_checksum_with, verify_checksum, ChecksumAlgorithm};

use super::ChecksumArgs;

/// Run the checksum command.
pub async fn run(args: ChecksumArgs) -> Result<()> {
    let algorithm = algorithm_for(&args);

    if let Some(expected) = args.expect.as_deref() {
        let matches = verify_checksum(&args.file, Some(expected), algorithm)
            .await
            .with_context(|| format!("Failed to read {}", args.file.display()))?;
        if !matches {
            bail!("{} checksum mismatch for {}", algorithm, args.file.display());
        }
        println!("OK  {}", args.file.display());
        return Ok(());
    }

    let digest = file_checksum_with(&args.file, algorithm)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    println!("{}  {}", digest, args.file.display());
    Ok(())
}

const fn algorithm_for(args: &ChecksumArgs) -> ChecksumAlgorithm {
    if args.sha256 {
        ChecksumAlgorithm::Sha256
    } else {
        ChecksumAlgorithm::Md5
    }
}
