//! Direct TCP transport.
//!
//! The sender binds the transfer port, accepts exactly one connection,
//! writes the metadata frame and then streams each file in [`CHUNK_SIZE`]
//! pieces. The receiver connects, validates the frame and writes each file
//! to the destination directory, reading no more than the declared size.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use super::{guarded, report, ProgressFn, ReceiveReport, ReceivedFile, Transport, TransportKind};
use super::progress::{format_speed, TransferProgress};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::file::{format_size, safe_destination};
use crate::protocol::{read_message, write_message, MetadataFrame};
use crate::session::{OperationGuard, TransferSession};
use crate::CHUNK_SIZE;

/// Socket and timeout settings for the direct transport.
#[derive(Debug, Clone)]
pub struct DirectSettings {
    /// Address the sender listens on
    pub bind_addr: SocketAddr,
    /// How long the sender waits for the receiver
    pub accept_timeout: Duration,
    /// How long the receiver waits for the connection
    pub connect_timeout: Duration,
    /// Limit on each read or write once connected
    pub io_timeout: Duration,
}

impl DirectSettings {
    /// Build settings from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            bind_addr: config.network.transfer_bind_addr(),
            accept_timeout: config.transfer.accept_timeout,
            connect_timeout: config.transfer.connect_timeout,
            io_timeout: config.transfer.io_timeout,
        }
    }
}

impl Default for DirectSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Single-connection TCP transport.
#[derive(Debug, Clone, Default)]
pub struct DirectTransport {
    settings: DirectSettings,
}

impl DirectTransport {
    /// Create a transport with the given settings.
    #[must_use]
    pub const fn new(settings: DirectSettings) -> Self {
        Self { settings }
    }

    /// Current settings.
    #[must_use]
    pub const fn settings(&self) -> &DirectSettings {
        &self.settings
    }

    /// Bind the transfer listener.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the address is unavailable.
    pub async fn listen(&self) -> Result<TcpListener> {
        let addr = self.settings.bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;

        tracing::info!("Transfer listener bound on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Accept one receiver on `listener` and stream the session to it.
    ///
    /// The listener is closed as soon as a connection is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if nobody connects in time, or any I/O,
    /// cancellation or protocol error raised while streaming.
    pub async fn serve(
        &self,
        listener: TcpListener,
        operation: &OperationGuard<'_>,
        progress: Option<&ProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let session = operation.session();

        let (mut stream, peer) =
            guarded(cancel, self.settings.accept_timeout, listener.accept()).await?;
        drop(listener);

        tracing::info!(session_id = %session.session_id(), "Receiver connected from {}", peer);
        stream.set_nodelay(true)?;

        let frame = MetadataFrame::for_session(session);
        guarded(cancel, self.settings.io_timeout, write_message(&mut stream, &frame)).await?;

        let mut stats = TransferProgress::new(frame.files.len(), frame.total_size);
        let mut buffer = vec![0u8; CHUNK_SIZE];

        for (index, (_, info)) in frame.files.iter().enumerate() {
            let message = format!("Sending {}", info.name);
            stats.start_file(index, &info.name);
            report(progress, stats.percentage(), &message);

            let mut file = tokio::fs::File::open(&info.path).await?;
            let mut remaining = info.size;

            while remaining > 0 {
                let want = chunk_len(remaining);
                let n = guarded(cancel, self.settings.io_timeout, file.read(&mut buffer[..want]))
                    .await?;
                if n == 0 {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("{} shrank during transfer", info.path),
                    )));
                }

                guarded(
                    cancel,
                    self.settings.io_timeout,
                    stream.write_all(&buffer[..n]),
                )
                .await?;

                remaining -= n as u64;
                stats.record(n as u64);
                operation.record(n as u64);
                report(progress, stats.percentage(), &message);
            }

            tracing::debug!("Sent {} ({})", info.name, format_size(info.size));
        }

        guarded(cancel, self.settings.io_timeout, stream.shutdown()).await?;

        tracing::info!(
            session_id = %session.session_id(),
            "Sent {} files ({}) at {}",
            frame.files.len(),
            format_size(frame.total_size),
            format_speed(stats.speed_bps())
        );
        Ok(())
    }

    /// Connect to `endpoint` and write the session's files into `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionMismatch`] if the sender announces another
    /// session (no file bytes are read), [`Error::ConnectionClosed`] if the
    /// stream ends early, or any I/O, timeout or cancellation error.
    pub async fn receive(
        &self,
        session_id: &str,
        endpoint: SocketAddr,
        dest: &Path,
        progress: Option<&ProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> Result<ReceiveReport> {
        let started = Instant::now();

        let mut stream = guarded(
            cancel,
            self.settings.connect_timeout,
            TcpStream::connect(endpoint),
        )
        .await?;
        stream.set_nodelay(true)?;
        tracing::info!(session_id = %session_id, "Connected to sender at {}", endpoint);

        let frame: MetadataFrame =
            guarded(cancel, self.settings.io_timeout, read_message(&mut stream)).await?;
        frame.validate(session_id)?;

        tracing::info!(
            session_id = %session_id,
            "Receiving {} files ({})",
            frame.files.len(),
            format_size(frame.total_size)
        );

        tokio::fs::create_dir_all(dest).await?;
        let destinations = plan_destinations(dest, frame.files.iter().map(|(_, i)| i.name.as_str()))?;

        let mut stats = TransferProgress::new(frame.files.len(), frame.total_size);
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut files = Vec::with_capacity(frame.files.len());

        for (index, ((file_id, info), path)) in frame.files.iter().zip(destinations).enumerate() {
            let message = format!("Receiving {}", info.name);
            stats.start_file(index, &info.name);
            report(progress, stats.percentage(), &message);

            let mut out = tokio::fs::File::create(&path).await?;
            let mut remaining = info.size;

            while remaining > 0 {
                let want = chunk_len(remaining);
                let n = guarded(cancel, self.settings.io_timeout, stream.read(&mut buffer[..want]))
                    .await?;
                if n == 0 {
                    return Err(Error::ConnectionClosed(format!(
                        "{} ended after {} of {} bytes",
                        info.name,
                        info.size - remaining,
                        info.size
                    )));
                }

                out.write_all(&buffer[..n]).await?;
                remaining -= n as u64;
                stats.record(n as u64);
                report(progress, stats.percentage(), &message);
            }

            out.flush().await?;
            tracing::debug!("Received {} -> {}", info.name, path.display());

            files.push(ReceivedFile {
                file_id: file_id.to_string(),
                name: info.name.clone(),
                path,
                size: info.size,
                expected_checksum: info.expected_checksum().map(str::to_string),
            });
        }

        let report = ReceiveReport {
            session_id: session_id.to_string(),
            files,
            total_size: frame.total_size,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            session_id = %session_id,
            "Received {} files ({}) at {}",
            report.files.len(),
            format_size(report.total_size),
            format_speed(report.bytes_per_second())
        );
        Ok(report)
    }
}

impl Transport for DirectTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Direct
    }

    async fn send_files(
        &self,
        session: &TransferSession,
        progress: Option<&ProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let operation = session.begin_operation()?;
        let listener = self.listen().await?;
        self.serve(listener, &operation, progress, cancel).await
    }

    async fn receive_files(
        &self,
        session_id: &str,
        endpoint: SocketAddr,
        dest: &Path,
        progress: Option<&ProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> Result<ReceiveReport> {
        self.receive(session_id, endpoint, dest, progress, cancel)
            .await
    }
}

#[allow(clippy::cast_possible_truncation)]
fn chunk_len(remaining: u64) -> usize {
    remaining.min(CHUNK_SIZE as u64) as usize
}

/// Resolve every announced name to a distinct path inside `dest`.
///
/// Names that collide after sanitization get a ` (n)` suffix.
fn plan_destinations<'a>(
    dest: &Path,
    names: impl Iterator<Item = &'a str>,
) -> Result<Vec<PathBuf>> {
    let mut taken = HashSet::new();
    let mut next_suffix: HashMap<PathBuf, usize> = HashMap::new();
    let mut planned = Vec::new();

    for name in names {
        let base = safe_destination(dest, name)?;
        let mut path = base.clone();
        if !taken.insert(path.clone()) {
            let n = next_suffix.entry(base.clone()).or_insert(1);
            loop {
                path = with_suffix(&base, *n);
                *n += 1;
                if taken.insert(path.clone()) {
                    break;
                }
            }
        }
        planned.push(path);
    }

    Ok(planned)
}

fn with_suffix(path: &Path, n: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem} ({n}).{}", ext.to_string_lossy()),
        None => format!("{stem} ({n})"),
    };
    path.with_file_name(name)
}
