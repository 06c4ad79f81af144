//! Per-connection driver.
//!
//! Exactly one driver task owns each client connection, its shared region
//! and its backing file; the at-most-one-drain guarantee falls out of
//! this ownership, with the ring's `read_lock` left as a defensive second
//! line. The driver reads one request frame at a time, dispatches it, and
//! on any exit path (explicit `CLOSE`, peer hangup, read error, server
//! shutdown) runs the same teardown: final drain, flush, close the file,
//! unmap and unlink the region.

use crate::REGION_NAME_PREFIX;
use logc_proto::{InitResponse, ProtoError, Request, REQ_SIZE};
use logc_ring::{RingBuf, RingConfig, RingError, ShmRegion};
use std::io;
use std::ops::ControlFlow;
use std::os::fd::AsRawFd;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Why provisioning a client failed; carries the errno the client gets.
#[derive(Debug, Error)]
pub(crate) enum ProvisionError {
    #[error(transparent)]
    Ring(#[from] RingError),

    #[error("cannot open log file '{path}'")]
    OpenLogFile {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl ProvisionError {
    fn errno(&self) -> i32 {
        match self {
            Self::Ring(err) => err.raw_os_error(),
            Self::OpenLogFile { source, .. } => source.raw_os_error(),
        }
        .unwrap_or(libc::EIO)
    }
}

/// State owned by one connection driver.
pub(crate) struct ClientConn {
    socket: UnixStream,
    ring_config: RingConfig,
    /// Region, ring view and backing file exist only between a successful
    /// `INIT` and teardown. `ring` must be released before `region`.
    ring: Option<RingBuf>,
    region: Option<ShmRegion>,
    file: Option<File>,
    log_file_path: Option<String>,
    drain_buf: Vec<u8>,
}

impl ClientConn {
    pub(crate) fn new(socket: UnixStream, ring_config: RingConfig) -> Self {
        Self {
            socket,
            ring_config,
            ring: None,
            region: None,
            file: None,
            log_file_path: None,
            drain_buf: vec![0u8; ring_config.capacity() as usize],
        }
    }

    /// Runs the connection to completion, then tears it down.
    pub(crate) async fn drive(mut self, mut shutdown: watch::Receiver<bool>) {
        let fd = self.socket.as_raw_fd();
        let mut frame = [0u8; REQ_SIZE];

        loop {
            tokio::select! {
                read = self.socket.read(&mut frame) => match read {
                    Ok(0) => {
                        // Implicit CLOSE: the final drain below keeps every
                        // notified byte.
                        debug!(fd, "client disconnected");
                        break;
                    }
                    Ok(n) => {
                        if self.dispatch(&frame[..n]).await.is_break() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(fd, %err, "cannot read request");
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    debug!(fd, "server shutdown; draining and closing");
                    break;
                }
            }
        }

        self.teardown().await;
    }

    /// Parses and handles the first frame in `bytes`.
    async fn dispatch(&mut self, bytes: &[u8]) -> ControlFlow<()> {
        let fd = self.socket.as_raw_fd();
        let request = match Request::parse(bytes) {
            Ok(request) => request,
            Err(err @ ProtoError::UnknownOpcode { .. }) => {
                // The peer may speak a newer revision; stay connected.
                warn!(fd, %err, "ignoring request");
                return ControlFlow::Continue(());
            }
            Err(err) => {
                warn!(fd, %err, "malformed request");
                return ControlFlow::Continue(());
            }
        };

        match request {
            Request::Init { append, path } => self.handle_init(append, path).await,
            Request::Write => {
                trace!(fd, "write notification");
                self.drain_to_file().await;
                ControlFlow::Continue(())
            }
            Request::Close => {
                debug!(fd, "close requested");
                ControlFlow::Break(())
            }
        }
    }

    /// Provisions the shared region and backing file, then answers the
    /// client. Any failure is reported with its errno and drops the
    /// connection, retaining nothing.
    async fn handle_init(&mut self, append: bool, path: String) -> ControlFlow<()> {
        let fd = self.socket.as_raw_fd();
        let region_name = format!("{REGION_NAME_PREFIX}{fd}");

        let response = match self.provision(append, &path, &region_name).await {
            Ok(()) => {
                info!(fd, log_file = %path, region = %region_name, "client initialized");
                InitResponse::Ok {
                    region_name: region_name.clone(),
                }
            }
            Err(err) => {
                warn!(fd, log_file = %path, %err, "init failed");
                InitResponse::Err { errno: err.errno() }
            }
        };

        let Ok(frame) = response.encode() else {
            // Region names are short by construction; unreachable in
            // practice, but the client must not be left hanging.
            warn!(fd, "cannot encode init response");
            return ControlFlow::Break(());
        };
        if let Err(err) = self.socket.write_all(&frame).await {
            warn!(fd, %err, "cannot send init response");
            return ControlFlow::Break(());
        }

        match response {
            InitResponse::Ok { .. } => ControlFlow::Continue(()),
            InitResponse::Err { .. } => ControlFlow::Break(()),
        }
    }

    async fn provision(
        &mut self,
        append: bool,
        path: &str,
        region_name: &str,
    ) -> Result<(), ProvisionError> {
        let region = ShmRegion::create(region_name, self.ring_config.region_bytes)?;
        // SAFETY: the mapping is stored beside the view and outlives it;
        // teardown releases the view first.
        let ring = unsafe { RingBuf::from_raw(region.as_ptr(), region.len()) }?;
        ring.init(self.ring_config.threshold());

        let mut options = OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        let file = match options.open(path).await {
            Ok(file) => file,
            Err(source) => {
                // Do not leak the name we just created.
                let _ = region.unlink();
                return Err(ProvisionError::OpenLogFile {
                    path: path.into(),
                    source,
                });
            }
        };

        self.ring = Some(ring);
        self.region = Some(region);
        self.file = Some(file);
        self.log_file_path = Some(path.into());
        Ok(())
    }

    /// One drain pass: copy whatever is readable and write it through.
    ///
    /// A zero-byte drain is normal (empty ring, a lost race with an earlier
    /// notification, or a producer mid-wrap) and not an error.
    async fn drain_to_file(&mut self) {
        let fd = self.socket.as_raw_fd();
        let (Some(ring), Some(file)) = (self.ring.as_ref(), self.file.as_mut()) else {
            warn!(fd, "drain requested before init; ignoring");
            return;
        };

        let overruns_before = ring.metrics().overruns;
        let n = ring.drain(&mut self.drain_buf);
        if ring.metrics().overruns > overruns_before {
            warn!(fd, "producers lapped the reader; drained bytes may be damaged");
        }
        if n == 0 {
            trace!(fd, "nothing to drain");
            return;
        }

        if let Err(err) = file.write_all(&self.drain_buf[..n]).await {
            // The drained bytes are gone; the client keeps logging.
            warn!(fd, bytes = n, %err, "cannot write to log file");
            return;
        }
        if let Err(err) = file.flush().await {
            warn!(fd, %err, "cannot flush log file");
            return;
        }
        debug!(fd, bytes = n, "drained to log file");
    }

    /// Final drain, flush, close, unmap, unlink. Safe to call twice: every
    /// resource is taken out of its slot exactly once.
    pub(crate) async fn teardown(&mut self) {
        if self.ring.is_some() {
            self.drain_to_file().await;
        }

        if let Some(mut file) = self.file.take() {
            let _ = file.flush().await;
        }

        // The view goes before the mapping backing it.
        self.ring = None;
        if let Some(region) = self.region.take() {
            if let Err(err) = region.unlink() {
                warn!(%err, "cannot unlink shared region");
            }
        }

        if let Some(path) = self.log_file_path.take() {
            debug!(log_file = %path, "client torn down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn teardown_twice_is_a_noop() {
        let (server_end, _client_end) = UnixStream::pair().unwrap();
        let mut conn = ClientConn::new(server_end, RingConfig::default());

        conn.teardown().await;
        conn.teardown().await;

        assert!(conn.ring.is_none());
        assert!(conn.region.is_none());
        assert!(conn.file.is_none());
    }

    #[tokio::test]
    async fn write_before_init_is_ignored() {
        let (server_end, _client_end) = UnixStream::pair().unwrap();
        let mut conn = ClientConn::new(server_end, RingConfig::default());

        assert!(conn.dispatch(&[2]).await.is_continue());
    }

    #[tokio::test]
    async fn unknown_opcode_keeps_the_connection() {
        let (server_end, _client_end) = UnixStream::pair().unwrap();
        let mut conn = ClientConn::new(server_end, RingConfig::default());

        assert!(conn.dispatch(&[9]).await.is_continue());
        assert!(conn.dispatch(&[0]).await.is_continue());
    }

    #[tokio::test]
    async fn close_breaks_the_loop() {
        let (server_end, _client_end) = UnixStream::pair().unwrap();
        let mut conn = ClientConn::new(server_end, RingConfig::default());

        assert!(conn.dispatch(&[3]).await.is_break());
    }
}
