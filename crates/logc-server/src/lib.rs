//! logc-server: the process that owns the log files.
//!
//! The server listens on a well-known Unix stream socket. Each accepted
//! client gets its own driver task: on `INIT` the server provisions a
//! shared-memory ring region and opens the client's backing log file; on
//! every `WRITE` notification it drains the ring once and writes the bytes
//! through; on `CLOSE` or disconnect it runs a final drain before
//! releasing everything. Clean disconnects therefore never lose a byte
//! that was appended before the last notification.
//!
//! The accept loop is single-threaded; connection drivers are independent
//! tasks, which preserves the one-driver-per-client invariant the drain
//! path relies on.

mod config;
mod conn;

pub use config::{ConfigError, ServerConfig};

use conn::ClientConn;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Per-client shared regions are named `<prefix><connection fd>`.
pub const REGION_NAME_PREFIX: &str = "/logc_shm_client_";

/// Fatal initialization failures. Everything after a successful
/// [`Server::bind`] is handled in place and logged.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The socket path does not fit a `sockaddr_un`.
    #[error("socket path '{path}' is too long")]
    SocketPathTooLong {
        /// Rejected path.
        path: String,
    },

    /// The configured ring geometry is unusable.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What was wrong.
        reason: String,
    },

    /// Creating, binding or listening on the socket failed.
    #[error("cannot bind log server socket at '{path}'")]
    Bind {
        /// Socket path.
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Handle for stopping a running server from outside (tests, embedders).
/// The server binary itself stops on the interrupt signal.
#[derive(Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// Requests shutdown. Idempotent.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// The accept loop and everything it owns.
pub struct Server {
    listener: UnixListener,
    config: ServerConfig,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

/// Binds a Unix stream listener with an explicit backlog.
///
/// `tokio`'s own bind hardwires the backlog, so the socket is assembled
/// through libc and only then handed over.
fn bind_with_backlog(path: &str, backlog: u32) -> Result<UnixListener, ServerError> {
    let bind_err = |source| ServerError::Bind {
        path: path.into(),
        source,
    };

    let fd = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_STREAM, 0) };
    if fd < 0 {
        return Err(bind_err(io::Error::last_os_error()));
    }
    // SAFETY: fresh descriptor, ownership transferred here; closed on any
    // early return below.
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };

    let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    let bytes = path.as_bytes();
    if bytes.len() >= addr.sun_path.len() {
        return Err(ServerError::SocketPathTooLong { path: path.into() });
    }
    for (dst, src) in addr.sun_path.iter_mut().zip(bytes) {
        *dst = *src as libc::c_char;
    }

    let addr_len = std::mem::size_of::<libc::sockaddr_un>() as libc::socklen_t;
    // SAFETY: addr is a fully initialized sockaddr_un of the stated length.
    let rc = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            std::ptr::addr_of!(addr).cast::<libc::sockaddr>(),
            addr_len,
        )
    };
    if rc != 0 {
        return Err(bind_err(io::Error::last_os_error()));
    }

    let rc = unsafe { libc::listen(fd.as_raw_fd(), backlog as libc::c_int) };
    if rc != 0 {
        return Err(bind_err(io::Error::last_os_error()));
    }

    let listener = std::os::unix::net::UnixListener::from(fd);
    listener.set_nonblocking(true).map_err(bind_err)?;
    UnixListener::from_std(listener).map_err(bind_err)
}

impl Server {
    /// Binds the listening socket, unlinking any stale entry first.
    ///
    /// Must run inside a tokio runtime (the listener registers with the
    /// reactor).
    pub fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        // Validate the ring geometry up front; a bad config is an init
        // failure, not a per-client one.
        if config.region_bytes <= logc_ring::HEADER_BYTES {
            return Err(ServerError::InvalidConfig {
                reason: format!(
                    "region_bytes {} cannot hold the ring header",
                    config.region_bytes
                ),
            });
        }
        if config.region_bytes > u32::MAX as usize {
            return Err(ServerError::InvalidConfig {
                reason: format!("region_bytes {} exceeds 32-bit offsets", config.region_bytes),
            });
        }
        if config.threshold_fraction <= 0.0 {
            return Err(ServerError::InvalidConfig {
                reason: format!(
                    "threshold_fraction {} must be positive",
                    config.threshold_fraction
                ),
            });
        }

        match std::fs::remove_file(&config.socket_path) {
            Ok(()) => debug!(path = %config.socket_path, "removed stale socket"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ServerError::Bind {
                    path: config.socket_path.clone(),
                    source,
                })
            }
        }

        let listener = bind_with_backlog(&config.socket_path, config.backlog)?;
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            listener,
            config,
            shutdown_tx: Arc::new(shutdown_tx),
        })
    }

    /// A handle that stops [`Server::run`] from outside.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// The bound socket path.
    pub fn socket_path(&self) -> &str {
        &self.config.socket_path
    }

    /// Runs the accept loop until interrupted, then broadcasts shutdown to
    /// the connection drivers and waits for them to finish their final
    /// drains.
    pub async fn run(self) {
        let ring_config = self.config.ring_config();
        let mut tick = tokio::time::interval(Duration::from_millis(self.config.liveness_tick_ms));
        let mut drivers = JoinSet::new();
        let mut external = self.shutdown_tx.subscribe();

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        info!(
            path = %self.config.socket_path,
            region_bytes = self.config.region_bytes,
            "log server listening"
        );

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, _)) => {
                        debug!(fd = socket.as_raw_fd(), "accepted client");
                        let conn = ClientConn::new(socket, ring_config);
                        drivers.spawn(conn.drive(self.shutdown_tx.subscribe()));
                    }
                    Err(err) => warn!(%err, "cannot accept connection"),
                },
                _ = &mut ctrl_c => {
                    info!("interrupt received");
                    break;
                }
                _ = external.changed() => {
                    info!("shutdown requested");
                    break;
                }
                _ = tick.tick() => {
                    // Liveness tick only.
                }
            }
        }

        // Drivers run their final drain and teardown before we return.
        let _ = self.shutdown_tx.send(true);
        while drivers.join_next().await.is_some() {}

        let _ = std::fs::remove_file(&self.config.socket_path);
        info!("log server stopped");
    }
}
