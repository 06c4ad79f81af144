use crate::format::format_record;
use crate::Level;
use logc_proto::{InitResponse, ProtoError, Request, REQ_SIZE, RESP_SIZE, SOCKET_PATH};
use logc_ring::{RingBuf, RingError, ShmRegion};
use std::fmt;
use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use thiserror::Error;

/// Errors surfaced by [`LogHandle::connect`].
///
/// After a successful connect the handle never errors: appends are
/// wait-free and a failed notification send is deliberately dropped (the
/// next threshold crossing retries).
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connecting to the server socket failed.
    #[error("cannot reach log server at '{socket_path}'")]
    Connect {
        /// Socket path that was dialed.
        socket_path: String,
        #[source]
        source: io::Error,
    },

    /// Sending the `INIT` request failed.
    #[error("cannot send INIT request")]
    SendInit(#[source] io::Error),

    /// Reading the `INIT` response failed or the server hung up early.
    #[error("cannot read INIT response")]
    ReadInit(#[source] io::Error),

    /// The server replied with an errno instead of a region name.
    #[error("server rejected INIT (errno {errno})")]
    Refused {
        /// The server-side errno.
        errno: i32,
    },

    /// A frame could not be encoded or parsed.
    #[error(transparent)]
    Proto(#[from] ProtoError),

    /// Opening or mapping the provisioned shared region failed.
    #[error(transparent)]
    Ring(#[from] RingError),
}

/// Everything a connected handle owns.
///
/// Field order matters: the ring view is dropped before the mapping that
/// backs it.
struct Connection {
    ring: RingBuf,
    _region: ShmRegion,
    socket: UnixStream,
}

/// A logging client handle.
///
/// Construction does no I/O; [`LogHandle::connect`] dials the server,
/// performs the `INIT` handshake and maps the shared region the server
/// provisioned. After that any number of threads may share the handle by
/// reference: [`LogHandle::append_record`] and the level macros are
/// `&self` and wait-free.
pub struct LogHandle {
    log_file_path: String,
    level: Level,
    append: bool,
    socket_path: String,
    conn: Option<Connection>,
}

impl LogHandle {
    /// Creates an unconnected handle. No I/O happens here.
    ///
    /// `append` selects append (true) or truncate (false) mode for the
    /// backing file the server will open.
    pub fn new(log_file_path: impl Into<String>, level: Level, append: bool) -> Self {
        Self {
            log_file_path: log_file_path.into(),
            level,
            append,
            socket_path: SOCKET_PATH.to_owned(),
            conn: None,
        }
    }

    /// Overrides the server socket path (tests, non-standard deployments).
    pub fn with_socket_path(mut self, socket_path: impl Into<String>) -> Self {
        self.socket_path = socket_path.into();
        self
    }

    /// The handle's level filter.
    pub fn level(&self) -> Level {
        self.level
    }

    /// True once [`LogHandle::connect`] has succeeded.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Dials the server, sends `INIT` and maps the provisioned region.
    ///
    /// Idempotent: reconnecting an already-connected handle is a no-op.
    pub fn connect(&mut self) -> Result<(), ClientError> {
        if self.conn.is_some() {
            return Ok(());
        }

        let mut socket =
            UnixStream::connect(&self.socket_path).map_err(|source| ClientError::Connect {
                socket_path: self.socket_path.clone(),
                source,
            })?;

        let mut frame = [0u8; REQ_SIZE];
        let len = Request::Init {
            append: self.append,
            path: self.log_file_path.clone(),
        }
        .encode(&mut frame)?;
        socket.write_all(&frame[..len]).map_err(ClientError::SendInit)?;

        let mut resp = [0u8; RESP_SIZE];
        let n = socket.read(&mut resp).map_err(ClientError::ReadInit)?;
        if n == 0 {
            return Err(ClientError::ReadInit(io::Error::from(
                io::ErrorKind::UnexpectedEof,
            )));
        }

        let region_name = match InitResponse::parse(&resp[..n])? {
            InitResponse::Err { errno } => return Err(ClientError::Refused { errno }),
            InitResponse::Ok { region_name } => region_name,
        };

        let region = ShmRegion::open(&region_name)?;
        // SAFETY: the mapping stays alive in `Connection` beside the view,
        // and is dropped after it.
        let ring = unsafe { RingBuf::from_raw(region.as_ptr(), region.len()) }?;

        // Notifications must never block a producer; from here on the
        // socket is written fire-and-forget.
        socket
            .set_nonblocking(true)
            .map_err(ClientError::SendInit)?;

        self.conn = Some(Connection {
            ring,
            _region: region,
            socket,
        });
        Ok(())
    }

    /// Appends one pre-formatted record to the ring and notifies the server
    /// when the fill threshold is crossed.
    ///
    /// On an unconnected handle this is a silent no-op, matching the
    /// drop-rather-than-block posture of the whole append path.
    pub fn append_record(&self, record: &[u8]) {
        let Some(conn) = &self.conn else { return };
        if conn.ring.append(record).should_notify() {
            Self::send_notification(conn);
        }
    }

    /// Asks the server to drain now, regardless of the fill level.
    pub fn flush(&self) {
        if let Some(conn) = &self.conn {
            Self::send_notification(conn);
        }
    }

    /// Filters, formats and appends one record. Called by the level macros.
    pub fn log(&self, level: Level, file: &str, module: &str, line: u32, args: fmt::Arguments<'_>) {
        if !self.level.allows(level) {
            return;
        }
        let record = format_record(file, module, line, args);
        self.append_record(record.as_bytes());
    }

    /// Sends `CLOSE` and releases the socket and mapping. Idempotent.
    ///
    /// The server performs the final drain: every record appended before
    /// this call ends up in the backing file.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            let mut frame = [0u8; REQ_SIZE];
            if let Ok(len) = Request::Close.encode(&mut frame) {
                let _ = (&conn.socket).write(&frame[..len]);
            }
        }
    }

    /// One non-blocking write; a full socket buffer drops the notification,
    /// which is safe because a later threshold crossing re-notifies.
    fn send_notification(conn: &Connection) {
        let mut frame = [0u8; REQ_SIZE];
        if let Ok(len) = Request::Write.encode(&mut frame) {
            let _ = (&conn.socket).write(&frame[..len]);
        }
    }

    /// Ring counters for this handle (appends, threshold crossings).
    pub fn metrics(&self) -> Option<logc_ring::MetricsSnapshot> {
        self.conn.as_ref().map(|c| c.ring.metrics())
    }
}

impl Drop for LogHandle {
    fn drop(&mut self) {
        self.close();
    }
}
