//! logc-proto: wire frames for the client/server control protocol.
//!
//! The protocol runs over a local Unix stream socket. Every request is a
//! single frame: one opcode byte followed by an opcode-specific payload with
//! a fixed parse, so no length prefix is needed. The server replies only to
//! `INIT`, with a zero-padded [`RESP_SIZE`]-byte frame.
//!
//! All integers on the wire are native-endian; the transport never leaves
//! the host.

use std::fmt;
use thiserror::Error;

/// Well-known server socket path.
pub const SOCKET_PATH: &str = "/dev/shm/logc.server";

/// Maximum request frame size in bytes.
pub const REQ_SIZE: usize = 128;

/// Fixed response frame size in bytes.
pub const RESP_SIZE: usize = 128;

/// Maximum log-file path length, NUL included.
///
/// One byte below the frame remainder: an `INIT` request spends one byte on
/// the opcode and one on the append mode.
pub const MAX_PATH: usize = REQ_SIZE - 2;

/// Request opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Provision a shared region and open the backing file.
    Init = 1,
    /// The client's ring crossed its threshold; drain it.
    Write = 2,
    /// Final drain, then tear the connection down.
    Close = 3,
}

impl TryFrom<u8> for Opcode {
    type Error = ProtoError;

    fn try_from(value: u8) -> Result<Self, ProtoError> {
        match value {
            1 => Ok(Self::Init),
            2 => Ok(Self::Write),
            3 => Ok(Self::Close),
            other => Err(ProtoError::UnknownOpcode { opcode: other }),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "INIT"),
            Self::Write => write!(f, "WRITE"),
            Self::Close => write!(f, "CLOSE"),
        }
    }
}

/// Protocol parse and encode failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtoError {
    /// The frame is empty.
    #[error("empty frame")]
    Empty,

    /// The opcode byte is not assigned.
    ///
    /// Servers log and ignore this one; the peer may simply be newer.
    #[error("unknown opcode {opcode}")]
    UnknownOpcode {
        /// The unassigned opcode byte.
        opcode: u8,
    },

    /// The frame ends before its fixed payload does.
    #[error("truncated {opcode} frame ({got} bytes)")]
    Truncated {
        /// Opcode of the truncated frame.
        opcode: Opcode,
        /// Bytes actually present.
        got: usize,
    },

    /// A NUL-terminated string field has no NUL.
    #[error("unterminated string in {opcode} frame")]
    MissingNul {
        /// Opcode of the malformed frame.
        opcode: Opcode,
    },

    /// A string field is not valid UTF-8.
    #[error("non-UTF-8 string in {opcode} frame")]
    BadUtf8 {
        /// Opcode of the malformed frame.
        opcode: Opcode,
    },

    /// The log-file path cannot fit an `INIT` frame.
    #[error("log file path of {len} bytes exceeds the {max}-byte limit")]
    PathTooLong {
        /// Path length, NUL excluded.
        len: usize,
        /// Maximum path length, NUL included.
        max: usize,
    },
}

/// A parsed request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `INIT`: append mode plus the NUL-terminated backing-file path.
    Init {
        /// Open the backing file in append (true) or truncate (false) mode.
        append: bool,
        /// Backing log-file path.
        path: String,
    },
    /// `WRITE`: bare threshold notification.
    Write,
    /// `CLOSE`: final drain requested.
    Close,
}

impl Request {
    /// Encodes the request into `buf`, returning the frame length.
    ///
    /// `buf` must be [`REQ_SIZE`] bytes.
    pub fn encode(&self, buf: &mut [u8; REQ_SIZE]) -> Result<usize, ProtoError> {
        match self {
            Self::Init { append, path } => {
                if path.len() + 1 > MAX_PATH {
                    return Err(ProtoError::PathTooLong {
                        len: path.len(),
                        max: MAX_PATH,
                    });
                }
                buf[0] = Opcode::Init as u8;
                buf[1] = u8::from(*append);
                buf[2..2 + path.len()].copy_from_slice(path.as_bytes());
                buf[2 + path.len()] = 0;
                Ok(2 + path.len() + 1)
            }
            Self::Write => {
                buf[0] = Opcode::Write as u8;
                Ok(1)
            }
            Self::Close => {
                buf[0] = Opcode::Close as u8;
                Ok(1)
            }
        }
    }

    /// Parses the first frame in `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtoError> {
        let opcode = Opcode::try_from(*bytes.first().ok_or(ProtoError::Empty)?)?;
        match opcode {
            Opcode::Init => {
                if bytes.len() < 3 {
                    return Err(ProtoError::Truncated {
                        opcode,
                        got: bytes.len(),
                    });
                }
                let append = bytes[1] != 0;
                let rest = &bytes[2..];
                let nul = rest
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(ProtoError::MissingNul { opcode })?;
                let path = std::str::from_utf8(&rest[..nul])
                    .map_err(|_| ProtoError::BadUtf8 { opcode })?
                    .to_owned();
                Ok(Self::Init { append, path })
            }
            Opcode::Write => Ok(Self::Write),
            Opcode::Close => Ok(Self::Close),
        }
    }
}

/// The server's reply to `INIT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitResponse {
    /// Status 1: the shared region is provisioned under this name.
    Ok {
        /// Shared-memory object name the client should map.
        region_name: String,
    },
    /// Status 0: provisioning failed with this errno.
    Err {
        /// The server-side errno.
        errno: i32,
    },
}

impl InitResponse {
    /// Encodes into a zero-padded fixed-size frame.
    pub fn encode(&self) -> Result<[u8; RESP_SIZE], ProtoError> {
        let mut buf = [0u8; RESP_SIZE];
        match self {
            Self::Ok { region_name } => {
                if region_name.len() + 1 > RESP_SIZE - 1 {
                    return Err(ProtoError::PathTooLong {
                        len: region_name.len(),
                        max: RESP_SIZE - 1,
                    });
                }
                buf[0] = 1;
                buf[1..=region_name.len()].copy_from_slice(region_name.as_bytes());
                // Trailing NUL is already there from the zero fill.
            }
            Self::Err { errno } => {
                buf[0] = 0;
                buf[1..5].copy_from_slice(&errno.to_ne_bytes());
            }
        }
        Ok(buf)
    }

    /// Parses a response frame.
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtoError> {
        let status = *bytes.first().ok_or(ProtoError::Empty)?;
        if status == 0 {
            if bytes.len() < 5 {
                return Err(ProtoError::Truncated {
                    opcode: Opcode::Init,
                    got: bytes.len(),
                });
            }
            let errno = i32::from_ne_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
            return Ok(Self::Err { errno });
        }
        let rest = &bytes[1..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(ProtoError::MissingNul {
                opcode: Opcode::Init,
            })?;
        let region_name = std::str::from_utf8(&rest[..nul])
            .map_err(|_| ProtoError::BadUtf8 {
                opcode: Opcode::Init,
            })?
            .to_owned();
        Ok(Self::Ok { region_name })
    }
}
