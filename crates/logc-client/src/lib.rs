//! logc-client: the library an application links to log through the
//! shared-memory facility.
//!
//! A [`LogHandle`] connects to the log server over a Unix stream socket,
//! receives the name of a freshly provisioned shared-memory region and maps
//! it. From then on every log call is local: the record is formatted and
//! appended to the wait-free ring, and only a threshold crossing costs one
//! non-blocking single-byte socket write. The server owns the log file; the
//! client process never touches it.
//!
//! # Example
//!
//! ```no_run
//! use logc_client::{log_info, Level, LogHandle};
//!
//! let mut handle = LogHandle::new("/var/log/app.log", Level::Info, true);
//! handle.connect()?;
//!
//! log_info!(handle, "started with {} workers", 4);
//!
//! handle.close();
//! # Ok::<(), logc_client::ClientError>(())
//! ```

mod format;
mod handle;
mod level;
#[macro_use]
mod macros;

pub use format::format_record;
pub use handle::{ClientError, LogHandle};
pub use level::Level;
