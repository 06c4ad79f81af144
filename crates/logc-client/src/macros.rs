//! Level macros: the call-site capture the formatter needs.
//!
//! ```ignore
//! let mut handle = LogHandle::new("/var/log/app.log", Level::Info, true);
//! handle.connect()?;
//! log_info!(handle, "worker {} started", id);
//! ```

/// Logs at [`Level::Info`](crate::Level::Info).
#[macro_export]
macro_rules! log_info {
    ($handle:expr, $($arg:tt)*) => {
        $handle.log($crate::Level::Info, file!(), module_path!(), line!(), format_args!($($arg)*))
    };
}

/// Logs at [`Level::Debug`](crate::Level::Debug).
#[macro_export]
macro_rules! log_debug {
    ($handle:expr, $($arg:tt)*) => {
        $handle.log($crate::Level::Debug, file!(), module_path!(), line!(), format_args!($($arg)*))
    };
}

/// Logs at [`Level::Warn`](crate::Level::Warn).
#[macro_export]
macro_rules! log_warn {
    ($handle:expr, $($arg:tt)*) => {
        $handle.log($crate::Level::Warn, file!(), module_path!(), line!(), format_args!($($arg)*))
    };
}

/// Logs at [`Level::Error`](crate::Level::Error).
#[macro_export]
macro_rules! log_error {
    ($handle:expr, $($arg:tt)*) => {
        $handle.log($crate::Level::Error, file!(), module_path!(), line!(), format_args!($($arg)*))
    };
}

/// Logs at [`Level::Trace`](crate::Level::Trace).
#[macro_export]
macro_rules! log_trace {
    ($handle:expr, $($arg:tt)*) => {
        $handle.log($crate::Level::Trace, file!(), module_path!(), line!(), format_args!($($arg)*))
    };
}
