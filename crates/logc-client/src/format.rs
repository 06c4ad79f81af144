//! Record formatter.
//!
//! One record is one line:
//!
//! ```text
//! Sat Aug  1 12:00:00 2026 | src/worker.rs | app::worker | 42 | queue drained
//! ```
//!
//! The trailing newline is part of the record; the ring and the backing
//! file only ever see whole lines.

use std::fmt;

/// Builds one record from a call site and a message.
pub fn format_record(file: &str, module: &str, line: u32, args: fmt::Arguments<'_>) -> String {
    let stamp = chrono::Local::now().format("%c");
    format!("{stamp} | {file} | {module} | {line} | {args}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_is_one_terminated_line() {
        let record = format_record("src/a.rs", "app::a", 7, format_args!("x = {}", 1));
        assert!(record.ends_with("x = 1\n"));
        assert_eq!(record.matches('\n').count(), 1);
    }

    #[test]
    fn fields_are_pipe_separated() {
        let record = format_record("src/a.rs", "app::a", 7, format_args!("m"));
        let fields: Vec<&str> = record.trim_end().split(" | ").collect();
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[1], "src/a.rs");
        assert_eq!(fields[2], "app::a");
        assert_eq!(fields[3], "7");
        assert_eq!(fields[4], "m");
    }
}
