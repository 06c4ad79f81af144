use std::str::FromStr;

/// Log levels, ordered from least to most severe.
///
/// A handle at level `L` accepts records at `L` and above. `All` accepts
/// everything, `Disable` nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    All,
    Info,
    Debug,
    Warn,
    Error,
    Trace,
    Disable,
}

impl Level {
    /// True when a record at `record` passes a handle filtered at `self`.
    #[inline]
    pub fn allows(self, record: Level) -> bool {
        self != Self::Disable && record >= self
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "trace" => Ok(Self::Trace),
            "disable" => Ok(Self::Disable),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_accepts_at_or_above() {
        assert!(Level::Info.allows(Level::Info));
        assert!(Level::Info.allows(Level::Error));
        assert!(!Level::Warn.allows(Level::Info));
        assert!(Level::All.allows(Level::Info));
    }

    #[test]
    fn disable_rejects_everything() {
        assert!(!Level::Disable.allows(Level::Trace));
        assert!(!Level::Disable.allows(Level::Disable));
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("WARN".parse::<Level>().unwrap(), Level::Warn);
        assert!("verbose".parse::<Level>().is_err());
    }
}
