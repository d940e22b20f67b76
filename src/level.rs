//! Message severity levels
//!
//! Levels are totally ordered: `Debug < Information < Warning < Error`.
//! The numeric codes (0..=3) are what the SQLite store persists, so they
//! must never be renumbered.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Severity of a single log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageLevel {
    Debug = 0,
    Information = 1,
    Warning = 2,
    Error = 3,
}

impl MessageLevel {
    /// All levels in ascending order.
    pub const ALL: [MessageLevel; 4] = [
        MessageLevel::Debug,
        MessageLevel::Information,
        MessageLevel::Warning,
        MessageLevel::Error,
    ];

    /// Stable numeric code used for persistence.
    pub fn code(self) -> i64 {
        self as i64
    }

    /// Inverse of [`MessageLevel::code`].
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(MessageLevel::Debug),
            1 => Some(MessageLevel::Information),
            2 => Some(MessageLevel::Warning),
            3 => Some(MessageLevel::Error),
            _ => None,
        }
    }

    /// Fixed-width (5 character) label used by the text renderers.
    pub fn label(self) -> &'static str {
        match self {
            MessageLevel::Debug => "DEBUG",
            MessageLevel::Information => " INFO",
            MessageLevel::Warning => " WARN",
            MessageLevel::Error => "ERROR",
        }
    }

    /// Short lowercase name, also the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageLevel::Debug => "debug",
            MessageLevel::Information => "info",
            MessageLevel::Warning => "warn",
            MessageLevel::Error => "error",
        }
    }

    /// Whether entries at this level show up in an errors-only rendering.
    pub fn is_problem(self) -> bool {
        self >= MessageLevel::Warning
    }
}

impl fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown level name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid message level {0:?}; must be debug, info, warn, or error")]
pub struct ParseLevelError(pub String);

impl FromStr for MessageLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(MessageLevel::Debug),
            "info" | "information" => Ok(MessageLevel::Information),
            "warn" | "warning" => Ok(MessageLevel::Warning),
            "error" => Ok(MessageLevel::Error),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

impl Serialize for MessageLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered() {
        assert!(MessageLevel::Debug < MessageLevel::Information);
        assert!(MessageLevel::Information < MessageLevel::Warning);
        assert!(MessageLevel::Warning < MessageLevel::Error);
        assert_eq!(
            MessageLevel::ALL.iter().max(),
            Some(&MessageLevel::Error)
        );
    }

    #[test]
    fn test_codes_are_stable() {
        for level in MessageLevel::ALL {
            assert_eq!(MessageLevel::from_code(level.code()), Some(level));
        }
        assert_eq!(MessageLevel::Warning.code(), 2);
        assert_eq!(MessageLevel::from_code(4), None);
        assert_eq!(MessageLevel::from_code(-1), None);
    }

    #[test]
    fn test_parse_accepts_aliases() {
        assert_eq!("info".parse::<MessageLevel>().unwrap(), MessageLevel::Information);
        assert_eq!("Information".parse::<MessageLevel>().unwrap(), MessageLevel::Information);
        assert_eq!("WARN".parse::<MessageLevel>().unwrap(), MessageLevel::Warning);
        assert_eq!("warning".parse::<MessageLevel>().unwrap(), MessageLevel::Warning);
        assert_eq!("debug".parse::<MessageLevel>().unwrap(), MessageLevel::Debug);
        assert_eq!("error".parse::<MessageLevel>().unwrap(), MessageLevel::Error);

        let err = "fatal".parse::<MessageLevel>().unwrap_err();
        assert_eq!(err, ParseLevelError("fatal".to_string()));
    }

    #[test]
    fn test_labels_are_fixed_width() {
        for level in MessageLevel::ALL {
            assert_eq!(level.label().len(), 5, "label for {} should be 5 chars", level);
        }
    }

    #[test]
    fn test_serde_uses_short_names() {
        let json = serde_json::to_string(&MessageLevel::Warning).unwrap();
        assert_eq!(json, "\"warn\"");

        let level: MessageLevel = serde_json::from_str("\"information\"").unwrap();
        assert_eq!(level, MessageLevel::Information);

        assert!(serde_json::from_str::<MessageLevel>("\"loud\"").is_err());
    }

    #[test]
    fn test_problem_levels() {
        assert!(!MessageLevel::Debug.is_problem());
        assert!(!MessageLevel::Information.is_problem());
        assert!(MessageLevel::Warning.is_problem());
        assert!(MessageLevel::Error.is_problem());
    }
}
