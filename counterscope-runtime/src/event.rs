//! The ordered list of counter events measured for a run.

use std::fmt;
use std::sync::Arc;

use crate::error::ConfigError;

/// Ordered, immutable list of counter event names.
///
/// Parsed once at initialization. Every frame's value buffer has exactly
/// `len()` slots in this order. Cloning is cheap (shared storage).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSpec {
    names: Arc<[String]>,
}

impl EventSpec {
    /// Parse a comma-separated event list such as `cycles,instructions`.
    ///
    /// Surrounding whitespace is trimmed from each name. An empty list, or an
    /// empty name between commas, is a configuration error.
    pub fn parse(list: &str) -> Result<Self, ConfigError> {
        if list.trim().is_empty() {
            return Err(ConfigError::MissingEvents);
        }
        let mut names = Vec::new();
        for token in list.split(',') {
            let name = token.trim();
            if name.is_empty() {
                return Err(ConfigError::EmptyEvent {
                    list: list.to_owned(),
                });
            }
            names.push(name.to_owned());
        }
        Ok(Self {
            names: names.into(),
        })
    }

    /// Build a spec from already-split names. An empty iterator yields an
    /// empty spec (rows then carry only timestamps).
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

impl fmt::Display for EventSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_order() {
        let spec = EventSpec::parse("cycles,instructions,branch-misses").unwrap();
        assert_eq!(spec.len(), 3);
        let names: Vec<&str> = spec.names().collect();
        assert_eq!(names, ["cycles", "instructions", "branch-misses"]);
        assert_eq!(spec.position("instructions"), Some(1));
    }

    #[test]
    fn parse_trims_whitespace() {
        let spec = EventSpec::parse(" cycles , instructions ").unwrap();
        assert_eq!(spec.get(0), Some("cycles"));
        assert_eq!(spec.get(1), Some("instructions"));
        assert_eq!(spec.to_string(), "cycles,instructions");
    }

    #[test]
    fn parse_rejects_empty_list() {
        assert!(matches!(
            EventSpec::parse(""),
            Err(ConfigError::MissingEvents)
        ));
        assert!(matches!(
            EventSpec::parse("   "),
            Err(ConfigError::MissingEvents)
        ));
    }

    #[test]
    fn parse_rejects_empty_name() {
        let err = EventSpec::parse("cycles,,instructions").unwrap_err();
        assert!(
            matches!(err, ConfigError::EmptyEvent { .. }),
            "unexpected error: {err}"
        );
        assert!(EventSpec::parse("cycles,").is_err());
    }

    #[test]
    fn from_names_allows_empty() {
        let spec = EventSpec::from_names(Vec::<String>::new());
        assert!(spec.is_empty());
        assert_eq!(spec.to_string(), "");
    }
}
