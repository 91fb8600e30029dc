//! Semantic version parsing and ordering.
//!
//! Broker and schema versions are compared to decide whether a template may
//! be installed and which fields a record is allowed to carry.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid version: {0}")]
pub struct VersionParseError(String);

/// A `major.minor.patch[-pre]` version.
///
/// Pre-release versions order before the release they precede, so
/// `8.6.0-alpha1 < 8.6.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre_release: Option<String>,
}

impl SemanticVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre_release: None,
        }
    }

    /// Parse a version, returning `None` for anything unparseable.
    pub fn parse(input: &str) -> Option<Self> {
        input.parse().ok()
    }

    pub fn is_newer_than(&self, other: &SemanticVersion) -> bool {
        self > other
    }
}

impl FromStr for SemanticVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (core, pre_release) = match trimmed.split_once('-') {
            Some((core, pre)) if !pre.is_empty() => (core, Some(pre.to_string())),
            Some(_) => return Err(VersionParseError(s.to_string())),
            None => (trimmed, None),
        };

        let mut parts = core.split('.');
        let mut next_part = |required: bool| -> Result<u64, VersionParseError> {
            match parts.next() {
                Some(part) => part
                    .parse::<u64>()
                    .map_err(|_| VersionParseError(s.to_string())),
                None if required => Err(VersionParseError(s.to_string())),
                None => Ok(0),
            }
        };

        let major = next_part(true)?;
        let minor = next_part(true)?;
        let patch = next_part(false)?;

        if parts.next().is_some() {
            return Err(VersionParseError(s.to_string()));
        }

        Ok(Self {
            major,
            minor,
            patch,
            pre_release,
        })
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre_release, &other.pre_release) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre_release {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_release() {
        let version: SemanticVersion = "8.6.0".parse().unwrap();
        assert_eq!(version, SemanticVersion::new(8, 6, 0));
        assert_eq!(version.to_string(), "8.6.0");
    }

    #[test]
    fn test_parse_pre_release() {
        let version: SemanticVersion = "8.7.0-SNAPSHOT".parse().unwrap();
        assert_eq!(version.pre_release.as_deref(), Some("SNAPSHOT"));
        assert_eq!(version.to_string(), "8.7.0-SNAPSHOT");
    }

    #[test]
    fn test_parse_missing_patch() {
        assert_eq!(SemanticVersion::parse("8.6"), Some(SemanticVersion::new(8, 6, 0)));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(SemanticVersion::parse("eight").is_none());
        assert!(SemanticVersion::parse("8").is_none());
        assert!(SemanticVersion::parse("8.6.0.1").is_none());
        assert!(SemanticVersion::parse("8.6.0-").is_none());
    }

    #[test]
    fn test_ordering() {
        let v850 = SemanticVersion::new(8, 5, 0);
        let v860 = SemanticVersion::new(8, 6, 0);
        let v860_alpha: SemanticVersion = "8.6.0-alpha1".parse().unwrap();
        let v8100 = SemanticVersion::new(8, 10, 0);

        assert!(v860.is_newer_than(&v850));
        assert!(!v850.is_newer_than(&v860));
        assert!(!v860.is_newer_than(&v860));
        assert!(v860_alpha < v860);
        assert!(v860_alpha > v850);
        assert!(v8100 > v860);
    }
}
