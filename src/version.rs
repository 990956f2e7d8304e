//! Content versioning utilities

use crate::error::{ContentError, Result};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A server version as written in `fromversion` / `toversion` fields.
///
/// Content files routinely write `6.0` or `5`, so missing components are
/// padded with zeros before handing the string to semver.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentVersion {
    pub version: Version,
}

impl ContentVersion {
    /// Lowest version, used when an item declares no `fromversion`
    pub fn min() -> Self {
        Self {
            version: Version::new(0, 0, 0),
        }
    }

    /// Highest version, used when an item declares no `toversion`
    pub fn max() -> Self {
        Self {
            version: Version::new(99, 99, 99),
        }
    }

    /// Parse a version string, tolerating a leading `v` and missing parts
    pub fn parse(version_str: &str) -> Result<Self> {
        let trimmed = version_str.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let parts = trimmed.split('.').count();
        let padded = match parts {
            1 => format!("{trimmed}.0.0"),
            2 => format!("{trimmed}.0"),
            _ => trimmed.to_string(),
        };
        let version = Version::parse(&padded).map_err(|source| ContentError::InvalidVersion {
            value: version_str.to_string(),
            source,
        })?;
        Ok(Self { version })
    }
}

impl FromStr for ContentVersion {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContentVersion {
    type Error = ContentError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ContentVersion> for String {
    fn from(value: ContentVersion) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ContentVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_padding() {
        assert_eq!(ContentVersion::parse("6.0").unwrap().to_string(), "6.0.0");
        assert_eq!(ContentVersion::parse("5").unwrap().to_string(), "5.0.0");
        assert_eq!(ContentVersion::parse("v6.5.1").unwrap().to_string(), "6.5.1");
    }

    #[test]
    fn test_parse_invalid() {
        let err = ContentVersion::parse("six").unwrap_err();
        assert!(matches!(err, ContentError::InvalidVersion { .. }));
    }

    #[test]
    fn test_ordering() {
        let a = ContentVersion::parse("6.0.0").unwrap();
        let b = ContentVersion::parse("6.10").unwrap();
        assert!(a < b);
        assert!(ContentVersion::min() < a);
        assert!(b < ContentVersion::max());
    }
}
