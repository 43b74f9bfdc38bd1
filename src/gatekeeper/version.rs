//! Dotted-numeric version ordering.
//!
//! Journals advertise the release of the publishing platform they run
//! ("2.4.8.0", "3.1.2-4"). Promotion is gated on that release being at least
//! the configured minimum, so ordering has to be numeric per segment:
//!
//! - `"2.4.1" < "2.4.8"` and `"2.4.10" > "2.4.9"`
//! - the shorter operand is zero-padded: `"2.4" == "2.4.0"`
//! - a segment contributes its leading digits; parsing stops at the first
//!   segment without any (`"3.1.2-4"` orders as `3.1.2`)

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Version parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    #[error("Invalid version: {0:?} has no numeric segment")]
    InvalidVersion(String),
}

/// A parsed dotted-numeric version.
///
/// Equality and ordering ignore trailing zero segments, so `2.4` and `2.4.0`
/// compare equal. `Hash` is deliberately not implemented.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    segments: Vec<u64>,
}

impl Version {
    /// Parse a version string.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let mut segments = Vec::new();

        for part in input.trim().split('.') {
            let digits: &str = match part.find(|c: char| !c.is_ascii_digit()) {
                Some(end) => &part[..end],
                None => part,
            };
            if digits.is_empty() {
                break;
            }
            match digits.parse::<u64>() {
                Ok(value) => segments.push(value),
                // Overflowing segment: treat like a non-numeric tail.
                Err(_) => break,
            }
        }

        if segments.is_empty() {
            return Err(VersionError::InvalidVersion(input.to_string()));
        }

        Ok(Self { segments })
    }

    /// Numeric segments as parsed (no padding applied).
    pub fn segments(&self) -> &[u64] {
        &self.segments
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let a = self.segments.get(i).copied().unwrap_or(0);
            let b = other.segments.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.segments.iter().map(u64::to_string).collect();
        write!(f, "{}", rendered.join("."))
    }
}

/// Compare two version strings.
///
/// Fails with [`VersionError::InvalidVersion`] if either side has no numeric
/// segment.
pub fn compare(a: &str, b: &str) -> Result<Ordering, VersionError> {
    let a = Version::parse(a)?;
    let b = Version::parse(b)?;
    Ok(a.cmp(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_level_ordering() {
        assert_eq!(compare("2.4.1", "2.4.8").unwrap(), Ordering::Less);
        assert_eq!(compare("2.4.8", "2.4.1").unwrap(), Ordering::Greater);
    }

    #[test]
    fn test_zero_padding() {
        assert_eq!(compare("2.4", "2.4.0").unwrap(), Ordering::Equal);
        assert_eq!(compare("2.4.0.0", "2.4").unwrap(), Ordering::Equal);
        assert_eq!(compare("2.4", "2.4.0.1").unwrap(), Ordering::Less);
    }

    #[test]
    fn test_segments_are_numeric_not_lexical() {
        assert_eq!(compare("2.4.10", "2.4.9").unwrap(), Ordering::Greater);
        assert_eq!(compare("10.0", "9.9.9").unwrap(), Ordering::Greater);
    }

    #[test]
    fn test_non_numeric_tail_is_ignored() {
        assert_eq!(compare("3.1.2-4", "3.1.2").unwrap(), Ordering::Equal);
        assert_eq!(compare("2.4.8.0 beta", "2.4.8").unwrap(), Ordering::Equal);
        assert_eq!(compare("2.x.9", "2").unwrap(), Ordering::Equal);
    }

    #[test]
    fn test_invalid_version() {
        assert_eq!(
            compare("abc", "2.4").unwrap_err(),
            VersionError::InvalidVersion("abc".to_string())
        );
        assert!(compare("2.4", "").is_err());
        assert!(compare("2.4", ".1").is_err());
    }

    #[test]
    fn test_display_and_serde() {
        let version: Version = " 2.4.8.0 ".parse().unwrap();
        assert_eq!(version.to_string(), "2.4.8.0");
        assert_eq!(version.segments(), &[2, 4, 8, 0]);

        let json = serde_json::to_string(&version).unwrap();
        assert_eq!(json, "\"2.4.8.0\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, version);
        assert!(serde_json::from_str::<Version>("\"none\"").is_err());
    }
}
