use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::core::interning::InternedString;

/// A module-system version: a numeric `major.minor.micro` triple with an
/// optional alphanumeric qualifier, e.g. `1.2.0` or `1.2.0.rc1`.
///
/// Ordering is lexicographic on the triple; qualifiers compare byte-wise,
/// with the absent (empty) qualifier sorting before any non-empty one, so
/// `1.0.0 < 1.0.0.a < 1.0.0.b < 1.0.1`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    major: u64,
    minor: u64,
    micro: u64,
    qualifier: InternedString,
}

impl Version {
    pub fn new(major: u64, minor: u64, micro: u64) -> Version {
        Version {
            major,
            minor,
            micro,
            qualifier: InternedString::new(""),
        }
    }

    pub fn with_qualifier(major: u64, minor: u64, micro: u64, qualifier: &str) -> Version {
        Version {
            major,
            minor,
            micro,
            qualifier: InternedString::new(qualifier),
        }
    }

    /// The default version of a capability that declares none: `0.0.0`.
    pub fn zero() -> Version {
        Version::new(0, 0, 0)
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn micro(&self) -> u64 {
        self.micro
    }

    pub fn qualifier(&self) -> &str {
        self.qualifier.as_str()
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Version) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.micro.cmp(&other.micro))
            .then_with(|| self.qualifier.as_str().cmp(other.qualifier.as_str()))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Version) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version `{input}`: {reason}")]
pub struct VersionParseError {
    input: String,
    reason: &'static str,
}

impl VersionParseError {
    fn new(input: &str, reason: &'static str) -> VersionParseError {
        VersionParseError {
            input: input.to_string(),
            reason,
        }
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Version, VersionParseError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionParseError::new(s, "empty string"));
        }
        let mut numbers = [0u64; 3];
        let mut qualifier = "";
        for (i, part) in s.splitn(4, '.').enumerate() {
            if i < 3 {
                numbers[i] = part
                    .parse()
                    .map_err(|_| VersionParseError::new(s, "numeric component expected"))?;
            } else {
                if part.is_empty() {
                    return Err(VersionParseError::new(s, "empty qualifier"));
                }
                if !part
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
                {
                    return Err(VersionParseError::new(s, "invalid qualifier character"));
                }
                qualifier = part;
            }
        }
        Ok(Version::with_qualifier(
            numbers[0], numbers[1], numbers[2], qualifier,
        ))
    }
}
