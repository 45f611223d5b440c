use crate::error::EvoError;
use crate::types::ImprovementKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic version of the evolved project, bumped on every published
/// release. Only `X.Y.Z` is accepted; pre-release and build metadata are
/// out of scope for automated releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Next version after publishing an improvement of `kind`.
    ///
    /// Features bump the minor component and reset patch; everything else
    /// is a patch bump. The result is always strictly greater than `self`.
    pub fn bumped(self, kind: ImprovementKind) -> Version {
        match kind {
            ImprovementKind::Feature => Version::new(self.major, self.minor + 1, 0),
            _ => Version::new(self.major, self.minor, self.patch + 1),
        }
    }

    pub fn tag(self) -> String {
        format!("v{self}")
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::new(0, 1, 0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl std::str::FromStr for Version {
    type Err = EvoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EvoError::InvalidVersion(s.to_string());
        let mut parts = s.split('.');
        let major = parts.next().ok_or_else(invalid)?;
        let minor = parts.next().ok_or_else(invalid)?;
        let patch = parts.next().ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Version::new(
            major.parse().map_err(|_| invalid())?,
            minor.parse().map_err(|_| invalid())?,
            patch.parse().map_err(|_| invalid())?,
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
