//! Semantic version parsing and incrementing.
//!
//! Only the leading `major.minor.patch` triple of a version string is
//! interpreted. Pre-release and build suffixes are ignored for parsing;
//! callers keep the original string for display.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

static VERSION_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.(\d+)\.(\d+)").expect("version pattern is valid")
});

/// The numeric part of a semantic version, ordered by (major, minor, patch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SemanticVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// Which component of a version to bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionPart {
    Major,
    Minor,
    Patch,
}

impl SemanticVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the leading `major.minor.patch` of `text`.
    ///
    /// Returns `None` for blank input, when the prefix is absent, or when a
    /// component does not fit in a `u32`.
    pub fn parse(text: &str) -> Option<Self> {
        if text.trim().is_empty() {
            return None;
        }

        let caps = VERSION_PREFIX.captures(text)?;
        Some(Self {
            major: caps[1].parse().ok()?,
            minor: caps[2].parse().ok()?,
            patch: caps[3].parse().ok()?,
        })
    }

    /// The next version after bumping `part`; lower components reset to zero.
    ///
    /// Saturates at `u32::MAX` instead of wrapping.
    pub fn increment(self, part: VersionPart) -> Self {
        match part {
            VersionPart::Major => Self::new(self.major.saturating_add(1), 0, 0),
            VersionPart::Minor => Self::new(self.major, self.minor.saturating_add(1), 0),
            VersionPart::Patch => Self::new(self.major, self.minor, self.patch.saturating_add(1)),
        }
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemanticVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("'{}' is not a semantic version (e.g. 1.2.3)", s))
    }
}

impl VersionPart {
    pub fn as_str(self) -> &'static str {
        match self {
            VersionPart::Major => "major",
            VersionPart::Minor => "minor",
            VersionPart::Patch => "patch",
        }
    }
}

impl fmt::Display for VersionPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionPart {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "major" => Ok(VersionPart::Major),
            "minor" => Ok(VersionPart::Minor),
            "patch" => Ok(VersionPart::Patch),
            other => Err(format!(
                "unknown version part '{}', expected major, minor or patch",
                other
            )),
        }
    }
}
