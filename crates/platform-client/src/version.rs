//! Platform control-plane version
//!
//! A small `major.minor.patch` value with total ordering, used by components to
//! select between schema variants of the resources they install.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Parsed control-plane version.
///
/// Ordering is lexicographic over `(major, minor, patch)`; field order matters
/// for the derived `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PlatformVersion {
    /// Major version
    pub major: u64,
    /// Minor version
    pub minor: u64,
    /// Patch version; `0` when the server omits it
    pub patch: u64,
}

/// Error returned when a version string cannot be parsed
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid platform version '{input}': {reason}")]
pub struct VersionParseError {
    input: String,
    reason: &'static str,
}

impl PlatformVersion {
    /// Version `0.0.0`; the lowest possible threshold
    pub const ZERO: PlatformVersion = PlatformVersion::new(0, 0, 0);

    /// `major.minor.patch`
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }
}

impl fmt::Display for PlatformVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for PlatformVersion {
    type Err = VersionParseError;

    /// Accepts `1.16`, `v1.30.2`, `v1.29.4-gke.1043002`, `1.27.3+k3s1`.
    ///
    /// A leading `v` is optional, the patch component defaults to 0, and any
    /// pre-release or build suffix is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| VersionParseError {
            input: s.to_string(),
            reason,
        };

        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let core = trimmed
            .split(['-', '+'])
            .next()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| err("empty version"))?;

        let mut parts = core.split('.');
        let mut component = |required: bool| -> Result<u64, VersionParseError> {
            match parts.next() {
                Some(p) => p.parse::<u64>().map_err(|_| err("non-numeric component")),
                None if required => Err(err("missing major or minor component")),
                None => Ok(0),
            }
        };

        let major = component(true)?;
        let minor = component(true)?;
        let patch = component(false)?;
        if parts.next().is_some() {
            return Err(err("too many components"));
        }

        Ok(Self::new(major, minor, patch))
    }
}

impl TryFrom<&k8s_openapi::apimachinery::pkg::version::Info> for PlatformVersion {
    type Error = VersionParseError;

    /// Prefers `gitVersion`, which carries the patch level; falls back to
    /// `major`/`minor`, stripping the `+` some distributions append (e.g. "27+").
    fn try_from(info: &k8s_openapi::apimachinery::pkg::version::Info) -> Result<Self, Self::Error> {
        if let Ok(v) = info.git_version.parse() {
            return Ok(v);
        }
        let minor = info.minor.trim_end_matches('+');
        format!("{}.{}", info.major, minor).parse()
    }
}
