//! Semantic versions and comparator constraints.
//!
//! Constraints are comma-separated comparators (`>=1.2, <2`). A bare version
//! means an exact match on the parts it names; `^` and `~` follow the usual
//! caret and tilde ranges.
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("invalid version {0:?}")]
    InvalidVersion(String),
    #[error("invalid version constraint {0:?}")]
    InvalidRequirement(String),
}

/// A `major.minor[.patch][-pre][+build]` version. Build metadata is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Option<String>,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: None,
        }
    }

    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let partial = PartialVersion::parse(text)
            .ok_or_else(|| VersionError::InvalidVersion(text.to_string()))?;
        let Some(minor) = partial.minor else {
            return Err(VersionError::InvalidVersion(text.to_string()));
        };
        Ok(Self {
            major: partial.major,
            minor,
            patch: partial.patch.unwrap_or(0),
            pre: partial.pre,
        })
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| compare_pre(self.pre.as_deref(), other.pre.as_deref()))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// A release sorts after any of its pre-releases.
fn compare_pre(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let mut left = a.split('.');
            let mut right = b.split('.');
            loop {
                match (left.next(), right.next()) {
                    (None, None) => return Ordering::Equal,
                    (None, Some(_)) => return Ordering::Less,
                    (Some(_), None) => return Ordering::Greater,
                    (Some(x), Some(y)) => {
                        let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                            (Ok(x), Ok(y)) => x.cmp(&y),
                            (Ok(_), Err(_)) => Ordering::Less,
                            (Err(_), Ok(_)) => Ordering::Greater,
                            (Err(_), Err(_)) => x.cmp(y),
                        };
                        if ord != Ordering::Equal {
                            return ord;
                        }
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PartialVersion {
    major: u64,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: Option<String>,
}

impl PartialVersion {
    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let base = text.split_once('+').map_or(text, |(base, _)| base);
        let (numbers, pre) = match base.split_once('-') {
            Some((numbers, pre)) if !pre.is_empty() => (numbers, Some(pre.to_string())),
            Some(_) => return None,
            None => (base, None),
        };
        let parts = numbers
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                    return None;
                }
                part.parse::<u64>().ok()
            })
            .collect::<Option<Vec<_>>>()?;
        match parts.as_slice() {
            [major] => Some(Self {
                major: *major,
                minor: None,
                patch: None,
                pre,
            }),
            [major, minor] => Some(Self {
                major: *major,
                minor: Some(*minor),
                patch: None,
                pre,
            }),
            [major, minor, patch] => Some(Self {
                major: *major,
                minor: Some(*minor),
                patch: Some(*patch),
                pre,
            }),
            _ => None,
        }
    }

    fn floor(&self) -> Version {
        Version {
            major: self.major,
            minor: self.minor.unwrap_or(0),
            patch: self.patch.unwrap_or(0),
            pre: self.pre.clone(),
        }
    }

    /// First version past the range this partial version names, or `None`
    /// when the range runs to the top of the version space.
    fn next_unnamed(&self) -> Option<Version> {
        match (self.minor, self.patch) {
            (None, _) => bump_major(self.major),
            (Some(minor), None) => bump_minor(self.major, minor),
            (Some(minor), Some(patch)) => patch
                .checked_add(1)
                .map(|patch| Version::new(self.major, minor, patch))
                .or_else(|| bump_minor(self.major, minor)),
        }
    }
}

fn bump_major(major: u64) -> Option<Version> {
    major.checked_add(1).map(|major| Version::new(major, 0, 0))
}

fn bump_minor(major: u64, minor: u64) -> Option<Version> {
    minor
        .checked_add(1)
        .map(|minor| Version::new(major, minor, 0))
        .or_else(|| bump_major(major))
}

fn below(version: &Version, upper: Option<Version>) -> bool {
    match upper {
        Some(upper) => *version < upper,
        None => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Exact,
    Greater,
    GreaterEq,
    Less,
    LessEq,
    Caret,
    Tilde,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Comparator {
    op: Op,
    version: PartialVersion,
}

impl Comparator {
    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (op, rest) = if let Some(rest) = text.strip_prefix(">=") {
            (Op::GreaterEq, rest)
        } else if let Some(rest) = text.strip_prefix("<=") {
            (Op::LessEq, rest)
        } else if let Some(rest) = text.strip_prefix("==") {
            (Op::Exact, rest)
        } else if let Some(rest) = text.strip_prefix('=') {
            (Op::Exact, rest)
        } else if let Some(rest) = text.strip_prefix('>') {
            (Op::Greater, rest)
        } else if let Some(rest) = text.strip_prefix('<') {
            (Op::Less, rest)
        } else if let Some(rest) = text.strip_prefix('^') {
            (Op::Caret, rest)
        } else if let Some(rest) = text.strip_prefix('~') {
            (Op::Tilde, rest)
        } else {
            (Op::Exact, text)
        };
        Some(Self {
            op,
            version: PartialVersion::parse(rest)?,
        })
    }

    fn matches(&self, version: &Version) -> bool {
        let partial = &self.version;
        match self.op {
            Op::Exact => {
                if partial.patch.is_some() {
                    *version == partial.floor()
                } else {
                    *version >= partial.floor() && below(version, partial.next_unnamed())
                }
            }
            Op::GreaterEq => *version >= partial.floor(),
            Op::Less => *version < partial.floor(),
            Op::Greater => {
                if partial.patch.is_some() {
                    *version > partial.floor()
                } else {
                    partial
                        .next_unnamed()
                        .is_some_and(|lower| *version >= lower)
                }
            }
            Op::LessEq => {
                if partial.patch.is_some() {
                    *version <= partial.floor()
                } else {
                    below(version, partial.next_unnamed())
                }
            }
            Op::Caret => {
                let upper = match (partial.major, partial.minor, partial.patch) {
                    (0, Some(0), Some(patch)) => patch
                        .checked_add(1)
                        .map(|patch| Version::new(0, 0, patch))
                        .or_else(|| bump_minor(0, 0)),
                    (0, Some(minor), _) => bump_minor(0, minor),
                    (major, _, _) => bump_major(major),
                };
                *version >= partial.floor() && below(version, upper)
            }
            Op::Tilde => {
                let upper = match partial.minor {
                    Some(minor) => bump_minor(partial.major, minor),
                    None => bump_major(partial.major),
                };
                *version >= partial.floor() && below(version, upper)
            }
        }
    }
}

/// A conjunction of comparators; `*` or an empty string matches anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionReq {
    comparators: Vec<Comparator>,
}

impl VersionReq {
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self {
                comparators: Vec::new(),
            });
        }
        let comparators = trimmed
            .split(',')
            .map(Comparator::parse)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| VersionError::InvalidRequirement(text.to_string()))?;
        Ok(Self { comparators })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.comparators.iter().all(|cmp| cmp.matches(version))
    }
}
