//! Git-derived version strings
//!
//! A derived version is the project's declared version with any `-SNAPSHOT`
//! marker removed, followed by the commit time and an abbreviated commit
//! hash: `1.2.0-20240131_174502-g1a2b3c4`.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

use super::sha::Sha;

/// Default number of hex digits of the commit hash kept in a version
pub const DEFAULT_SHA_LENGTH: usize = 7;

static DERIVED_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{8})_?(\d{6})-g?([0-9a-fA-F]{4,40})(?:\.jar)?$").expect("static regex")
});

/// Commit time and hash prefix recovered from a derived version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVersion {
    pub ctime: i64,
    pub sha_prefix: String,
}

impl ParsedVersion {
    pub fn matches(&self, sha: &Sha) -> bool {
        sha.to_hex().starts_with(&self.sha_prefix)
    }
}

/// Strip a trailing `-SNAPSHOT` marker, case-insensitively
pub fn release_version(version: &str) -> &str {
    const MARKER: &str = "-SNAPSHOT";
    if version.len() >= MARKER.len() {
        let split = version.len() - MARKER.len();
        if version.is_char_boundary(split) && version[split..].eq_ignore_ascii_case(MARKER) {
            return &version[..split];
        }
    }
    version
}

/// Format a commit time as the fixed-width UTC stamp used in versions
pub fn format_ctime(ctime: i64) -> Option<String> {
    let format = format_description!("[year][month][day]_[hour][minute][second]");
    OffsetDateTime::from_unix_timestamp(ctime)
        .ok()
        .and_then(|dt| dt.format(&format).ok())
}

/// Build the derived version for a declared version at a commit
pub fn format_version(version: &str, ctime: i64, sha: &Sha) -> String {
    format_version_with(version, ctime, sha, DEFAULT_SHA_LENGTH)
}

pub fn format_version_with(version: &str, ctime: i64, sha: &Sha, sha_length: usize) -> String {
    let stamp = format_ctime(ctime).unwrap_or_else(|| "00000000_000000".to_string());
    format!(
        "{}-{}-g{}",
        release_version(version),
        stamp,
        sha.short(sha_length.clamp(4, 40))
    )
}

/// Recover commit time and hash prefix from a derived version.
///
/// Accepts the stamp with or without the `_` separator and the `g` marker,
/// a trailing `.jar`, and anything in front (artifact name, path). Returns
/// `None` for versions that were not derived from git history.
pub fn parse_version(version: &str) -> Option<ParsedVersion> {
    let caps = DERIVED_SUFFIX.captures(version)?;
    let (day, clock) = (&caps[1], &caps[2]);
    let num = |s: &str| s.parse::<u16>().ok();

    let date = Date::from_calendar_date(
        i32::from(num(&day[..4])?),
        Month::try_from(u8::try_from(num(&day[4..6])?).ok()?).ok()?,
        u8::try_from(num(&day[6..])?).ok()?,
    )
    .ok()?;
    let time = Time::from_hms(
        u8::try_from(num(&clock[..2])?).ok()?,
        u8::try_from(num(&clock[2..4])?).ok()?,
        u8::try_from(num(&clock[4..])?).ok()?,
    )
    .ok()?;
    let ctime = PrimitiveDateTime::new(date, time).assume_utc().unix_timestamp();
    Some(ParsedVersion {
        ctime,
        sha_prefix: caps[3].to_ascii_lowercase(),
    })
}

/// A project version pinned to a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCoordinate {
    pub name: String,
    pub version: String,
    pub ctime: i64,
    pub sha: Sha,
}

impl VersionCoordinate {
    pub fn new(name: impl Into<String>, version: impl Into<String>, ctime: i64, sha: Sha) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ctime,
            sha,
        }
    }

    pub fn derived_version(&self) -> String {
        format_version(&self.version, self.ctime, &self.sha)
    }

    /// Artifact name without the group part
    pub fn artifact(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

impl fmt::Display for VersionCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.artifact(), self.derived_version())
    }
}
