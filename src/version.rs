//! Dotted version strings.
//!
//! Versions are passed around as the strings the installer reports. Only the
//! major component is ever interpreted and it is compared as an integer,
//! never as text ("9" is older than "14").

/// The first dot separated component of `version`.
///
/// No attempt is made to check that it is numeric. Returns `None` for an empty
/// string or an empty first component.
///
/// ```
/// assert_eq!(vslocate::parse_major("17.4.33213.308"), Some("17"));
/// assert_eq!(vslocate::parse_major("5"), Some("5"));
/// assert_eq!(vslocate::parse_major(""), None);
/// ```
pub fn parse_major(version: &str) -> Option<&str> {
    version.split('.').next().filter(|major| !major.is_empty())
}

/// The major component as an integer, for ordering comparisons.
pub fn major_number(version: &str) -> Option<u32> {
    parse_major(version)?.trim().parse().ok()
}

/// True if every component is a non-empty run of ASCII digits, e.g. `14.0` but not `14.0_Config`.
pub(crate) fn is_numeric_version(version: &str) -> bool {
    version
        .split('.')
        .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
}
