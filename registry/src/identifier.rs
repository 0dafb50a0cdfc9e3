//! Validation of package names, versions and file paths.
//!
//! Identifiers end up inside URL templates, so they are checked at every
//! entry point of the client, not just once.

use std::sync::LazyLock;

use regex_lite::Regex;
use thiserror::Error;

pub const MAX_PACKAGE_NAME_LEN: usize = 100;
pub const MAX_FILE_PATH_LEN: usize = 500;
pub const MAX_QUERY_LEN: usize = 500;

static PACKAGE_NAME_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").ok());

static VERSION_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[0-9]+\.[0-9]+\.[0-9]+(-[a-z0-9.]+)?$").ok());

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid package name {name:?}: {reason}")]
    PackageName { name: String, reason: &'static str },

    #[error("invalid version {version:?}: expected MAJOR.MINOR.PATCH[-prerelease]")]
    Version { version: String },

    #[error("invalid file path {path:?}: {reason}")]
    FilePath { path: String, reason: &'static str },

    #[error("query is {len} characters; the limit is {MAX_QUERY_LEN}")]
    QueryTooLong { len: usize },
}

fn matches(re: &LazyLock<Option<Regex>>, value: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(value))
}

pub fn validate_package_name(name: &str) -> Result<&str, ValidationError> {
    let fail = |reason| {
        Err(ValidationError::PackageName {
            name: name.to_string(),
            reason,
        })
    };
    if name.is_empty() {
        return fail("empty");
    }
    if name.len() > MAX_PACKAGE_NAME_LEN {
        return fail("longer than 100 characters");
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return fail("contains a path separator or traversal sequence");
    }
    if !matches(&PACKAGE_NAME_RE, name) {
        return fail("must be lowercase letters, digits and hyphens, not starting with a hyphen");
    }
    Ok(name)
}

pub fn validate_version(version: &str) -> Result<&str, ValidationError> {
    if matches(&VERSION_RE, version) {
        Ok(version)
    } else {
        Err(ValidationError::Version {
            version: version.to_string(),
        })
    }
}

pub fn validate_file_path(path: &str) -> Result<&str, ValidationError> {
    let fail = |reason| {
        Err(ValidationError::FilePath {
            path: path.to_string(),
            reason,
        })
    };
    if path.is_empty() {
        return fail("empty");
    }
    if path.len() > MAX_FILE_PATH_LEN {
        return fail("longer than 500 characters");
    }
    if path.contains('\0') {
        return fail("contains a null byte");
    }
    let normalized = path.replace('\\', "/");
    if normalized.starts_with('/') || has_drive_prefix(&normalized) {
        return fail("must be relative");
    }
    if normalized.split('/').any(|segment| segment == "..") {
        return fail("contains a `..` segment");
    }
    Ok(path)
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

pub fn validate_query(query: &str) -> Result<&str, ValidationError> {
    let len = query.chars().count();
    if len > MAX_QUERY_LEN {
        return Err(ValidationError::QueryTooLong { len });
    }
    Ok(query)
}

/// A package, version and optional file path that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryIdentifier {
    package: String,
    version: String,
    path: Option<String>,
}

impl RegistryIdentifier {
    pub fn new(package: &str, version: &str, path: Option<&str>) -> Result<Self, ValidationError> {
        Ok(Self {
            package: validate_package_name(package)?.to_string(),
            version: validate_version(version)?.to_string(),
            path: path.map(validate_file_path).transpose()?.map(str::to_string),
        })
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// `"{package}@{version}"`
    pub fn cache_key(&self) -> String {
        format!("{}@{}", self.package, self.version)
    }
}

/// Orders version strings numerically, newest first. Prereleases sort below
/// their release.
pub(crate) fn version_sort_key(version: &str) -> (u64, u64, u64, bool, String) {
    let (core, pre) = match version.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (version, None),
    };
    let mut parts = core.split('.').map(|p| p.parse::<u64>().unwrap_or(0));
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        pre.is_none(),
        pre.unwrap_or_default().to_string(),
    )
}
