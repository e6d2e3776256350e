//! Catalog identifiers
//!
//! A generic identifier is `<loader>:<slug>`; a persisted artifact identifier
//! appends the first 16 hex characters of the artifact hash.

use std::fmt;
use std::str::FromStr;

use crate::hashing::short_hash;
use crate::{Error, Loader, Result};

/// Normalise a display name into a catalog slug
///
/// Lowercases, maps spaces to underscores, drops anything outside
/// `[a-z0-9_-]`, then trims boundary characters that are not `[a-z0-9]`.
pub fn slugify(name: &str) -> Result<String> {
    let filtered: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '_')
        .collect();

    let trimmed = filtered.trim_matches(|c: char| !(c.is_ascii_lowercase() || c.is_ascii_digit()));

    if trimmed.is_empty() {
        return Err(Error::InvalidIdentifier(name.to_string()));
    }

    Ok(trimmed.to_string())
}

/// `<loader>:<slug>` primary key of a record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenericIdentifier {
    pub loader: Loader,
    pub slug: String,
}

impl GenericIdentifier {
    pub fn new(loader: Loader, slug: impl Into<String>) -> Self {
        Self {
            loader,
            slug: slug.into(),
        }
    }

    /// Build the identifier for `display_name` under `loader`
    pub fn from_display_name(loader: Loader, display_name: &str) -> Result<Self> {
        Ok(Self::new(loader, slugify(display_name)?))
    }

    /// Repository path of the record file: `mods/<loader>/<slug>.json`
    pub fn record_path(&self) -> String {
        format!("mods/{}/{}.json", self.loader, self.slug)
    }

    /// Persisted identifier of one artifact of this record
    pub fn artifact_identifier(&self, content_hash: &str) -> String {
        format!("{}:{}", self, short_hash(content_hash))
    }
}

impl fmt::Display for GenericIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.loader, self.slug)
    }
}

impl FromStr for GenericIdentifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (loader, slug) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidInput(format!("generic identifier without loader: {s}")))?;
        if slug.is_empty() || slug.contains(':') {
            return Err(Error::InvalidInput(format!("malformed generic identifier: {s}")));
        }
        Ok(Self::new(loader.parse()?, slug))
    }
}

/// Split a persisted artifact identifier into its generic identifier and short hash
pub fn split_artifact_identifier(identifier: &str) -> Option<(&str, &str)> {
    identifier.rsplit_once(':').filter(|(gid, _)| gid.contains(':'))
}
