//! Which third-party sources answered during one record build

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// External data source consulted while building records
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ThirdPartySource {
    CurseForge,
    Modrinth,
    GitHub,
}

impl ThirdPartySource {
    pub const ALL: [ThirdPartySource; 3] = [
        ThirdPartySource::CurseForge,
        ThirdPartySource::Modrinth,
        ThirdPartySource::GitHub,
    ];
}

impl fmt::Display for ThirdPartySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ThirdPartySource::CurseForge => "CurseForge",
            ThirdPartySource::Modrinth => "Modrinth",
            ThirdPartySource::GitHub => "GitHub",
        })
    }
}

/// Set of sources that were reached successfully
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUsage {
    used: BTreeSet<ThirdPartySource>,
}

/// Collapsed read-only view over a [`SourceUsage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageSummary {
    AllUsed,
    NoneUsed,
    Partial(BTreeSet<ThirdPartySource>),
}

impl SourceUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, source: ThirdPartySource) {
        self.used.insert(source);
    }

    pub fn contains(&self, source: ThirdPartySource) -> bool {
        self.used.contains(&source)
    }

    pub fn iter(&self) -> impl Iterator<Item = ThirdPartySource> + '_ {
        self.used.iter().copied()
    }

    /// Collapse into AllUsed / NoneUsed / Partial
    pub fn summary(&self) -> UsageSummary {
        if self.used.is_empty() {
            UsageSummary::NoneUsed
        } else if ThirdPartySource::ALL.iter().all(|s| self.used.contains(s)) {
            UsageSummary::AllUsed
        } else {
            UsageSummary::Partial(self.used.clone())
        }
    }
}

impl FromIterator<ThirdPartySource> for SourceUsage {
    fn from_iter<I: IntoIterator<Item = ThirdPartySource>>(iter: I) -> Self {
        Self {
            used: iter.into_iter().collect(),
        }
    }
}
