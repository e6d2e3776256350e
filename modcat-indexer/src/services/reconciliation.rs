//! Review classification of freshly built records
//!
//! Compares the record just built for a package/loader with the one already
//! published and decides whether the change can be published unattended.
//!
//! | Situation | Outcome |
//! |---|---|
//! | new record, identifier free | `ApprovedUpdate` |
//! | new record, identifier taken | `CreationConflict` |
//! | record vanished, a relevant registry failed | `SourceFailure` |
//! | record vanished, registries answered | `MarkedForRemoval` |
//! | identical | `NoChange` |
//! | changed while a relevant registry failed | `SourceFailure` |
//! | exactly one of artifacts/author/license/links changed | `ApprovedUpdate` |
//! | only identifier/display name changed, new identifier free | `ApprovedIdentifierRename` |
//! | anything else | `UpdateConflict` |

use modcat_common::{IndexJson, ManifestJson, SourceUsage, ThirdPartySource};
use std::collections::BTreeSet;
use std::fmt;

/// Review state of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReviewState {
    NoChange,
    ApprovedUpdate,
    ApprovedIdentifierRename,
    MarkedForRemoval,
    SourceFailure,
    CreationConflict,
    UpdateConflict,
}

impl ReviewState {
    /// Needs a human before it can be published
    pub fn is_conflict(&self) -> bool {
        matches!(self, ReviewState::CreationConflict | ReviewState::UpdateConflict)
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReviewState::NoChange => "no change",
            ReviewState::ApprovedUpdate => "approved update",
            ReviewState::ApprovedIdentifierRename => "approved identifier rename",
            ReviewState::MarkedForRemoval => "marked for removal",
            ReviewState::SourceFailure => "source failure",
            ReviewState::CreationConflict => "creation conflict",
            ReviewState::UpdateConflict => "update conflict",
        })
    }
}

/// A classified pair of (latest, original) records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewOutcome {
    pub state: ReviewState,
    pub latest: Option<ManifestJson>,
    pub original: Option<ManifestJson>,
}

impl ReviewOutcome {
    fn new(state: ReviewState, latest: Option<ManifestJson>, original: Option<ManifestJson>) -> Self {
        Self {
            state,
            latest,
            original,
        }
    }

    /// Generic identifier the outcome is about (latest first)
    pub fn generic_identifier(&self) -> Option<&str> {
        self.latest
            .as_ref()
            .or(self.original.as_ref())
            .map(|r| r.generic_identifier.as_str())
    }

    /// Human approval of a conflict, publishing the latest record
    pub fn resolve_as_update(mut self) -> Self {
        self.state = ReviewState::ApprovedUpdate;
        self
    }
}

/// Field classes compared between two records
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldClass {
    IndexVersion,
    GenericIdentifier,
    DisplayName,
    Author,
    License,
    SourceIds,
    Links,
    Artifacts,
}

/// Every field class in which `a` and `b` differ
pub fn differing_fields(a: &ManifestJson, b: &ManifestJson) -> BTreeSet<FieldClass> {
    let mut fields = BTreeSet::new();
    if a.index_version != b.index_version {
        fields.insert(FieldClass::IndexVersion);
    }
    if a.generic_identifier != b.generic_identifier {
        fields.insert(FieldClass::GenericIdentifier);
    }
    if a.display_name != b.display_name {
        fields.insert(FieldClass::DisplayName);
    }
    if a.author != b.author {
        fields.insert(FieldClass::Author);
    }
    if a.license != b.license {
        fields.insert(FieldClass::License);
    }
    if a.curse_forge_id != b.curse_forge_id || a.modrinth_id != b.modrinth_id {
        fields.insert(FieldClass::SourceIds);
    }
    if a.links != b.links {
        fields.insert(FieldClass::Links);
    }
    if a.files != b.files {
        fields.insert(FieldClass::Artifacts);
    }
    fields
}

const AUTO_TRUSTED: [FieldClass; 4] = [
    FieldClass::Artifacts,
    FieldClass::Author,
    FieldClass::License,
    FieldClass::Links,
];

const IDENTITY: [FieldClass; 2] = [FieldClass::GenericIdentifier, FieldClass::DisplayName];

/// Classify `latest` against `original`
///
/// `usage` is the source usage of the build that produced `latest`; `catalog`
/// is the run's view of published identifiers. Returns `None` only when both
/// records are absent.
pub fn reconcile(
    latest: Option<ManifestJson>,
    original: Option<ManifestJson>,
    usage: &SourceUsage,
    catalog: &IndexJson,
) -> Option<ReviewOutcome> {
    let Some(original) = original else {
        let latest = latest?;
        let state = if catalog.contains_generic_identifier(&latest.generic_identifier) {
            ReviewState::CreationConflict
        } else {
            ReviewState::ApprovedUpdate
        };
        return Some(ReviewOutcome::new(state, Some(latest), None));
    };

    let Some(latest) = latest else {
        let state = if relevant_source_failed(&original, usage) {
            ReviewState::SourceFailure
        } else {
            ReviewState::MarkedForRemoval
        };
        return Some(ReviewOutcome::new(state, None, Some(original)));
    };

    if latest == original {
        return Some(ReviewOutcome::new(ReviewState::NoChange, Some(latest), Some(original)));
    }

    // A partial build must not overwrite what the failed registry contributed
    if relevant_source_failed(&original, usage) {
        return Some(ReviewOutcome::new(ReviewState::SourceFailure, Some(latest), Some(original)));
    }

    let changed = differing_fields(&latest, &original);

    let state = if changed.len() == 1 && changed.iter().all(|f| AUTO_TRUSTED.contains(f)) {
        ReviewState::ApprovedUpdate
    } else if changed.iter().all(|f| IDENTITY.contains(f))
        && !catalog.contains_generic_identifier(&latest.generic_identifier)
    {
        ReviewState::ApprovedIdentifierRename
    } else {
        ReviewState::UpdateConflict
    };

    Some(ReviewOutcome::new(state, Some(latest), Some(original)))
}

/// True if a registry the original record came from did not answer
fn relevant_source_failed(original: &ManifestJson, usage: &SourceUsage) -> bool {
    (original.curse_forge_id.is_some() && !usage.contains(ThirdPartySource::CurseForge))
        || (original.modrinth_id.is_some() && !usage.contains(ThirdPartySource::Modrinth))
}
