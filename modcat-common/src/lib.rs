//! # modcat common library
//!
//! Shared code for the modcat catalog tooling:
//! - Catalog data model (records, artifacts, the catalog index)
//! - Loader enumeration and game-version ordering
//! - Content hashing and identifier normalisation
//! - Configuration loading

pub mod config;
pub mod error;
pub mod hashing;
pub mod identifier;
pub mod loader;
pub mod models;
pub mod version;

pub use error::{Error, Result};
pub use loader::Loader;
pub use models::index::IndexJson;
pub use models::manifest::{Dependencies, Links, ManifestJson, OtherLink, VersionFile};
pub use models::usage::{SourceUsage, ThirdPartySource, UsageSummary};

/// Version tag written into every record and the catalog index
pub const CURRENT_INDEX_VERSION: &str = "v5";
