//! Mod loaders tracked by the catalog

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Runtime variant an artifact is built for
///
/// `Any` is a query sentinel used by registries that accept "no loader filter";
/// it never names a record bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Loader {
    Any,
    Forge,
    Fabric,
    Quilt,
    Liteloader,
    Rift,
}

impl Loader {
    /// Loaders that can own a record, in processing order
    pub const SUPPORTED: [Loader; 5] = [
        Loader::Forge,
        Loader::Fabric,
        Loader::Quilt,
        Loader::Liteloader,
        Loader::Rift,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Loader::Any => "any",
            Loader::Forge => "forge",
            Loader::Fabric => "fabric",
            Loader::Quilt => "quilt",
            Loader::Liteloader => "liteloader",
            Loader::Rift => "rift",
        }
    }

    /// Loader whose artifacts this loader's runtime also accepts
    ///
    /// Quilt runs Fabric mods.
    pub fn compatibility_fallback(&self) -> Option<Loader> {
        match self {
            Loader::Quilt => Some(Loader::Fabric),
            _ => None,
        }
    }

    /// True if `token` names a supported loader (case-insensitive)
    ///
    /// Registries sometimes list loader names among the game versions of a file.
    pub fn is_loader_name(token: &str) -> bool {
        token
            .parse::<Loader>()
            .map(|loader| loader != Loader::Any)
            .unwrap_or(false)
    }
}

impl fmt::Display for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Loader {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(Loader::Any),
            "forge" => Ok(Loader::Forge),
            "fabric" => Ok(Loader::Fabric),
            "quilt" => Ok(Loader::Quilt),
            "liteloader" => Ok(Loader::Liteloader),
            "rift" => Ok(Loader::Rift),
            other => Err(Error::InvalidInput(format!("unknown loader: {other}"))),
        }
    }
}
