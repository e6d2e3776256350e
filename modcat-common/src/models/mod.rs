//! Catalog data model

pub mod index;
pub mod manifest;
pub mod usage;
