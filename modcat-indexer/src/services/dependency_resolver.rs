//! Dependency edge resolution
//!
//! A declared dependency becomes a `<loader>:<slug>` edge only if the
//! dependency itself ships an artifact for the same loader. Quilt artifacts
//! may also depend on Fabric-only packages. Anything else is dropped so the
//! catalog never holds a dangling reference.
//!
//! Lookups are memoised for the lifetime of the resolver (one index run).

use modcat_common::identifier::slugify;
use modcat_common::{Dependencies, Loader};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::services::registry::{DeclaredDependency, DependencyRelation, PackageRef, Registry};

#[derive(Default)]
pub struct DependencyResolver {
    slugs: Mutex<HashMap<PackageRef, Option<String>>>,
    availability: Mutex<HashMap<(PackageRef, Loader), bool>>,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every declared dependency of one artifact
    pub async fn resolve_all(
        &self,
        registry: &dyn Registry,
        declared: &[DeclaredDependency],
        loader: Loader,
    ) -> Dependencies {
        let mut dependencies = Dependencies::default();
        for dependency in declared {
            let Some(identifier) = self.resolve(registry, &dependency.package, loader).await else {
                tracing::debug!(
                    dependency = %dependency.package,
                    loader = %loader,
                    "Dropping unresolvable dependency edge"
                );
                continue;
            };
            match dependency.relation {
                DependencyRelation::Required => dependencies.required.insert(identifier),
                DependencyRelation::Incompatible => dependencies.incompatible.insert(identifier),
            };
        }
        dependencies
    }

    /// Generic identifier of `dependency` as seen from an artifact for `loader`
    pub async fn resolve(
        &self,
        registry: &dyn Registry,
        dependency: &PackageRef,
        loader: Loader,
    ) -> Option<String> {
        if dependency.source() != registry.source() {
            return None;
        }

        let slug = self.slug_of(registry, dependency).await?;

        if self.has_artifacts(registry, dependency, loader).await {
            return Some(format!("{loader}:{slug}"));
        }

        let fallback = loader.compatibility_fallback()?;
        if self.has_artifacts(registry, dependency, fallback).await {
            return Some(format!("{fallback}:{slug}"));
        }

        None
    }

    async fn slug_of(&self, registry: &dyn Registry, dependency: &PackageRef) -> Option<String> {
        let cached = self.lock_slugs().get(dependency).cloned();
        if let Some(cached) = cached {
            return cached;
        }

        let slug = match registry.package_metadata(dependency).await {
            Ok(Some(metadata)) => slugify(&metadata.display_name).ok(),
            Ok(None) => None,
            Err(e) => {
                // Transient failures are not cached so a later artifact can retry
                tracing::debug!(dependency = %dependency, error = %e, "Dependency metadata lookup failed");
                return None;
            }
        };

        self.lock_slugs().insert(dependency.clone(), slug.clone());
        slug
    }

    async fn has_artifacts(
        &self,
        registry: &dyn Registry,
        dependency: &PackageRef,
        loader: Loader,
    ) -> bool {
        let key = (dependency.clone(), loader);
        let cached = self.lock_availability().get(&key).copied();
        if let Some(cached) = cached {
            return cached;
        }

        let available = match registry.list_artifacts(dependency, loader).await {
            Ok(artifacts) => !artifacts.is_empty(),
            Err(e) if e.is_not_found() => false,
            Err(e) => {
                tracing::debug!(dependency = %dependency, loader = %loader, error = %e, "Dependency artifact lookup failed");
                return false;
            }
        };

        self.lock_availability().insert(key, available);
        available
    }

    fn lock_slugs(&self) -> std::sync::MutexGuard<'_, HashMap<PackageRef, Option<String>>> {
        self.slugs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_availability(&self) -> std::sync::MutexGuard<'_, HashMap<(PackageRef, Loader), bool>> {
        self.availability.lock().unwrap_or_else(|e| e.into_inner())
    }
}
