//! Profile name to fingerprint resolution.
//!
//! A registry is immutable once built; resolution is a read-only map lookup
//! and needs no locking. `-auto` aliases point at the current default
//! version of each browser family.

use super::profiles::{Chrome, Edge, Firefox, Ios, Safari};
use super::{FingerprintFactory, FingerprintSpec};
use crate::base::neterror::NetError;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Immutable mapping of profile names to fingerprint specifications.
#[derive(Debug, Clone, Default)]
pub struct FingerprintRegistry {
    specs: HashMap<String, Arc<FingerprintSpec>>,
    aliases: HashMap<String, String>,
}

impl FingerprintRegistry {
    pub fn builder() -> FingerprintRegistryBuilder {
        FingerprintRegistryBuilder::default()
    }

    /// The built-in registry, created on first use.
    pub fn global() -> &'static FingerprintRegistry {
        static GLOBAL: OnceLock<FingerprintRegistry> = OnceLock::new();
        GLOBAL.get_or_init(|| FingerprintRegistry::builder().with_builtin().build())
    }

    /// Resolve a profile name or alias. Case-insensitive.
    pub fn resolve(&self, name: &str) -> Result<Arc<FingerprintSpec>, NetError> {
        let key = name.trim().to_ascii_lowercase();
        let target = self.aliases.get(&key).unwrap_or(&key);
        self.specs
            .get(target)
            .cloned()
            .ok_or_else(|| NetError::UnknownProfile(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    /// Concrete profile names, sorted.
    pub fn profile_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.specs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Alias names, sorted.
    pub fn alias_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.aliases.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Builder for [`FingerprintRegistry`].
#[derive(Debug, Default)]
#[must_use]
pub struct FingerprintRegistryBuilder {
    specs: HashMap<String, Arc<FingerprintSpec>>,
    aliases: HashMap<String, String>,
}

impl FingerprintRegistryBuilder {
    /// Register every built-in profile and the `-auto` aliases.
    pub fn with_builtin(self) -> Self {
        self.factory(Chrome::V120)
            .factory(Chrome::V124)
            .factory(Edge::V124)
            .factory(Firefox::V120)
            .factory(Firefox::V133)
            .factory(Safari::V17)
            .factory(Ios::V17)
            .alias("chrome-auto", Chrome::default().profile_name())
            .alias("edge-auto", Edge::default().profile_name())
            .alias("firefox-auto", Firefox::default().profile_name())
            .alias("safari-auto", Safari::default().profile_name())
            .alias("ios-auto", Ios::default().profile_name())
    }

    /// Register a spec under its own name, replacing any earlier one.
    pub fn register(mut self, spec: FingerprintSpec) -> Self {
        let key = spec.name.to_ascii_lowercase();
        self.specs.insert(key, Arc::new(spec));
        self
    }

    /// Register a spec under `name`, overriding the spec's own name.
    pub fn register_as(self, name: &str, mut spec: FingerprintSpec) -> Self {
        spec.name = name.to_string();
        self.register(spec)
    }

    fn factory<F: FingerprintFactory + Copy>(self, factory: F) -> Self {
        self.register_as(factory.profile_name(), factory.spec())
    }

    /// Point `alias` at `target`. Later calls override earlier ones.
    pub fn alias(mut self, alias: &str, target: &str) -> Self {
        self.aliases
            .insert(alias.to_ascii_lowercase(), target.to_ascii_lowercase());
        self
    }

    /// Finish the registry. Aliases whose target is missing are rejected.
    pub fn try_build(self) -> Result<FingerprintRegistry, NetError> {
        for (alias, target) in &self.aliases {
            if !self.specs.contains_key(target) {
                return Err(NetError::UnknownProfile(format!("{alias} -> {target}")));
            }
        }
        Ok(self.build())
    }

    pub fn build(self) -> FingerprintRegistry {
        FingerprintRegistry {
            specs: self.specs,
            aliases: self.aliases,
        }
    }
}
