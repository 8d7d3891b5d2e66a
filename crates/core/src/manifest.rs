//! Manifest types and the JSON wire format.
//!
//! A [`Manifest`] describes one deployable application: an ordered graph of
//! compiled modules keyed by id, the entry module, and any signatures the
//! publisher attached. It is a value type: the constructor either yields a
//! manifest whose module iteration order is topological, or fails.

use crate::digest::Digest;
use crate::topo::{is_topologically_sorted, topological_sort};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a module within a manifest (e.g. "alpha").
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    /// Create a module id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModuleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleId({})", self.0)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single compiled module entry in a manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    /// Absolute or manifest-relative URL of the compiled bytecode blob.
    pub url: String,
    /// Expected SHA-256 of the blob.
    pub sha256: Digest,
    /// Ids of modules that must be linked before this one.
    #[serde(default)]
    pub depends_on_ids: Vec<ModuleId>,
}

/// An immutable, topologically-sorted description of an application's
/// module graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Manifest {
    modules: IndexMap<ModuleId, Module>,
    main_module_id: ModuleId,
    main_function: Option<String>,
    signatures: IndexMap<String, String>,
}

impl Manifest {
    /// Build a manifest from a possibly-unsorted module mapping.
    ///
    /// Modules are reordered into a topological order stable with respect
    /// to the input; an input that is already sorted is kept as-is. Fails
    /// with [`Error::MalformedManifest`] on an unknown dependency id, a
    /// self-dependency or cycle, an absent `main_module_id`, or an empty
    /// module set.
    ///
    /// [`Error::MalformedManifest`]: crate::Error::MalformedManifest
    pub fn new(
        modules: IndexMap<ModuleId, Module>,
        main_module_id: Option<ModuleId>,
        main_function: Option<String>,
        signatures: IndexMap<String, String>,
    ) -> crate::Result<Self> {
        for (id, module) in &modules {
            for dep in &module.depends_on_ids {
                if dep == id {
                    return Err(crate::Error::MalformedManifest(format!(
                        "module '{id}' depends on itself"
                    )));
                }
                if !modules.contains_key(dep) {
                    return Err(crate::Error::MalformedManifest(format!(
                        "module '{id}' depends on unknown module '{dep}'"
                    )));
                }
            }
        }

        let ids: Vec<ModuleId> = modules.keys().cloned().collect();
        let deps_of = |id: &ModuleId| modules[id].depends_on_ids.clone();
        let sorted_ids = if is_topologically_sorted(&ids, deps_of) {
            ids
        } else {
            topological_sort(&ids, deps_of).ok_or_else(|| {
                crate::Error::MalformedManifest("dependency graph contains a cycle".to_string())
            })?
        };

        let mut modules = modules;
        let mut sorted = IndexMap::with_capacity(sorted_ids.len());
        for id in sorted_ids {
            if let Some(module) = modules.shift_remove(&id) {
                sorted.insert(id, module);
            }
        }

        let Some(last_id) = sorted.keys().next_back().cloned() else {
            return Err(crate::Error::MalformedManifest(
                "manifest contains no modules".to_string(),
            ));
        };
        let main_module_id = match main_module_id {
            Some(id) => {
                if !sorted.contains_key(&id) {
                    return Err(crate::Error::MalformedManifest(format!(
                        "main module '{id}' is not in the manifest"
                    )));
                }
                id
            }
            None => last_id,
        };

        Ok(Self {
            modules: sorted,
            main_module_id,
            main_function,
            signatures,
        })
    }

    /// The module mapping, iterating in topological order.
    pub fn modules(&self) -> &IndexMap<ModuleId, Module> {
        &self.modules
    }

    /// The entry module id.
    pub fn main_module_id(&self) -> &ModuleId {
        &self.main_module_id
    }

    /// Fully-qualified entry point, if the publisher declared one.
    pub fn main_function(&self) -> Option<&str> {
        self.main_function.as_deref()
    }

    /// Signatures by signing-key name, in preference order.
    pub fn signatures(&self) -> &IndexMap<String, String> {
        &self.signatures
    }

    /// Parse a manifest from its JSON wire format.
    ///
    /// The wire format requires modules to already be in dependency order;
    /// out-of-order input is rejected rather than re-sorted so that a
    /// parsed manifest iterates exactly as published.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let wire: ManifestWire = serde_json::from_str(json)
            .map_err(|e| crate::Error::MalformedManifest(e.to_string()))?;

        // Unknown dependency ids are caught by the constructor below; the
        // order predicate skips them.
        let ids: Vec<ModuleId> = wire.modules.keys().cloned().collect();
        let deps_of = |id: &ModuleId| wire.modules[id].depends_on_ids.clone();
        if !is_topologically_sorted(&ids, deps_of) {
            return Err(crate::Error::MalformedManifest(
                "modules are not in dependency order".to_string(),
            ));
        }

        Self::new(
            wire.modules,
            wire.main_module_id,
            wire.main_function,
            wire.signatures,
        )
    }

    /// Serialize to the JSON wire format, modules in topological order.
    pub fn to_json(&self) -> crate::Result<String> {
        let wire = ManifestWire {
            modules: self.modules.clone(),
            main_module_id: Some(self.main_module_id.clone()),
            main_function: self.main_function.clone(),
            signatures: self.signatures.clone(),
        };
        serde_json::to_string_pretty(&wire)
            .map_err(|e| crate::Error::Serialization(e.to_string()))
    }
}

/// Wire shape of the manifest JSON.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestWire {
    modules: IndexMap<ModuleId, Module>,
    #[serde(default)]
    main_module_id: Option<ModuleId>,
    #[serde(default)]
    main_function: Option<String>,
    #[serde(default)]
    signatures: IndexMap<String, String>,
}
