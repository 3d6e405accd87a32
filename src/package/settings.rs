//! Persisted per-package override intent.
//!
//! The store is a single JSON document (`{"entries": [...]}`) kept next to
//! the project's user settings. Field names are camelCase so files written
//! by earlier tooling load unchanged. Deleting the file is always safe; it is
//! rebuilt from the live package list on the next refresh.

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::runtime::{Runtime, write_replace};

/// Override intent and last observed embedding facts for one package.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct OverrideEntry {
    pub package_name: String,
    /// Manifest source captured before any override; restored by `apply`.
    pub original_source: String,
    pub override_path: String,
    pub is_overridden: bool,
    pub is_embedded: bool,
    pub is_embedded_enabled: bool,
}

impl OverrideEntry {
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            ..Default::default()
        }
    }
}

/// What a refresh learned about one live package.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageObservation {
    pub name: String,
    /// Source string currently in effect; `None` when the package is served
    /// from an embedded copy and so has no manifest source worth remembering.
    pub current_source: Option<String>,
    pub is_embedded: bool,
    pub is_embedded_enabled: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct OverrideStore {
    entries: Vec<OverrideEntry>,
}

impl OverrideStore {
    /// Load the store from `path`. A missing file is an empty store.
    #[tracing::instrument(skip(runtime))]
    pub fn try_load<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> Result<Self> {
        if !runtime.exists(path) {
            debug!("No override settings at {:?}", path);
            return Ok(Self::default());
        }

        let content = runtime.read_to_string(path)?;
        let store: OverrideStore = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse override settings {:?}", path))?;
        debug!("Loaded {} override entries from {:?}", store.entries.len(), path);
        Ok(store)
    }

    /// Like [`try_load`](Self::try_load), but an unreadable file is logged and
    /// treated as empty.
    pub fn load<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> Self {
        Self::try_load(runtime, path).unwrap_or_else(|e| {
            warn!("Ignoring override settings {:?}: {:#}", path, e);
            Self::default()
        })
    }

    #[tracing::instrument(skip(self, runtime))]
    pub fn save<R: Runtime + ?Sized>(&self, runtime: &R, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !runtime.exists(parent)
        {
            runtime.create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        write_replace(runtime, path, content.as_bytes())
            .with_context(|| format!("Failed to save override settings to {:?}", path))
    }

    /// Entry for `name`, appended with empty values if absent.
    pub fn get_or_create(&mut self, name: &str) -> &mut OverrideEntry {
        let index = match self.entries.iter().position(|e| e.package_name == name) {
            Some(index) => index,
            None => {
                self.entries.push(OverrideEntry::new(name));
                self.entries.len() - 1
            }
        };
        &mut self.entries[index]
    }

    pub fn get(&self, name: &str) -> Option<&OverrideEntry> {
        self.entries.iter().find(|e| e.package_name == name)
    }

    pub fn entries(&self) -> &[OverrideEntry] {
        &self.entries
    }

    /// Bring stored entries in line with a fresh observation of the live packages.
    ///
    /// Every observed package gets an entry; an empty `original_source` is
    /// stamped from the current source. Embedding facts are rewritten for all
    /// entries, and entries with no live package are marked not embedded.
    /// Returns true when anything changed.
    pub fn reconcile(&mut self, observations: &[PackageObservation]) -> bool {
        let before = self.clone();

        for observed in observations {
            let entry = self.get_or_create(&observed.name);
            if entry.original_source.is_empty()
                && let Some(source) = &observed.current_source
            {
                debug!("Recording original source of {}: {}", observed.name, source);
                entry.original_source = source.clone();
            }
        }

        for entry in &mut self.entries {
            let observed = observations.iter().find(|o| o.name == entry.package_name);
            entry.is_embedded = observed.is_some_and(|o| o.is_embedded);
            entry.is_embedded_enabled = observed.is_some_and(|o| o.is_embedded_enabled);
        }

        *self != before
    }
}
