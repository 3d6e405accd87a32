//! Source override workflows: intent changes, embedding and manifest apply.

use anyhow::{Result, bail};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::PackageError;
use crate::manifest::{patch_package_source_field, read_dependencies};
use crate::package::{Action, OverrideEntry, PackageState};
use crate::runtime::{Runtime, write_replace};
use crate::service::PackageService;

use super::{PackageView, Session, SessionState};

/// One dependency source rewrite performed by `apply`.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceChange {
    pub package: String,
    pub from: String,
    pub to: String,
}

/// What `apply` would do to the manifest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyPlan {
    pub changes: Vec<SourceChange>,
    /// Packages with intent to apply but no key in the manifest.
    pub missing: Vec<String>,
}

impl ApplyPlan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Manifest source that realizes the stored intent of `entry`, if any.
fn target_source(entry: &OverrideEntry) -> Option<String> {
    if entry.is_overridden && !entry.override_path.is_empty() {
        Some(format!("file:{}", entry.override_path.replace('\\', "/")))
    } else if !entry.is_overridden && !entry.original_source.is_empty() {
        Some(entry.original_source.clone())
    } else {
        None
    }
}

impl<R: Runtime, S: PackageService> Session<R, S> {
    /// The view of `name`, if its current state allows `action`.
    pub fn check_action(&self, name: &str, action: Action) -> Result<PackageView> {
        let view = self.package_view(name)?;
        if !view.state.allows(action) {
            return Err(PackageError::InvalidState {
                package: name.to_string(),
                state: view.state,
                action: action.description(),
            }
            .into());
        }
        Ok(view)
    }

    /// Record intent to source `name` from the local directory `path`.
    ///
    /// The manifest is untouched until [`apply`](Self::apply).
    #[tracing::instrument(skip(self))]
    pub fn set_override(&mut self, name: &str, path: &str) -> Result<()> {
        self.check_action(name, Action::Override)?;
        let path = path.trim();
        if path.is_empty() {
            bail!("override path for {} is empty", name);
        }
        // Manifest values are patched as plain string contents.
        if path.contains('"') {
            bail!("override path for {} must not contain '\"'", name);
        }
        if !self.runtime.exists(&Path::new(path).join("package.json")) {
            warn!("No package.json found in override path {}", path);
        }

        self.commit_entry(name, |entry| {
            entry.override_path = path.to_string();
            entry.is_overridden = true;
        })?;
        self.state.unsaved = true;
        Ok(())
    }

    /// Record intent to return `name` to its original source. The override path is kept.
    #[tracing::instrument(skip(self))]
    pub fn clear_override(&mut self, name: &str) -> Result<()> {
        self.check_action(name, Action::ClearOverride)?;

        self.commit_entry(name, |entry| entry.is_overridden = false)?;
        self.state.unsaved = true;
        Ok(())
    }

    /// Ask the service to embed `name`. Completes on a later tick.
    #[tracing::instrument(skip(self))]
    pub fn embed(&mut self, name: &str) -> Result<()> {
        self.check_action(name, Action::Embed)?;

        let package = name.to_string();
        let request = self.service.embed(name);
        self.tracker.track(request, move |state: &mut SessionState, ()| {
            info!("Embedded {}", package);
            let entry = state.store.get_or_create(&package);
            entry.is_embedded = true;
            entry.is_embedded_enabled = true;
            state.save_requested = true;
            state.refresh_requested = true;
        });
        Ok(())
    }

    /// Ask the service to delete the embedded copy of `name`. Completes on a later tick.
    #[tracing::instrument(skip(self))]
    pub fn remove_embedded(&mut self, name: &str) -> Result<()> {
        self.check_action(name, Action::RemoveEmbedded)?;

        let package = name.to_string();
        let request = self.service.remove(name);
        self.tracker.track(request, move |state: &mut SessionState, ()| {
            info!("Removed embedded copy of {}", package);
            let entry = state.store.get_or_create(&package);
            entry.is_embedded = false;
            entry.is_embedded_enabled = false;
            state.save_requested = true;
            state.refresh_requested = true;
        });
        Ok(())
    }

    /// Restore `package.json` from its disabled sentinel.
    #[tracing::instrument(skip(self))]
    pub fn enable_embedded(&mut self, name: &str) -> Result<()> {
        self.check_action(name, Action::EnableEmbedded)?;
        self.toggle_embedded(name, true)
    }

    /// Rename `package.json` to its disabled sentinel so the host ignores the copy.
    #[tracing::instrument(skip(self))]
    pub fn disable_embedded(&mut self, name: &str) -> Result<()> {
        self.check_action(name, Action::DisableEmbedded)?;
        self.toggle_embedded(name, false)
    }

    fn toggle_embedded(&mut self, name: &str, enable: bool) -> Result<()> {
        let enabled = self.layout.embedded_manifest(name);
        let disabled = self.layout.disabled_manifest(name);
        let (from, to) = if enable {
            (disabled, enabled)
        } else {
            (enabled, disabled)
        };

        let runtime = self.runtime.as_ref();
        if !runtime.exists(&from) {
            let artifact = from
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Err(PackageError::not_found(artifact, &self.layout.embedded_dir(name)).into());
        }
        runtime
            .rename(&from, &to)
            .map_err(|e| PackageError::io("rename", &from, &e))?;
        debug!("Renamed {:?} to {:?}", from, to);

        if let Err(e) = self.commit_entry(name, |entry| {
            entry.is_embedded = true;
            entry.is_embedded_enabled = enable;
        }) {
            if let Err(undo) = self.runtime.rename(&to, &from) {
                warn!("Failed to restore {:?}: {:#}", from, undo);
            }
            return Err(e);
        }

        self.service.resolve();
        self.request_refresh();
        Ok(())
    }

    /// Write `version` as the manifest source of `name` and remember it as the original source.
    #[tracing::instrument(skip(self))]
    pub fn set_source_version(&mut self, name: &str, version: &str) -> Result<()> {
        let version = version.trim();
        if version.is_empty() {
            return Err(PackageError::EmptyVersion(name.to_string()).into());
        }
        self.package_view(name)?;

        let path = self.layout.manifest_path.clone();
        let runtime = self.runtime.as_ref();
        let text = runtime
            .read_to_string(&path)
            .map_err(|e| PackageError::io("read", &path, &e))?;
        let patched = patch_package_source_field(&text, name, version)
            .ok_or_else(|| PackageError::not_found(format!("dependency {}", name), &path))?;
        write_replace(runtime, &path, patched.as_bytes())
            .map_err(|e| PackageError::io("write", &path, &e))?;

        let committed =
            self.commit_entry(name, |entry| entry.original_source = version.to_string());
        if let Err(e) = committed {
            if let Err(undo) = write_replace(self.runtime.as_ref(), &path, text.as_bytes()) {
                warn!("Failed to restore {:?}: {:#}", path, undo);
            }
            return Err(e);
        }
        info!("Set source of {} to {}", name, version);

        self.service.resolve();
        self.request_refresh();
        Ok(())
    }

    /// Compute the manifest changes `apply` would make, from the manifest as it is now.
    pub fn plan_apply(&self) -> Result<ApplyPlan> {
        let text = self.read_manifest()?;
        self.build_apply_plan(&text)
    }

    /// Rewrite manifest sources to match the stored intent of every live package.
    ///
    /// Packages whose embedded copy is active are left alone. The manifest is
    /// only written when at least one source changes; the store is always
    /// saved and a refresh queued.
    #[tracing::instrument(skip(self))]
    pub fn apply(&mut self) -> Result<ApplyPlan> {
        let path = self.layout.manifest_path.clone();
        let text = self.read_manifest()?;
        let plan = self.build_apply_plan(&text)?;

        if !plan.is_empty() {
            let mut patched = text;
            for change in &plan.changes {
                patched = patch_package_source_field(&patched, &change.package, &change.to)
                    .ok_or_else(|| {
                        PackageError::not_found(format!("dependency {}", change.package), &path)
                    })?;
            }
            write_replace(self.runtime.as_ref(), &path, patched.as_bytes())
                .map_err(|e| PackageError::io("write", &path, &e))?;
            info!("Updated {} source(s) in {:?}", plan.changes.len(), path);
        } else {
            debug!("Manifest already matches override settings");
        }

        self.save_settings()?;
        self.service.resolve();
        self.state.unsaved = false;
        self.request_refresh();
        Ok(plan)
    }

    fn read_manifest(&self) -> Result<String> {
        let path = &self.layout.manifest_path;
        self.runtime
            .read_to_string(path)
            .map_err(|e| PackageError::io("read", path, &e).into())
    }

    fn build_apply_plan(&self, text: &str) -> Result<ApplyPlan> {
        let declared: BTreeMap<String, String> = read_dependencies(text)
            .map_err(|e| PackageError::io("parse", &self.layout.manifest_path, &e))?
            .into_iter()
            .collect();

        let mut plan = ApplyPlan::default();
        for view in self.packages() {
            if view.state == PackageState::EmbeddedActive {
                continue;
            }
            let Some(to) = target_source(&view.entry) else {
                continue;
            };
            match declared.get(view.name()) {
                Some(from) if *from == to => {}
                Some(from) => plan.changes.push(SourceChange {
                    package: view.name().to_string(),
                    from: from.clone(),
                    to,
                }),
                None => {
                    warn!(
                        "{} is not declared in {:?}; skipping",
                        view.name(),
                        self.layout.manifest_path
                    );
                    plan.missing.push(view.name().to_string());
                }
            }
        }
        Ok(plan)
    }
}
