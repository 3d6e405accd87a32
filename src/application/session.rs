use anyhow::Result;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ProjectLayout;
use crate::error::PackageError;
use crate::package::{
    EmbeddedPackageRecord, OverrideEntry, OverrideStore, PackageObservation, PackageState,
    StateInputs,
};
use crate::runtime::Runtime;
use crate::service::{Operation, PackageDescriptor, PackageService, PackageSource};
use crate::tracker::OperationTracker;

/// Delay between two polls of pending package operations.
pub const TICK_INTERVAL: Duration = Duration::from_millis(10);

/// A live package joined with its stored override entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageView {
    pub descriptor: PackageDescriptor,
    pub entry: OverrideEntry,
    pub state: PackageState,
}

impl PackageView {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// State mutated by completion callbacks. Only touched between ticks.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) snapshot: Vec<PackageDescriptor>,
    pub(crate) embedded: Vec<EmbeddedPackageRecord>,
    pub(crate) store: OverrideStore,
    /// Raw list result waiting to be turned into a snapshot on the next tick.
    pub(crate) incoming: Option<Vec<PackageDescriptor>>,
    pub(crate) loading: bool,
    pub(crate) unsaved: bool,
    pub(crate) save_requested: bool,
    pub(crate) refresh_requested: bool,
}

/// One operator session over a project's packages.
///
/// Owns the live package snapshot, the embedded package records, the
/// override store and the queue of in-flight service requests. Nothing here
/// is shared: callers drive progress with [`tick`](Self::tick) or
/// [`settle`](Self::settle).
pub struct Session<R: Runtime, S: PackageService> {
    pub(super) runtime: Arc<R>,
    pub(super) service: S,
    pub(super) layout: ProjectLayout,
    pub(super) state: SessionState,
    pub(super) tracker: OperationTracker<SessionState>,
}

impl<R: Runtime, S: PackageService> Session<R, S> {
    /// Open a session and load the override store. No packages are listed
    /// until [`request_refresh`](Self::request_refresh).
    pub fn new(runtime: Arc<R>, service: S, layout: ProjectLayout) -> Self {
        let store = OverrideStore::load(runtime.as_ref(), &layout.settings_path);
        Self {
            runtime,
            service,
            layout,
            state: SessionState {
                store,
                ..Default::default()
            },
            tracker: OperationTracker::new(),
        }
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    /// Ask the service for the current package list. Ignored while a list is in flight.
    pub fn request_refresh(&mut self) {
        if self.state.loading {
            debug!("Refresh already in progress");
            return;
        }

        self.state.loading = true;
        let request = self.service.list(false);
        self.tracker.track(request, |state: &mut SessionState, packages| {
            state.incoming = Some(packages);
        });
    }

    /// Poll pending requests once and process whatever they delivered.
    ///
    /// Returns the errors raised this tick: failed service operations and
    /// failed settings writes.
    pub fn tick(&mut self) -> Vec<PackageError> {
        let mut errors = Vec::new();

        for failure in self.tracker.tick(&mut self.state) {
            if failure.operation == Operation::List {
                self.state.loading = false;
            }
            errors.push(failure.into());
        }

        if let Some(packages) = self.state.incoming.take() {
            self.apply_snapshot(packages);
        }

        if self.state.save_requested {
            self.state.save_requested = false;
            if let Err(e) = self.save_settings() {
                warn!("{:#}", e);
                match e.downcast::<PackageError>() {
                    Ok(err) => errors.push(err),
                    Err(e) => errors.push(PackageError::io(
                        "write",
                        &self.layout.settings_path,
                        &e,
                    )),
                }
            }
        }

        if self.state.refresh_requested {
            self.state.refresh_requested = false;
            self.request_refresh();
        }

        errors
    }

    /// Tick until no request is pending or `timeout` elapses.
    ///
    /// Fails with the first error seen. On timeout the pending requests are
    /// dropped without running their callbacks.
    pub async fn settle(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut first_error = None;

        loop {
            for err in self.tick() {
                first_error.get_or_insert(err);
            }
            if self.tracker.is_idle() {
                break;
            }
            if Instant::now() >= deadline {
                let pending = self.tracker.len();
                self.close();
                return Err(PackageError::TimedOut {
                    pending,
                    seconds: timeout.as_secs(),
                }
                .into());
            }
            tokio::time::sleep(TICK_INTERVAL).await;
        }

        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Drop all pending requests without side effects.
    pub fn close(&mut self) {
        self.tracker.clear();
        self.state.loading = false;
        self.state.incoming = None;
        self.state.refresh_requested = false;
    }

    pub fn is_loading(&self) -> bool {
        self.state.loading
    }

    /// True when override intent changed since the manifest was last applied.
    pub fn has_unsaved_changes(&self) -> bool {
        self.state.unsaved
    }

    pub fn store(&self) -> &OverrideStore {
        &self.state.store
    }

    /// Live, non-built-in packages sorted by name.
    pub fn packages(&self) -> Vec<PackageView> {
        self.state
            .snapshot
            .iter()
            .filter(|d| !self.layout.is_builtin(&d.name))
            .map(|d| self.view_of(d))
            .collect()
    }

    pub fn package_view(&self, name: &str) -> Result<PackageView, PackageError> {
        self.state
            .snapshot
            .iter()
            .find(|d| d.name == name && !self.layout.is_builtin(&d.name))
            .map(|d| self.view_of(d))
            .ok_or_else(|| PackageError::UnknownPackage(name.to_string()))
    }

    pub fn embedded_packages(&self) -> &[EmbeddedPackageRecord] {
        &self.state.embedded
    }

    /// Persist the override store.
    pub fn save_settings(&self) -> Result<()> {
        let path = &self.layout.settings_path;
        self.state
            .store
            .save(self.runtime.as_ref(), path)
            .map_err(|e| PackageError::io("write", path, &e).into())
    }

    /// Change the entry of `name` and persist the store.
    ///
    /// The change is made on a copy; the session only adopts it once the
    /// settings file has been written.
    pub(super) fn commit_entry(
        &mut self,
        name: &str,
        update: impl FnOnce(&mut OverrideEntry),
    ) -> Result<()> {
        let mut store = self.state.store.clone();
        update(store.get_or_create(name));

        let path = &self.layout.settings_path;
        store
            .save(self.runtime.as_ref(), path)
            .map_err(|e| PackageError::io("write", path, &e))?;
        self.state.store = store;
        Ok(())
    }

    fn view_of(&self, descriptor: &PackageDescriptor) -> PackageView {
        let entry = self
            .state
            .store
            .get(&descriptor.name)
            .cloned()
            .unwrap_or_else(|| OverrideEntry::new(&descriptor.name));
        let state = PackageState::classify(StateInputs {
            is_embedded: entry.is_embedded,
            is_embedded_enabled: entry.is_embedded_enabled,
            is_overridden: entry.is_overridden,
            override_path: &entry.override_path,
        });
        PackageView {
            descriptor: descriptor.clone(),
            entry,
            state,
        }
    }

    fn apply_snapshot(&mut self, mut packages: Vec<PackageDescriptor>) {
        let runtime = self.runtime.as_ref();
        packages.sort_by(|a, b| a.name.cmp(&b.name));
        info!("Loaded {} package(s)", packages.len());

        let mut embedded = Vec::new();
        for descriptor in packages
            .iter()
            .filter(|d| d.source == PackageSource::Embedded)
        {
            let manifest_path = descriptor.resolved_path.join("package.json");
            if !runtime.exists(&manifest_path) {
                if runtime.exists(&self.layout.disabled_manifest(&descriptor.name)) {
                    debug!("Embedded package {} is disabled", descriptor.name);
                    continue;
                }
                warn!(
                    "Embedded package {} has no package.json at {:?}",
                    descriptor.name, manifest_path
                );
                continue;
            }
            match EmbeddedPackageRecord::load(
                runtime,
                &descriptor.name,
                &descriptor.display_name,
                manifest_path,
            ) {
                Ok(record) => {
                    if !record.is_valid_version() {
                        warn!(
                            "{}",
                            PackageError::InvalidVersion {
                                package: record.name.clone(),
                                version: record.current_version.clone(),
                            }
                        );
                    }
                    embedded.push(record);
                }
                Err(e) => warn!("Skipping embedded package {}: {:#}", descriptor.name, e),
            }
        }
        embedded.sort_by(|a, b| a.name.cmp(&b.name));

        let observations: Vec<PackageObservation> = packages
            .iter()
            .filter(|d| !self.layout.is_builtin(&d.name))
            .map(|d| PackageObservation {
                name: d.name.clone(),
                current_source: (d.source != PackageSource::Embedded).then(|| d.source_string()),
                is_embedded: d.source == PackageSource::Embedded
                    || runtime.exists(&self.layout.disabled_manifest(&d.name)),
                is_embedded_enabled: runtime.exists(&self.layout.embedded_manifest(&d.name)),
            })
            .collect();

        if self.state.store.reconcile(&observations) {
            self.state.save_requested = true;
        }

        self.state.snapshot = packages;
        self.state.embedded = embedded;
        self.state.loading = false;
    }
}
