//! Filesystem-backed package service.
//!
//! Answers package queries from the project's own files: the dependency
//! manifest, embedded package directories and the package cache. Every call
//! runs on a blocking worker and reports through a [`Request`] handle.

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ProjectLayout;
use crate::manifest;
use crate::runtime::Runtime;

use super::{Operation, PackageDescriptor, PackageService, PackageSource, Request};

/// The subset of a `package.json` the service reads.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PackageManifest {
    display_name: Option<String>,
    version: Option<String>,
    dependencies: BTreeMap<String, Value>,
}

pub struct LocalPackageService<R: Runtime + 'static> {
    runtime: Arc<R>,
    layout: ProjectLayout,
    resolve_command: Option<String>,
}

impl<R: Runtime + 'static> LocalPackageService<R> {
    pub fn new(runtime: Arc<R>, layout: ProjectLayout, resolve_command: Option<String>) -> Self {
        Self {
            runtime,
            layout,
            resolve_command,
        }
    }

    /// Run `work` on a blocking worker and hand its outcome to the returned request.
    fn spawn<T, F>(&self, operation: Operation, work: F) -> Request<T>
    where
        T: Send + 'static,
        F: FnOnce(&R, &ProjectLayout) -> Result<T> + Send + 'static,
    {
        let (completer, request) = Request::channel(operation);
        let runtime = Arc::clone(&self.runtime);
        let layout = self.layout.clone();

        tokio::task::spawn_blocking(move || {
            let result = work(runtime.as_ref(), &layout).map_err(|e| format!("{:#}", e));
            completer.complete(result);
        });

        request
    }
}

impl<R: Runtime + 'static> PackageService for LocalPackageService<R> {
    fn list(&self, include_indirect: bool) -> Request<Vec<PackageDescriptor>> {
        self.spawn(Operation::List, move |runtime, layout| {
            list_packages(runtime, layout, include_indirect)
        })
    }

    fn embed(&self, name: &str) -> Request<()> {
        let name = name.to_string();
        self.spawn(Operation::Embed, move |runtime, layout| {
            embed_package(runtime, layout, &name)
        })
    }

    fn remove(&self, name: &str) -> Request<()> {
        let name = name.to_string();
        self.spawn(Operation::Remove, move |runtime, layout| {
            remove_package(runtime, layout, &name)
        })
    }

    fn resolve(&self) {
        let Some(command) = self.resolve_command.clone() else {
            info!("Package resolution requested");
            return;
        };

        let runtime = Arc::clone(&self.runtime);
        let root = self.layout.root.clone();
        tokio::task::spawn_blocking(move || match runtime.run_shell(&command, &root) {
            Ok(0) => info!("Resolve command '{}' finished", command),
            Ok(code) => warn!("Resolve command '{}' exited with status {}", command, code),
            Err(e) => warn!("Resolve command '{}' failed: {:#}", command, e),
        });
    }
}

/// List every package the manifest declares plus undeclared embedded ones, sorted by name.
#[tracing::instrument(skip(runtime, layout))]
pub(crate) fn list_packages<R: Runtime + ?Sized>(
    runtime: &R,
    layout: &ProjectLayout,
    include_indirect: bool,
) -> Result<Vec<PackageDescriptor>> {
    let dependencies = read_manifest_dependencies(runtime, layout)?;

    let mut packages = BTreeMap::new();
    for (name, value) in dependencies {
        let descriptor = describe(runtime, layout, &name, &value);
        packages.insert(name, descriptor);
    }

    if runtime.is_dir(&layout.packages_dir) {
        for dir in runtime.read_dir(&layout.packages_dir)? {
            let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if packages.contains_key(name) {
                continue;
            }
            // A disabled copy still belongs to the project and must stay listed.
            if !runtime.exists(&layout.embedded_manifest(name))
                && !runtime.exists(&layout.disabled_manifest(name))
            {
                continue;
            }
            debug!("Found undeclared embedded package {}", name);
            packages.insert(name.to_string(), embedded_descriptor(runtime, layout, name));
        }
    }

    if include_indirect {
        let mut indirect = BTreeMap::new();
        for descriptor in packages.values() {
            if !matches!(descriptor.source, PackageSource::Embedded | PackageSource::Local) {
                continue;
            }
            let package_json = descriptor.resolved_path.join("package.json");
            for (name, value) in read_package_manifest(runtime, &package_json).dependencies {
                let Some(version) = value.as_str() else {
                    continue;
                };
                if !packages.contains_key(&name) && !indirect.contains_key(&name) {
                    let descriptor = describe(runtime, layout, &name, version);
                    indirect.insert(name, descriptor);
                }
            }
        }
        packages.extend(indirect);
    }

    Ok(packages.into_values().collect())
}

#[tracing::instrument(skip(runtime, layout))]
pub(crate) fn embed_package<R: Runtime + ?Sized>(
    runtime: &R,
    layout: &ProjectLayout,
    name: &str,
) -> Result<()> {
    let target = layout.embedded_dir(name);
    if runtime.exists(&target) {
        bail!("{} is already embedded at {:?}", name, target);
    }

    let dependencies = read_manifest_dependencies(runtime, layout)?;
    let Some((_, value)) = dependencies.iter().find(|(dep, _)| dep == name) else {
        bail!("{} is not declared in {:?}", name, layout.manifest_path);
    };

    let descriptor = describe(runtime, layout, name, value);
    if matches!(descriptor.source, PackageSource::Git | PackageSource::BuiltIn) {
        bail!("{} cannot be embedded from source '{}'", name, value);
    }
    if !runtime.is_dir(&descriptor.resolved_path) {
        bail!(
            "package contents for {} not found at {:?}",
            name,
            descriptor.resolved_path
        );
    }

    debug!("Copying {:?} to {:?}", descriptor.resolved_path, target);
    runtime
        .copy_dir_all(&descriptor.resolved_path, &target)
        .with_context(|| format!("Failed to embed {}", name))
}

#[tracing::instrument(skip(runtime, layout))]
pub(crate) fn remove_package<R: Runtime + ?Sized>(
    runtime: &R,
    layout: &ProjectLayout,
    name: &str,
) -> Result<()> {
    let dir = layout.embedded_dir(name);
    if !runtime.is_dir(&dir) {
        bail!("{} has no embedded copy at {:?}", name, dir);
    }

    runtime
        .remove_dir_all(&dir)
        .with_context(|| format!("Failed to remove embedded copy of {}", name))
}

fn read_manifest_dependencies<R: Runtime + ?Sized>(
    runtime: &R,
    layout: &ProjectLayout,
) -> Result<Vec<(String, String)>> {
    let text = runtime
        .read_to_string(&layout.manifest_path)
        .with_context(|| format!("Failed to read manifest {:?}", layout.manifest_path))?;
    manifest::read_dependencies(&text)
        .with_context(|| format!("Failed to parse manifest {:?}", layout.manifest_path))
}

fn read_package_manifest<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> PackageManifest {
    if !runtime.exists(path) {
        return PackageManifest::default();
    }

    let parsed = runtime
        .read_to_string(path)
        .and_then(|text| serde_json::from_str::<PackageManifest>(&text).map_err(anyhow::Error::from));
    match parsed {
        Ok(manifest) => manifest,
        Err(e) => {
            warn!("Failed to read package manifest {:?}: {:#}", path, e);
            PackageManifest::default()
        }
    }
}

fn is_git_source(value: &str) -> bool {
    value.starts_with("git+")
        || value.starts_with("git@")
        || value.starts_with("ssh://")
        || value.starts_with("http://")
        || value.starts_with("https://")
        || value.ends_with(".git")
}

fn describe<R: Runtime + ?Sized>(
    runtime: &R,
    layout: &ProjectLayout,
    name: &str,
    value: &str,
) -> PackageDescriptor {
    if runtime.exists(&layout.embedded_manifest(name)) {
        return embedded_descriptor(runtime, layout, name);
    }

    if layout.is_builtin(name) {
        return PackageDescriptor {
            name: name.to_string(),
            display_name: name.to_string(),
            version: value.to_string(),
            source: PackageSource::BuiltIn,
            resolved_path: PathBuf::new(),
            package_id: format!("{}@{}", name, value),
        };
    }

    if let Some(path) = value.strip_prefix("file:") {
        let resolved_path = layout.packages_dir.join(path);
        let meta = read_package_manifest(runtime, &resolved_path.join("package.json"));
        return PackageDescriptor {
            name: name.to_string(),
            display_name: meta.display_name.unwrap_or_else(|| name.to_string()),
            version: meta.version.unwrap_or_default(),
            source: PackageSource::Local,
            package_id: format!("{}@file:{}", name, resolved_path.display()),
            resolved_path,
        };
    }

    if is_git_source(value) {
        return PackageDescriptor {
            name: name.to_string(),
            display_name: name.to_string(),
            version: value.to_string(),
            source: PackageSource::Git,
            resolved_path: PathBuf::new(),
            package_id: format!("{}@{}", name, value),
        };
    }

    let resolved_path = layout.cached_package_dir(name, value);
    let meta = read_package_manifest(runtime, &resolved_path.join("package.json"));
    PackageDescriptor {
        name: name.to_string(),
        display_name: meta.display_name.unwrap_or_else(|| name.to_string()),
        version: value.to_string(),
        source: PackageSource::Registry,
        resolved_path,
        package_id: format!("{}@{}", name, value),
    }
}

fn embedded_descriptor<R: Runtime + ?Sized>(
    runtime: &R,
    layout: &ProjectLayout,
    name: &str,
) -> PackageDescriptor {
    let resolved_path = layout.embedded_dir(name);
    let mut meta_path = layout.embedded_manifest(name);
    if !runtime.exists(&meta_path) {
        meta_path = layout.disabled_manifest(name);
    }
    let meta = read_package_manifest(runtime, &meta_path);
    PackageDescriptor {
        name: name.to_string(),
        display_name: meta.display_name.unwrap_or_else(|| name.to_string()),
        version: meta.version.unwrap_or_default(),
        source: PackageSource::Embedded,
        package_id: format!("{}@file:{}", name, resolved_path.display()),
        resolved_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use crate::service::RequestStatus;
    use std::fs;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    /// Project with a registry package (cached), an embedded package, a local
    /// package, a git package and a built-in module.
    fn project() -> (TempDir, ProjectLayout) {
        let dir = tempdir().unwrap();
        let layout = ProjectLayout::new(dir.path());

        write(
            &layout.manifest_path,
            r#"{
  "dependencies": {
    "com.acme.cached": "1.0.0",
    "com.acme.embedded": "2.0.0",
    "com.acme.local": "file:../shared/local",
    "com.acme.git": "https://git.acme.dev/git.git#v1",
    "com.unity.modules.audio": "1.0.0"
  }
}"#,
        );
        write(
            &layout.cached_package_dir("com.acme.cached", "1.0.0").join("package.json"),
            r#"{"name": "com.acme.cached", "displayName": "Cached", "version": "1.0.0"}"#,
        );
        write(
            &layout.embedded_manifest("com.acme.embedded"),
            r#"{"name": "com.acme.embedded", "displayName": "Embedded", "version": "2.1.0",
                "dependencies": {"com.acme.indirect": "0.3.0", "com.acme.cached": "1.0.0"}}"#,
        );
        write(
            &dir.path().join("shared/local/package.json"),
            r#"{"name": "com.acme.local", "version": "0.5.0"}"#,
        );
        write(
            &layout.embedded_manifest("com.acme.undeclared"),
            r#"{"name": "com.acme.undeclared", "version": "9.9.9"}"#,
        );
        write(
            &layout.disabled_manifest("com.acme.parked"),
            r#"{"name": "com.acme.parked", "displayName": "Parked", "version": "0.4.0"}"#,
        );
        // Not a package: no package.json.
        fs::create_dir_all(layout.embedded_dir("scratch")).unwrap();

        (dir, layout)
    }

    fn find<'a>(packages: &'a [PackageDescriptor], name: &str) -> &'a PackageDescriptor {
        packages.iter().find(|p| p.name == name).unwrap()
    }

    #[test]
    fn test_list_classifies_sources() {
        let (_dir, layout) = project();
        let packages = list_packages(&RealRuntime, &layout, false).unwrap();

        let names: Vec<_> = packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "com.acme.cached",
                "com.acme.embedded",
                "com.acme.git",
                "com.acme.local",
                "com.acme.parked",
                "com.acme.undeclared",
                "com.unity.modules.audio",
            ]
        );

        let cached = find(&packages, "com.acme.cached");
        assert_eq!(cached.source, PackageSource::Registry);
        assert_eq!(cached.display_name, "Cached");
        assert_eq!(cached.source_string(), "1.0.0");

        let embedded = find(&packages, "com.acme.embedded");
        assert_eq!(embedded.source, PackageSource::Embedded);
        assert_eq!(embedded.version, "2.1.0");
        assert_eq!(embedded.resolved_path, layout.embedded_dir("com.acme.embedded"));

        let local = find(&packages, "com.acme.local");
        assert_eq!(local.source, PackageSource::Local);
        assert_eq!(local.version, "0.5.0");
        assert!(local.source_string().starts_with("file:"));

        let git = find(&packages, "com.acme.git");
        assert_eq!(git.source, PackageSource::Git);
        assert_eq!(git.source_string(), "https://git.acme.dev/git.git#v1");

        assert_eq!(
            find(&packages, "com.unity.modules.audio").source,
            PackageSource::BuiltIn
        );
        assert_eq!(
            find(&packages, "com.acme.undeclared").source,
            PackageSource::Embedded
        );

        let parked = find(&packages, "com.acme.parked");
        assert_eq!(parked.source, PackageSource::Embedded);
        assert_eq!(parked.display_name, "Parked");
        assert_eq!(parked.version, "0.4.0");
    }

    #[test]
    fn test_list_with_indirect_adds_dependencies_of_embedded() {
        let (_dir, layout) = project();
        let direct = list_packages(&RealRuntime, &layout, false).unwrap();
        let all = list_packages(&RealRuntime, &layout, true).unwrap();

        assert_eq!(all.len(), direct.len() + 1);
        let indirect = find(&all, "com.acme.indirect");
        assert_eq!(indirect.source, PackageSource::Registry);
        assert_eq!(indirect.version, "0.3.0");
    }

    #[test]
    fn test_list_without_manifest_fails() {
        let dir = tempdir().unwrap();
        let layout = ProjectLayout::new(dir.path());
        let err = list_packages(&RealRuntime, &layout, false).unwrap_err();
        assert!(format!("{:#}", err).contains("manifest"));
    }

    #[test]
    fn test_embed_copies_cached_package() {
        let (_dir, layout) = project();
        embed_package(&RealRuntime, &layout, "com.acme.cached").unwrap();

        let copied = fs::read_to_string(layout.embedded_manifest("com.acme.cached")).unwrap();
        assert!(copied.contains("\"displayName\": \"Cached\""));
    }

    #[test]
    fn test_embed_rejects_already_embedded_and_missing_sources() {
        let (_dir, layout) = project();

        let err = embed_package(&RealRuntime, &layout, "com.acme.embedded").unwrap_err();
        assert!(err.to_string().contains("already embedded"));

        let err = embed_package(&RealRuntime, &layout, "com.acme.git").unwrap_err();
        assert!(err.to_string().contains("cannot be embedded"));

        let err = embed_package(&RealRuntime, &layout, "com.acme.unknown").unwrap_err();
        assert!(err.to_string().contains("not declared"));

        fs::remove_dir_all(layout.cached_package_dir("com.acme.cached", "1.0.0")).unwrap();
        let err = embed_package(&RealRuntime, &layout, "com.acme.cached").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_remove_deletes_embedded_copy() {
        let (_dir, layout) = project();
        remove_package(&RealRuntime, &layout, "com.acme.embedded").unwrap();
        assert!(!layout.embedded_dir("com.acme.embedded").exists());

        let err = remove_package(&RealRuntime, &layout, "com.acme.embedded").unwrap_err();
        assert!(err.to_string().contains("no embedded copy"));
    }

    async fn wait<T>(mut request: Request<T>) -> RequestStatus<T> {
        for _ in 0..500 {
            match request.poll() {
                RequestStatus::InProgress => tokio::time::sleep(Duration::from_millis(10)).await,
                status => return status,
            }
        }
        panic!("request did not complete");
    }

    #[tokio::test]
    async fn test_service_reports_through_requests() {
        let (_dir, layout) = project();
        let service = LocalPackageService::new(Arc::new(RealRuntime), layout.clone(), None);

        match wait(service.list(false)).await {
            RequestStatus::Success(packages) => assert_eq!(packages.len(), 7),
            other => panic!("unexpected status {:?}", other),
        }

        assert_eq!(wait(service.embed("com.acme.cached")).await, RequestStatus::Success(()));
        assert!(matches!(
            wait(service.embed("com.acme.cached")).await,
            RequestStatus::Failure(message) if message.contains("already embedded")
        ));
        assert_eq!(wait(service.remove("com.acme.cached")).await, RequestStatus::Success(()));
    }

    #[tokio::test]
    async fn test_resolve_without_command_is_a_no_op() {
        let (_dir, layout) = project();
        let service = LocalPackageService::new(Arc::new(RealRuntime), layout, None);
        service.resolve();
    }
}
