//! Project layout and run configuration.

use anyhow::Result;
use log::debug;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::runtime::Runtime;

/// Name prefixes of packages that ship with the host and are never managed.
pub const BUILTIN_PREFIXES: &[&str] = &["com.unity.modules."];

/// How long to wait for package operations when nothing else is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const PACKAGES_DIR: &str = "Packages";
const MANIFEST_FILE: &str = "manifest.json";
const PACKAGE_MANIFEST_FILE: &str = "package.json";
const DISABLED_MANIFEST_FILE: &str = "package.json.disabled";
const SETTINGS_FILE: &str = "UserSettings/PackageOverrides.json";
const CACHE_DIR: &str = "Library/PackageCache";

/// Where everything lives inside a project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub packages_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub settings_path: PathBuf,
    pub cache_dir: PathBuf,
    pub builtin_prefixes: Vec<String>,
}

impl ProjectLayout {
    /// Default layout under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let packages_dir = root.join(PACKAGES_DIR);
        Self {
            manifest_path: packages_dir.join(MANIFEST_FILE),
            settings_path: root.join(SETTINGS_FILE),
            cache_dir: root.join(CACHE_DIR),
            builtin_prefixes: BUILTIN_PREFIXES.iter().map(|p| p.to_string()).collect(),
            packages_dir,
            root,
        }
    }

    /// Use a different settings file. Relative paths are taken from the project root.
    pub fn with_settings_path(mut self, path: impl AsRef<Path>) -> Self {
        self.settings_path = self.root.join(path);
        self
    }

    /// Use a different package cache. Relative paths are taken from the project root.
    pub fn with_cache_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.cache_dir = self.root.join(path);
        self
    }

    /// Returns: `<root>/Packages/<name>`
    pub fn embedded_dir(&self, name: &str) -> PathBuf {
        self.packages_dir.join(name)
    }

    /// Returns: `<root>/Packages/<name>/package.json`
    pub fn embedded_manifest(&self, name: &str) -> PathBuf {
        self.embedded_dir(name).join(PACKAGE_MANIFEST_FILE)
    }

    /// Returns: `<root>/Packages/<name>/package.json.disabled`
    pub fn disabled_manifest(&self, name: &str) -> PathBuf {
        self.embedded_dir(name).join(DISABLED_MANIFEST_FILE)
    }

    /// Returns: `<cache_dir>/<name>@<version>`
    pub fn cached_package_dir(&self, name: &str, version: &str) -> PathBuf {
        self.cache_dir.join(format!("{}@{}", name, version))
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtin_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
    }
}

/// Everything a command needs besides the runtime.
#[derive(Debug, Clone)]
pub struct Config {
    pub layout: ProjectLayout,
    pub resolve_command: Option<String>,
    pub timeout: Duration,
    pub yes: bool,
}

/// Raw option values, as given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    pub project: Option<PathBuf>,
    pub settings: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub resolve_command: Option<String>,
    pub timeout_secs: Option<u64>,
    pub yes: bool,
}

impl Config {
    /// Resolve options against the current directory.
    pub fn new<R: Runtime + ?Sized>(runtime: &R, options: ConfigOptions) -> Result<Self> {
        let cwd = runtime.current_dir()?;
        let root = match options.project {
            Some(project) => cwd.join(project),
            None => cwd,
        };
        debug!("Using project root {:?}", root);

        let mut layout = ProjectLayout::new(root);
        if let Some(settings) = options.settings {
            layout = layout.with_settings_path(settings);
        }
        if let Some(cache_dir) = options.cache_dir {
            layout = layout.with_cache_dir(cache_dir);
        }

        Ok(Self {
            layout,
            resolve_command: options
                .resolve_command
                .filter(|command| !command.trim().is_empty()),
            timeout: Duration::from_secs(options.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            yes: options.yes,
        })
    }
}
