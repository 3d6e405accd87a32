//! Embedded packages whose version can be bumped.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::PathBuf;

use crate::runtime::Runtime;

use super::version::{SemanticVersion, VersionPart};

/// An embedded package and the version found in its `package.json`.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedPackageRecord {
    pub name: String,
    pub display_name: String,
    pub manifest_path: PathBuf,
    /// Version text exactly as written in the file.
    pub current_version: String,
    pub version: Option<SemanticVersion>,
}

impl EmbeddedPackageRecord {
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        manifest_path: PathBuf,
        current_version: impl Into<String>,
    ) -> Self {
        let current_version = current_version.into();
        Self {
            name: name.into(),
            display_name: display_name.into(),
            version: SemanticVersion::parse(&current_version),
            manifest_path,
            current_version,
        }
    }

    /// Build a record from the `package.json` at `manifest_path`.
    ///
    /// A missing or non-string `version` gives an invalid record; a missing
    /// `displayName` falls back to `display_name`.
    pub fn load<R: Runtime + ?Sized>(
        runtime: &R,
        name: &str,
        display_name: &str,
        manifest_path: PathBuf,
    ) -> Result<Self> {
        let text = runtime.read_to_string(&manifest_path)?;
        let json: Value = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse {:?}", manifest_path))?;

        let version = json.get("version").and_then(Value::as_str).unwrap_or("");
        let display_name = json
            .get("displayName")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(display_name);

        Ok(Self::new(name, display_name, manifest_path, version))
    }

    pub fn is_valid_version(&self) -> bool {
        self.version.is_some()
    }

    pub fn next_version(&self, part: VersionPart) -> Option<SemanticVersion> {
        self.version.map(|v| v.increment(part))
    }

    /// Record a version that has just been written to the file.
    pub fn set_version(&mut self, version: SemanticVersion) {
        self.current_version = version.to_string();
        self.version = Some(version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;

    #[test]
    fn test_new_parses_version() {
        let record = EmbeddedPackageRecord::new(
            "com.acme.foo",
            "Foo",
            PathBuf::from("/p/Packages/com.acme.foo/package.json"),
            "1.2.3-preview",
        );
        assert!(record.is_valid_version());
        assert_eq!(record.current_version, "1.2.3-preview");
        assert_eq!(
            record.next_version(VersionPart::Minor),
            Some(SemanticVersion::new(1, 3, 0))
        );
    }

    #[test]
    fn test_invalid_version_has_no_next() {
        let record = EmbeddedPackageRecord::new("com.acme.foo", "Foo", PathBuf::new(), "latest");
        assert!(!record.is_valid_version());
        assert_eq!(record.next_version(VersionPart::Patch), None);
    }

    #[test]
    fn test_load_reads_package_json() {
        let mut runtime = MockRuntime::new();
        runtime.expect_read_to_string().returning(|_| {
            Ok(r#"{"name": "com.acme.foo", "displayName": "Acme Foo", "version": "0.4.1"}"#.into())
        });

        let record =
            EmbeddedPackageRecord::load(&runtime, "com.acme.foo", "com.acme.foo", PathBuf::new())
                .unwrap();
        assert_eq!(record.display_name, "Acme Foo");
        assert_eq!(record.version, Some(SemanticVersion::new(0, 4, 1)));
    }

    #[test]
    fn test_load_without_version_is_invalid() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .returning(|_| Ok(r#"{"name": "com.acme.foo"}"#.into()));

        let record =
            EmbeddedPackageRecord::load(&runtime, "com.acme.foo", "Foo", PathBuf::new()).unwrap();
        assert_eq!(record.display_name, "Foo");
        assert_eq!(record.current_version, "");
        assert!(!record.is_valid_version());
    }

    #[test]
    fn test_set_version_updates_both_fields() {
        let mut record = EmbeddedPackageRecord::new("com.acme.foo", "Foo", PathBuf::new(), "1.0.0-rc");
        record.set_version(SemanticVersion::new(1, 0, 1));
        assert_eq!(record.current_version, "1.0.1");
        assert_eq!(record.version, Some(SemanticVersion::new(1, 0, 1)));
    }
}
