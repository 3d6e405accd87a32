use anyhow::Result;
use log::info;

use crate::error::PackageError;
use crate::manifest::{patch_version_field, read_version_field};
use crate::package::{EmbeddedPackageRecord, SemanticVersion, VersionPart};
use crate::runtime::{Runtime, write_replace};
use crate::service::PackageService;

use super::Session;

impl<R: Runtime, S: PackageService> Session<R, S> {
    /// The embedded package `name` and the version it would get.
    pub fn plan_increment(
        &self,
        name: &str,
        part: VersionPart,
    ) -> Result<(&EmbeddedPackageRecord, SemanticVersion)> {
        let Some(record) = self.state.embedded.iter().find(|r| r.name == name) else {
            let view = self.package_view(name)?;
            return Err(PackageError::InvalidState {
                package: name.to_string(),
                state: view.state,
                action: "increment its version",
            }
            .into());
        };

        let next = record
            .next_version(part)
            .ok_or_else(|| PackageError::InvalidVersion {
                package: record.name.clone(),
                version: record.current_version.clone(),
            })?;
        Ok((record, next))
    }

    /// Bump the version in the embedded package's `package.json`.
    ///
    /// The file is re-read and the bump is computed from the version it holds
    /// now; only its first `version` value is replaced. On success the record
    /// is updated and dependency resolution requested.
    #[tracing::instrument(skip(self))]
    pub fn increment(&mut self, name: &str, part: VersionPart) -> Result<SemanticVersion> {
        let (record, _) = self.plan_increment(name, part)?;
        let path = record.manifest_path.clone();

        let runtime = self.runtime.as_ref();
        let text = runtime
            .read_to_string(&path)
            .map_err(|e| PackageError::io("read", &path, &e))?;
        let old = read_version_field(&text)
            .ok_or_else(|| PackageError::not_found("version field", &path))?
            .to_string();
        let next = SemanticVersion::parse(&old)
            .ok_or_else(|| PackageError::InvalidVersion {
                package: name.to_string(),
                version: old.clone(),
            })?
            .increment(part);
        let patched = patch_version_field(&text, &next.to_string())
            .ok_or_else(|| PackageError::not_found("version field", &path))?;
        write_replace(runtime, &path, patched.as_bytes())
            .map_err(|e| PackageError::io("write", &path, &e))?;

        if let Some(record) = self.state.embedded.iter_mut().find(|r| r.name == name) {
            record.set_version(next);
        }
        info!("Bumped {} from {} to {}", name, old, next);

        self.service.resolve();
        Ok(next)
    }
}
