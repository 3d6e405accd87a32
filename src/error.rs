//! Error kinds surfaced by package workflows.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::package::PackageState;
use crate::service::Operation;

/// Errors reported to the operator by package workflows.
///
/// Workflows return these wrapped in [`anyhow::Error`]; callers that need to
/// react to a specific kind use `downcast_ref::<PackageError>()`.
#[derive(Debug, Error)]
pub enum PackageError {
    /// The version text of a package is not `major.minor.patch`.
    #[error("invalid version '{version}' for {package}: expected semantic versioning (e.g. 1.2.3)")]
    InvalidVersion { package: String, version: String },

    /// A field, key or file the operation depends on does not exist.
    #[error("{artifact} not found in {}", location.display())]
    NotFound { artifact: String, location: PathBuf },

    /// Reading or writing a file failed. Nothing was written.
    #[error("failed to {action} {}: {message}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        message: String,
    },

    /// The package service completed an operation with a failure status.
    #[error("package operation '{operation}' failed: {message}")]
    Service { operation: Operation, message: String },

    #[error("package {0} is not in the current package list")]
    UnknownPackage(String),

    #[error("{package} is {state}; cannot {action}")]
    InvalidState {
        package: String,
        state: PackageState,
        action: &'static str,
    },

    #[error("no version given for {0}")]
    EmptyVersion(String),

    #[error("timed out after {seconds}s waiting for {pending} package operation(s)")]
    TimedOut { pending: usize, seconds: u64 },
}

impl PackageError {
    pub fn not_found(artifact: impl Into<String>, location: &Path) -> Self {
        PackageError::NotFound {
            artifact: artifact.into(),
            location: location.to_path_buf(),
        }
    }

    pub fn io(action: &'static str, path: &Path, err: &anyhow::Error) -> Self {
        PackageError::Io {
            action,
            path: path.to_path_buf(),
            message: format!("{:#}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_names_the_missing_artifact() {
        let err = PackageError::not_found("version field", Path::new("Packages/foo/package.json"));
        assert_eq!(
            err.to_string(),
            "version field not found in Packages/foo/package.json"
        );
    }

    #[test]
    fn test_io_keeps_underlying_message() {
        let cause = anyhow::anyhow!("disk full").context("Failed to write to file");
        let err = PackageError::io("write", Path::new("Packages/manifest.json"), &cause);
        assert_eq!(
            err.to_string(),
            "failed to write Packages/manifest.json: Failed to write to file: disk full"
        );
    }

    #[test]
    fn test_service_error_carries_service_message() {
        let err = PackageError::Service {
            operation: Operation::Embed,
            message: "package not in cache".into(),
        };
        assert_eq!(
            err.to_string(),
            "package operation 'embed' failed: package not in cache"
        );
    }

    #[test]
    fn test_invalid_state_message() {
        let err = PackageError::InvalidState {
            package: "com.acme.foo".into(),
            state: PackageState::EmbeddedActive,
            action: "enable the embedded copy",
        };
        assert_eq!(
            err.to_string(),
            "com.acme.foo is embedded; cannot enable the embedded copy"
        );
    }
}
