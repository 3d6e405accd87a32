//! Runtime abstraction for system operations.
//!
//! This module provides a trait-based abstraction over system operations,
//! enabling dependency injection and testability.
//!
//! # Structure
//!
//! - `env` - Process environment (working directory, shell commands)
//! - `fs` - File system operations (read, write, rename, directory copy)
//! - `user` - User interaction (confirmation prompts)

mod env;
mod fs;
mod user;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

#[cfg_attr(test, mockall::automock)]
pub trait Runtime: Send + Sync {
    // File System
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn remove_file(&self, path: &Path) -> Result<()>;
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Recursively copy the directory tree at `from` into `to`.
    /// `to` is created if missing; existing files are overwritten.
    fn copy_dir_all(&self, from: &Path, to: &Path) -> Result<()>;

    // Process
    fn current_dir(&self) -> Result<PathBuf>;
    /// Run `command` through the platform shell in `dir` and return its exit code.
    fn run_shell(&self, command: &str, dir: &Path) -> Result<i32>;

    // User interaction
    /// Prompt user for confirmation. Returns true if user confirms (y/yes), false otherwise.
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

pub struct RealRuntime;

impl Runtime for RealRuntime {
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.write_impl(path, contents)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.read_to_string_impl(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.rename_impl(from, to)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.create_dir_all_impl(path)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.remove_file_impl(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.remove_dir_all_impl(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.exists_impl(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.is_dir_impl(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        self.read_dir_impl(path)
    }

    fn copy_dir_all(&self, from: &Path, to: &Path) -> Result<()> {
        self.copy_dir_all_impl(from, to)
    }

    fn current_dir(&self) -> Result<PathBuf> {
        self.current_dir_impl()
    }

    fn run_shell(&self, command: &str, dir: &Path) -> Result<i32> {
        self.run_shell_impl(command, dir)
    }

    fn confirm(&self, prompt: &str) -> Result<bool> {
        self.confirm_impl(prompt)
    }
}

/// Path of the scratch file used by [`write_replace`] for `path`.
///
/// Returns: `<path>.tmp` (e.g. `manifest.json.tmp`)
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `contents` to `path` by writing a sibling temp file and renaming it
/// over the target, so a crash never leaves a truncated file behind.
#[tracing::instrument(skip(runtime, contents))]
pub fn write_replace<R: Runtime + ?Sized>(runtime: &R, path: &Path, contents: &[u8]) -> Result<()> {
    let tmp_path = temp_path_for(path);
    runtime
        .write(&tmp_path, contents)
        .with_context(|| format!("Failed to write {:?}", tmp_path))?;
    if let Err(e) = runtime.rename(&tmp_path, path) {
        let _ = runtime.remove_file(&tmp_path);
        return Err(e).with_context(|| format!("Failed to replace {:?}", path));
    }
    Ok(())
}
