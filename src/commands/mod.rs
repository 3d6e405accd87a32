//! Command handlers behind the `pkgctl` subcommands.
//!
//! Every handler opens a [`Session`] on the project, waits for the package
//! list, shows what it is about to change and asks for confirmation unless
//! `--yes` was given.

use anyhow::Result;
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::application::Session;
use crate::config::Config;
use crate::runtime::Runtime;
use crate::service::LocalPackageService;

mod embedded;
mod increment;
mod list;
mod overrides;

pub use embedded::{disable_embedded, embed, enable_embedded, remove_embedded};
pub use increment::increment;
pub use list::list;
pub use overrides::{apply, clear_override, set_override, set_source_version};

pub(crate) type LocalSession<R> = Session<R, LocalPackageService<R>>;

/// Open a session on the configured project and wait for the package list.
pub(crate) async fn open_session<R: Runtime + 'static>(
    runtime: Arc<R>,
    config: &Config,
) -> Result<LocalSession<R>> {
    debug!("Opening project {:?}", config.layout.root);
    let service = LocalPackageService::new(
        Arc::clone(&runtime),
        config.layout.clone(),
        config.resolve_command.clone(),
    );
    let mut session = Session::new(runtime, service, config.layout.clone());
    session.request_refresh();
    session.settle(config.timeout).await?;
    Ok(session)
}

/// Ask `prompt` unless `--yes` was given. Prints `cancelled` when declined.
pub(crate) fn confirm<R: Runtime + ?Sized>(
    runtime: &R,
    config: &Config,
    prompt: &str,
    cancelled: &str,
) -> Result<bool> {
    if config.yes {
        return Ok(true);
    }
    if runtime.confirm(prompt)? {
        return Ok(true);
    }
    println!("{}", cancelled);
    Ok(false)
}

/// Display `path` relative to the project root when it lies inside it.
pub(crate) fn project_relative(config: &Config, path: &Path) -> PathBuf {
    path.strip_prefix(&config.layout.root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}
