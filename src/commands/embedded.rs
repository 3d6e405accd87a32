use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::package::Action;
use crate::runtime::Runtime;

use super::{confirm, open_session, project_relative};

/// Copy a package into `Packages/<name>`.
#[tracing::instrument(skip(runtime, config))]
pub async fn embed<R: Runtime + 'static>(runtime: Arc<R>, config: &Config, name: &str) -> Result<()> {
    let mut session = open_session(Arc::clone(&runtime), config).await?;
    let view = session.check_action(name, Action::Embed)?;
    let target = config.layout.embedded_dir(name);

    if !config.yes {
        println!();
        println!("=== Embed Plan ===");
        println!();
        println!("Package: {} {}", name, view.descriptor.version);
        println!("Copy:");
        println!("  [NEW] {}", project_relative(config, &target).display());
        println!("  from  {}", view.descriptor.resolved_path.display());
        println!();
    }
    if !confirm(runtime.as_ref(), config, "Proceed with embedding?", "Embed cancelled.")? {
        return Ok(());
    }

    session.embed(name)?;
    session.settle(config.timeout).await?;
    println!("Embedded {} into {}", name, target.display());
    Ok(())
}

/// Delete the embedded copy of a package.
#[tracing::instrument(skip(runtime, config))]
pub async fn remove_embedded<R: Runtime + 'static>(
    runtime: Arc<R>,
    config: &Config,
    name: &str,
) -> Result<()> {
    let mut session = open_session(Arc::clone(&runtime), config).await?;
    session.check_action(name, Action::RemoveEmbedded)?;
    let target = config.layout.embedded_dir(name);

    if !config.yes {
        println!();
        println!("=== Removal Plan ===");
        println!();
        println!("Package: {}", name);
        println!();
        println!("Directories to remove:");
        println!("  [DEL] {}", project_relative(config, &target).display());
        println!();
    }
    if !confirm(runtime.as_ref(), config, "Proceed with removal?", "Removal cancelled.")? {
        return Ok(());
    }

    session.remove_embedded(name)?;
    session.settle(config.timeout).await?;
    println!("Removed embedded copy of {}", name);
    Ok(())
}

/// Turn a disabled embedded copy back on.
#[tracing::instrument(skip(runtime, config))]
pub async fn enable_embedded<R: Runtime + 'static>(
    runtime: Arc<R>,
    config: &Config,
    name: &str,
) -> Result<()> {
    toggle(runtime, config, name, true).await
}

/// Hide an embedded copy from the host without deleting it.
#[tracing::instrument(skip(runtime, config))]
pub async fn disable_embedded<R: Runtime + 'static>(
    runtime: Arc<R>,
    config: &Config,
    name: &str,
) -> Result<()> {
    toggle(runtime, config, name, false).await
}

async fn toggle<R: Runtime + 'static>(
    runtime: Arc<R>,
    config: &Config,
    name: &str,
    enable: bool,
) -> Result<()> {
    let mut session = open_session(Arc::clone(&runtime), config).await?;
    let (action, verb) = if enable {
        (Action::EnableEmbedded, "Enable")
    } else {
        (Action::DisableEmbedded, "Disable")
    };
    session.check_action(name, action)?;

    let enabled = config.layout.embedded_manifest(name);
    let disabled = config.layout.disabled_manifest(name);
    let (from, to) = if enable {
        (&disabled, &enabled)
    } else {
        (&enabled, &disabled)
    };

    if !config.yes {
        println!();
        println!("=== {} Plan ===", verb);
        println!();
        println!("Package: {}", name);
        println!("Rename:");
        println!("  {}", project_relative(config, from).display());
        println!("  -> {}", project_relative(config, to).display());
        println!();
    }
    if !confirm(
        runtime.as_ref(),
        config,
        &format!("Proceed with {}?", action.command()),
        &format!("{} cancelled.", verb),
    )? {
        return Ok(());
    }

    if enable {
        session.enable_embedded(name)?;
        println!("Enabled embedded copy of {}", name);
    } else {
        session.disable_embedded(name)?;
        println!("Disabled embedded copy of {}", name);
    }
    Ok(())
}
