use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::package::VersionPart;
use crate::runtime::Runtime;

use super::{confirm, open_session, project_relative};

/// Bump the version of an embedded package.
#[tracing::instrument(skip(runtime, config))]
pub async fn increment<R: Runtime + 'static>(
    runtime: Arc<R>,
    config: &Config,
    name: &str,
    part: VersionPart,
) -> Result<()> {
    let mut session = open_session(Arc::clone(&runtime), config).await?;

    let (record, next) = session.plan_increment(name, part)?;
    if !config.yes {
        println!();
        println!("=== Version Increment Plan ===");
        println!();
        println!("Package: {} ({})", record.display_name, record.name);
        println!("File:    {}", project_relative(config, &record.manifest_path).display());
        println!("Version: {} -> {}", record.current_version, next);
        println!();
    }
    if !confirm(
        runtime.as_ref(),
        config,
        "Proceed with version increment?",
        "Increment cancelled.",
    )? {
        return Ok(());
    }

    let next = session.increment(name, part)?;
    println!("Bumped {} to {}", name, next);
    Ok(())
}
