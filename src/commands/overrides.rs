use anyhow::Result;
use log::debug;
use std::path::Path;
use std::sync::Arc;

use crate::application::ApplyPlan;
use crate::config::Config;
use crate::package::Action;
use crate::runtime::Runtime;

use super::{LocalSession, confirm, open_session, project_relative};

/// Point a package at a local directory.
#[tracing::instrument(skip(runtime, config))]
pub async fn set_override<R: Runtime + 'static>(
    runtime: Arc<R>,
    config: &Config,
    name: &str,
    path: &str,
    apply_now: bool,
) -> Result<()> {
    let mut session = open_session(Arc::clone(&runtime), config).await?;
    let view = session.check_action(name, Action::Override)?;

    // Relative paths are taken from where the command runs, not from Packages/.
    let path = if Path::new(path).is_relative() {
        runtime.current_dir()?.join(path).display().to_string()
    } else {
        path.to_string()
    };
    debug!("Override path for {}: {}", name, path);

    if !config.yes {
        println!();
        println!("=== Override Plan ===");
        println!();
        println!("Package:  {}", name);
        println!("Current:  {}", view.descriptor.source_string());
        println!("Override: {}", path);
        if apply_now {
            println!(
                "The manifest {} will be updated.",
                project_relative(config, &config.layout.manifest_path).display()
            );
        }
        println!();
    }
    if !confirm(runtime.as_ref(), config, "Proceed with override?", "Override cancelled.")? {
        return Ok(());
    }

    session.set_override(name, &path)?;
    println!("Override for {} set to {}", name, path);
    finish(&mut session, apply_now)
}

/// Return a package to the source it had before any override.
#[tracing::instrument(skip(runtime, config))]
pub async fn clear_override<R: Runtime + 'static>(
    runtime: Arc<R>,
    config: &Config,
    name: &str,
    apply_now: bool,
) -> Result<()> {
    let mut session = open_session(Arc::clone(&runtime), config).await?;
    let view = session.check_action(name, Action::ClearOverride)?;

    if !config.yes {
        println!();
        println!("=== Clear Override Plan ===");
        println!();
        println!("Package:  {}", name);
        println!("Override: {}", view.entry.override_path);
        if view.entry.original_source.is_empty() {
            println!("Restore:  (no original source recorded)");
        } else {
            println!("Restore:  {}", view.entry.original_source);
        }
        println!();
    }
    if !confirm(
        runtime.as_ref(),
        config,
        "Proceed with clearing the override?",
        "Clear override cancelled.",
    )? {
        return Ok(());
    }

    session.clear_override(name)?;
    println!("Override for {} cleared", name);
    finish(&mut session, apply_now)
}

/// Write a registry version straight into the manifest.
#[tracing::instrument(skip(runtime, config))]
pub async fn set_source_version<R: Runtime + 'static>(
    runtime: Arc<R>,
    config: &Config,
    name: &str,
    version: &str,
) -> Result<()> {
    let mut session = open_session(Arc::clone(&runtime), config).await?;
    let view = session.package_view(name)?;

    if !config.yes {
        println!();
        println!("=== Source Version Plan ===");
        println!();
        println!("Package:  {}", name);
        println!(
            "Manifest: {}",
            project_relative(config, &config.layout.manifest_path).display()
        );
        println!("Source:   {} -> {}", view.descriptor.source_string(), version.trim());
        println!();
    }
    if !confirm(
        runtime.as_ref(),
        config,
        "Proceed with source change?",
        "Source change cancelled.",
    )? {
        return Ok(());
    }

    session.set_source_version(name, version)?;
    println!("Source of {} set to {}", name, version.trim());
    Ok(())
}

/// Rewrite manifest sources to match the stored overrides.
#[tracing::instrument(skip(runtime, config))]
pub async fn apply<R: Runtime + 'static>(runtime: Arc<R>, config: &Config) -> Result<()> {
    let mut session = open_session(Arc::clone(&runtime), config).await?;
    let plan = session.plan_apply()?;

    if plan.is_empty() {
        print_missing(&plan);
        println!("Manifest already matches the override settings.");
        return Ok(());
    }

    if !config.yes {
        show_apply_plan(config, &plan);
    }
    if !confirm(
        runtime.as_ref(),
        config,
        "Apply these changes?",
        "Apply cancelled.",
    )? {
        return Ok(());
    }

    report_applied(&session.apply()?);
    Ok(())
}

fn finish<R: Runtime + 'static>(session: &mut LocalSession<R>, apply_now: bool) -> Result<()> {
    if apply_now {
        report_applied(&session.apply()?);
    } else {
        println!("Run 'pkgctl apply' to update the manifest.");
    }
    Ok(())
}

fn show_apply_plan(config: &Config, plan: &ApplyPlan) {
    println!();
    println!("=== Apply Plan ===");
    println!();
    println!(
        "Manifest: {}",
        project_relative(config, &config.layout.manifest_path).display()
    );
    println!();
    println!("Sources to change:");
    for change in &plan.changes {
        println!("  {}: {} -> {}", change.package, change.from, change.to);
    }
    print_missing(plan);
    println!();
}

fn print_missing(plan: &ApplyPlan) {
    if plan.missing.is_empty() {
        return;
    }
    println!("Not declared in the manifest (skipped):");
    for name in &plan.missing {
        println!("  {}", name);
    }
}

fn report_applied(plan: &ApplyPlan) {
    for change in &plan.changes {
        println!("{}: {} -> {}", change.package, change.from, change.to);
    }
    println!("Updated {} package source(s).", plan.changes.len());
}
