use anyhow::Result;
use log::debug;
use std::sync::Arc;

use crate::application::PackageView;
use crate::config::Config;
use crate::package::{EmbeddedPackageRecord, PackageState, VersionPart};
use crate::runtime::Runtime;

use super::open_session;

/// List packages, or only embedded packages with their next versions.
#[tracing::instrument(skip(runtime, config))]
pub async fn list<R: Runtime + 'static>(
    runtime: Arc<R>,
    config: &Config,
    filter: Option<&str>,
    embedded_only: bool,
) -> Result<()> {
    let session = open_session(runtime, config).await?;
    let filter = filter.map(str::to_lowercase);
    let is_match = |name: &str, display_name: &str| match &filter {
        Some(f) => name.to_lowercase().contains(f) || display_name.to_lowercase().contains(f),
        None => true,
    };

    if embedded_only {
        let records: Vec<_> = session
            .embedded_packages()
            .iter()
            .filter(|r| is_match(&r.name, &r.display_name))
            .collect();
        debug!("{} embedded package(s) match", records.len());
        if records.is_empty() {
            println!("No embedded packages found.");
        }
        for record in records {
            println!("{}", format_embedded_line(record));
        }
        return Ok(());
    }

    let packages: Vec<_> = session
        .packages()
        .into_iter()
        .filter(|p| is_match(&p.descriptor.name, &p.descriptor.display_name))
        .collect();
    debug!("{} package(s) match", packages.len());
    if packages.is_empty() {
        println!("No packages found.");
    }
    for view in &packages {
        println!("{}", format_package_line(view));
    }
    Ok(())
}

/// `<name> <version> [label] [-> override]`
pub(crate) fn format_package_line(view: &PackageView) -> String {
    let mut line = format!("{} {}", view.descriptor.name, view.descriptor.version);
    if let Some(label) = view.state.label() {
        line.push(' ');
        line.push_str(label);
    }
    if view.state == PackageState::OverrideActive {
        line.push_str(" -> ");
        line.push_str(&view.entry.override_path);
    }
    line
}

/// `<name> <version> (patch: x, minor: y, major: z)`
pub(crate) fn format_embedded_line(record: &EmbeddedPackageRecord) -> String {
    let version = if record.current_version.is_empty() {
        "(no version)"
    } else {
        record.current_version.as_str()
    };

    if !record.is_valid_version() {
        return format!("{} {} (invalid version)", record.name, version);
    }

    let previews: Vec<String> = [VersionPart::Patch, VersionPart::Minor, VersionPart::Major]
        .into_iter()
        .filter_map(|part| Some(format!("{}: {}", part, record.next_version(part)?)))
        .collect();
    format!("{} {} ({})", record.name, version, previews.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::OverrideEntry;
    use crate::runtime::RealRuntime;
    use crate::service::PackageSource;
    use crate::test_utils::{descriptor, temp_project};
    use std::path::PathBuf;

    fn view(state: PackageState, override_path: &str) -> PackageView {
        PackageView {
            descriptor: descriptor("com.acme.foo", "1.0.0", PackageSource::Registry),
            entry: OverrideEntry {
                override_path: override_path.into(),
                ..OverrideEntry::new("com.acme.foo")
            },
            state,
        }
    }

    #[test]
    fn test_format_package_line() {
        assert_eq!(
            format_package_line(&view(PackageState::PackageCache, "")),
            "com.acme.foo 1.0.0"
        );
        assert_eq!(
            format_package_line(&view(PackageState::OverrideActive, "/src/foo")),
            "com.acme.foo 1.0.0 (Override) -> /src/foo"
        );
        assert_eq!(
            format_package_line(&view(PackageState::EmbeddedDisabled, "")),
            "com.acme.foo 1.0.0 (Embedded - Disabled)"
        );
    }

    #[test]
    fn test_format_embedded_line() {
        let record = EmbeddedPackageRecord::new("com.acme.emb", "Emb", PathBuf::new(), "1.2.3");
        assert_eq!(
            format_embedded_line(&record),
            "com.acme.emb 1.2.3 (patch: 1.2.4, minor: 1.3.0, major: 2.0.0)"
        );

        let record = EmbeddedPackageRecord::new("com.acme.emb", "Emb", PathBuf::new(), "");
        assert_eq!(
            format_embedded_line(&record),
            "com.acme.emb (no version) (invalid version)"
        );
    }

    #[tokio::test]
    async fn test_list_runs_against_project() {
        let (_dir, config) = temp_project();
        list(Arc::new(RealRuntime), &config, None, false).await.unwrap();
        list(Arc::new(RealRuntime), &config, Some("EMB"), true).await.unwrap();
    }
}
