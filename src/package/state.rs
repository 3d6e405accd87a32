//! Package state classification.

use std::fmt;

/// Where a package is currently sourced from, as far as the operator is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageState {
    /// Resolved from the registry/cache as declared in the manifest.
    PackageCache,
    /// The manifest points at a local override path.
    OverrideActive,
    /// A copy lives in the embedded package directory and is enabled.
    EmbeddedActive,
    /// A copy lives in the embedded package directory but its package.json is disabled.
    EmbeddedDisabled,
}

/// Operator actions gated by [`PackageState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Embed,
    Override,
    ClearOverride,
    RemoveEmbedded,
    EnableEmbedded,
    DisableEmbedded,
}

/// Inputs of the classifier: live filesystem facts plus stored override intent.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateInputs<'a> {
    pub is_embedded: bool,
    pub is_embedded_enabled: bool,
    pub is_overridden: bool,
    pub override_path: &'a str,
}

impl PackageState {
    /// Classify a package. First match wins:
    ///
    /// 1. embedded and enabled -> `EmbeddedActive`
    /// 2. embedded, not enabled -> `EmbeddedDisabled`
    /// 3. overridden with a non-empty path -> `OverrideActive`
    /// 4. otherwise -> `PackageCache`
    ///
    /// An embedded copy physically supersedes any manifest declaration, so
    /// embedding always outranks a stored override.
    pub fn classify(inputs: StateInputs<'_>) -> Self {
        match inputs {
            StateInputs {
                is_embedded: true,
                is_embedded_enabled: true,
                ..
            } => PackageState::EmbeddedActive,
            StateInputs {
                is_embedded: true, ..
            } => PackageState::EmbeddedDisabled,
            StateInputs {
                is_overridden: true,
                override_path,
                ..
            } if !override_path.is_empty() => PackageState::OverrideActive,
            _ => PackageState::PackageCache,
        }
    }

    /// Suffix shown next to the package name in listings.
    pub fn label(self) -> Option<&'static str> {
        match self {
            PackageState::PackageCache => None,
            PackageState::OverrideActive => Some("(Override)"),
            PackageState::EmbeddedActive => Some("(Embedded)"),
            PackageState::EmbeddedDisabled => Some("(Embedded - Disabled)"),
        }
    }

    pub fn is_embedded(self) -> bool {
        matches!(
            self,
            PackageState::EmbeddedActive | PackageState::EmbeddedDisabled
        )
    }

    pub fn allowed_actions(self) -> &'static [Action] {
        match self {
            PackageState::PackageCache => &[Action::Embed, Action::Override],
            PackageState::OverrideActive => {
                &[Action::ClearOverride, Action::Override, Action::Embed]
            }
            PackageState::EmbeddedActive => &[Action::DisableEmbedded, Action::RemoveEmbedded],
            PackageState::EmbeddedDisabled => &[Action::EnableEmbedded, Action::RemoveEmbedded],
        }
    }

    pub fn allows(self, action: Action) -> bool {
        self.allowed_actions().contains(&action)
    }
}

impl fmt::Display for PackageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PackageState::PackageCache => "sourced from the package cache",
            PackageState::OverrideActive => "overridden",
            PackageState::EmbeddedActive => "embedded",
            PackageState::EmbeddedDisabled => "embedded (disabled)",
        })
    }
}

impl Action {
    /// Command name of the action, as typed on the command line.
    pub fn command(self) -> &'static str {
        match self {
            Action::Embed => "embed",
            Action::Override => "override",
            Action::ClearOverride => "unoverride",
            Action::RemoveEmbedded => "remove-embedded",
            Action::EnableEmbedded => "enable-embedded",
            Action::DisableEmbedded => "disable-embedded",
        }
    }

    /// Phrase used in error messages ("cannot <description>").
    pub fn description(self) -> &'static str {
        match self {
            Action::Embed => "embed it",
            Action::Override => "override its source",
            Action::ClearOverride => "clear an override",
            Action::RemoveEmbedded => "remove the embedded copy",
            Action::EnableEmbedded => "enable the embedded copy",
            Action::DisableEmbedded => "disable the embedded copy",
        }
    }
}
