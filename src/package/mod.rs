//! Package model
//!
//! Versions, embedded package records, state classification and the
//! persisted override store.

mod embedded;
mod settings;
mod state;
mod version;

pub use embedded::EmbeddedPackageRecord;
pub use settings::{OverrideEntry, OverrideStore, PackageObservation};
pub use state::{Action, PackageState, StateInputs};
pub use version::{SemanticVersion, VersionPart};
