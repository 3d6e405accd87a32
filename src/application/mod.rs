//! Application layer - the operator session and its workflows.
//!
//! A [`Session`] ties the package service, the override store and the
//! manifest patcher together. The CLI layer opens one per command, waits for
//! the package list and then runs a single workflow.

mod increment;
mod overrides;
mod session;

pub use overrides::{ApplyPlan, SourceChange};
pub use session::{PackageView, Session, TICK_INTERVAL};

pub(crate) use session::SessionState;
