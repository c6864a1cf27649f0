//! Platform-independent deployment reconciliation primitives.
//!
//! This crate owns the change-set contract, the per-function provisioning
//! chain (package, role, policy, deploy) and the engine that settles every
//! item of a run. It intentionally excludes AWS SDK and process concerns;
//! remote calls go through the traits in [`platform`].

pub mod config;
pub mod contract;
pub mod deploy;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod packaging;
pub mod platform;
pub mod provision;
pub mod report;
pub mod retry;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use config::SyncConfig;
pub use contract::{ChangeSet, DeployedFunction, FunctionName, OperationOutcome};
pub use engine::Reconciler;
pub use error::{DeployError, PlatformError, PlatformErrorKind};
pub use report::RunReport;
