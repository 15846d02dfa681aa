//! Credential provisioning for the token broker client.
//!
//! Makes an issued credential usable by later steps of the job: exported
//! as environment variables, or configured as git's credential for the
//! service's host.

pub mod actions;
pub mod git;
pub mod provisioner;
pub mod runner;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use actions::ActionsRuntime;
pub use provisioner::{ProvisionAction, ProvisionRequest, Provisioner};
pub use runner::TokioCommandRunner;
