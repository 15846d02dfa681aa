//! Identity token issuance and token exchange for the broker client.
//!
//! This crate obtains the job's identity token from the CI platform and
//! trades it with the broker for a downstream access credential.

pub mod exchange;
pub mod identity;

pub use exchange::{ExchangeClient, ExchangeError, extract_error_message};
pub use identity::{GitHubActionsIdentity, IdentityError, IdentityProvider, StaticIdentity};
