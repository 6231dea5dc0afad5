//! Bulk provisioning of cluster credentials into GitHub Actions secrets.
//!
//! One repository's failure never aborts the batch: credential issuance,
//! public key fetches and individual secret writes are all captured as
//! outcomes in the returned summary. Only caller contract violations are
//! returned as errors.

pub mod orchestrator;
pub mod summary;

pub use orchestrator::{ProvisionError, SecretProvisioner, SecretSpec, DEFAULT_CONCURRENCY};
pub use summary::{severity, summarize, summary_message};
