pub mod app;
pub mod client;
pub mod sealed;

pub use app::{AppCredentials, AppRegistry, ManifestStateStore, PendingAppCreation, SharedAppRegistry};
pub use client::{AuthenticatedGitHub, GitHubClient, GitHubError, GitHubResult, GitHubUser, RepoSecretStore};
pub use sealed::{encrypt, EncryptedSecret, EncryptionError, RepoPublicKey, SealingKey};
