mod common;

use common::{metadata, repo, FakeSecretStore, FakeTokens};
use connector_types::{CredentialPolicy, Severity};
use openshift_github_connector::cluster::Credential;
use openshift_github_connector::provisioning::{SecretProvisioner, SecretSpec};
use proptest::prelude::*;
use std::sync::Arc;

/// Per repository: (credential fails, public key fails).
fn repo_plan() -> impl Strategy<Value = Vec<(bool, bool)>> {
    prop::collection::vec((any::<bool>(), any::<bool>()), 1..8)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn outcome_count_is_exact(plan in repo_plan(), secret_count in 1usize..4) {
        let mut tokens = FakeTokens::new();
        let mut store = FakeSecretStore::new();
        let mut repos = Vec::new();
        let mut expected = 0;

        for (i, (credential_fails, key_fails)) in plan.iter().enumerate() {
            let target = repo("acme", &format!("repo-{}", i), i as u64);
            let full_name = target.full_name();
            if *credential_fails {
                tokens = tokens.failing_for(&full_name);
                expected += 1;
            } else if *key_fails {
                store = store.key_unavailable_for(&full_name);
                expected += 1;
            } else {
                expected += secret_count;
            }
            repos.push(target);
        }

        let provisioner = SecretProvisioner::new(Arc::new(tokens), Arc::new(store));
        let summary = tokio_test::block_on(provisioner.provision(
            &repos,
            CredentialPolicy::Fresh,
            &metadata(),
            |credential: &Credential| {
                (0..secret_count)
                    .map(|n| SecretSpec::new(format!("SECRET_{}", n), credential.value.clone()))
                    .collect()
            },
        ))
        .unwrap();

        prop_assert_eq!(summary.successes.len() + summary.failures.len(), expected);
        // Repository-level failures never carry a secret name
        prop_assert!(summary.failures.iter().all(|f| f.is_repository_level()));
    }

    #[test]
    fn severity_follows_counts(plan in repo_plan()) {
        let mut tokens = FakeTokens::new();
        for (i, (credential_fails, _)) in plan.iter().enumerate() {
            if *credential_fails {
                tokens = tokens.failing_for(&format!("acme/repo-{}", i));
            }
        }
        let repos: Vec<_> = (0..plan.len())
            .map(|i| repo("acme", &format!("repo-{}", i), i as u64))
            .collect();

        let provisioner = SecretProvisioner::new(Arc::new(tokens), Arc::new(FakeSecretStore::new()));
        let summary = tokio_test::block_on(provisioner.provision(
            &repos,
            CredentialPolicy::Fresh,
            &metadata(),
            common::two_secrets,
        ))
        .unwrap();

        let expected = if summary.failures.is_empty() {
            Severity::Success
        } else if summary.successes.is_empty() {
            Severity::Danger
        } else {
            Severity::Warning
        };
        prop_assert_eq!(summary.severity, expected);
        prop_assert_eq!(summary.succeeded, summary.failures.is_empty());

        let names: Vec<_> = summary.successes.iter().map(|s| s.repo.full_name()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        prop_assert_eq!(names, sorted);
    }
}
