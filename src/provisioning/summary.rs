use connector_types::{
    ProvisioningOutcome, ProvisioningSummary, SecretFailure, SecretSuccess, Severity,
};
use std::collections::HashSet;

/// Fold outcomes into a summary with stable ordering.
///
/// Outcomes may arrive in any order; both lists are sorted by `owner/name`,
/// then by secret name (repository-level failures first).
pub fn summarize(outcomes: Vec<ProvisioningOutcome>) -> ProvisioningSummary {
    let mut successes: Vec<SecretSuccess> = Vec::new();
    let mut failures: Vec<SecretFailure> = Vec::new();
    for outcome in outcomes {
        match outcome {
            ProvisioningOutcome::Success(s) => successes.push(s),
            ProvisioningOutcome::Failure(f) => failures.push(f),
        }
    }

    successes.sort_by_cached_key(|s| (s.repo.full_name(), s.secret_name.clone()));
    failures.sort_by_cached_key(|f| (f.repo.full_name(), f.secret_name.clone()));

    let with_failures: HashSet<String> = failures.iter().map(|f| f.repo.full_name()).collect();
    let with_successes: HashSet<String> = successes.iter().map(|s| s.repo.full_name()).collect();
    let partial = with_successes.intersection(&with_failures).count();

    ProvisioningSummary {
        succeeded: failures.is_empty(),
        severity: severity(successes.len(), failures.len()),
        message: summary_message(
            with_successes.len() - partial,
            partial,
            with_failures.len() - partial,
        ),
        successes,
        failures,
    }
}

/// `success` without failures, `danger` without successes, `warning` otherwise.
pub fn severity(successes: usize, failures: usize) -> Severity {
    if failures == 0 {
        Severity::Success
    } else if successes == 0 {
        Severity::Danger
    } else {
        Severity::Warning
    }
}

/// Human-readable summary counting repositories, not individual secrets.
///
/// A partial repository got some of its secrets written and not others.
pub fn summary_message(succeeded_repos: usize, partial_repos: usize, failed_repos: usize) -> String {
    if partial_repos > 0 {
        let mut message = if succeeded_repos > 0 {
            format!(
                "Successfully created secrets in {}, partially in {}",
                repositories(succeeded_repos),
                repositories(partial_repos)
            )
        } else {
            format!("Partially created secrets in {}", repositories(partial_repos))
        };
        if failed_repos > 0 {
            message.push_str(&format!(", but failed in {}", repositories(failed_repos)));
        }
        message.push('.');
        message
    } else if failed_repos == 0 {
        format!(
            "Successfully created secrets in {}.",
            repositories(succeeded_repos)
        )
    } else if succeeded_repos == 0 {
        format!("Failed to create secrets in {}.", repositories(failed_repos))
    } else {
        format!(
            "Successfully created secrets in {}, but failed in {}.",
            repositories(succeeded_repos),
            repositories(failed_repos)
        )
    }
}

fn repositories(count: usize) -> String {
    if count == 1 {
        "1 repository".to_string()
    } else {
        format!("{} repositories", count)
    }
}
