//! End-to-end reconciliation of a single repository against the in-memory
//! hosting fake and a static chart index.

mod common;

use common::{helm_release, HelmReleaseBuilder, RepoHarness};
use tokio_util::sync::CancellationToken;
use valet::releaser::{
    BranchPolicy, DocumentOutcome, FileOutcome, PublishError, PublishResult, ReleaserError,
    RepositoryOutcome,
};

const ALL_YAML: &str = "rules:\n  - branch: main\n    files: \\.yaml$\n";

#[tokio::test]
async fn test_multi_document_file_changes_only_eligible_document() {
    let original = [
        helm_release("api", "1.0.0"),
        HelmReleaseBuilder::new("web", "1.0.0").manual().build(),
        helm_release("worker", "3.0.0"),
    ]
    .join("---\n");

    let harness = RepoHarness::new()
        .with_release_config(ALL_YAML)
        .with_file("main", "deploy/apps.yaml", &original)
        .with_chart("api", &["0.9.0", "1.0.0", "1.1.0"])
        .with_chart("web", &["9.9.9"])
        .with_chart("worker", &["2.0.0", "3.0.0"]);

    let report = harness.run().await;
    assert_eq!(report.outcome, RepositoryOutcome::Scanned);

    let file = &report.rules[0].files[0];
    assert!(file.is_published());
    let outcomes: Vec<_> = file.documents.iter().map(|d| &d.outcome).collect();
    assert!(matches!(outcomes[0], DocumentOutcome::Updated(u) if u.to == "1.1.0"));
    assert_eq!(outcomes[1], &DocumentOutcome::NotAutomated);
    assert!(matches!(outcomes[2], DocumentOutcome::NoNewVersion { .. }));

    let expected = [
        helm_release("api", "1.1.0"),
        HelmReleaseBuilder::new("web", "1.0.0").manual().build(),
        helm_release("worker", "3.0.0"),
    ]
    .join("---\n");
    assert_eq!(
        harness
            .content("valet/deploy/apps.yaml/bump", "deploy/apps.yaml")
            .as_deref(),
        Some(expected.as_str())
    );
    assert_eq!(
        harness.content("main", "deploy/apps.yaml").as_deref(),
        Some(original.as_str())
    );
}

#[tokio::test]
async fn test_range_filter_picks_highest_version_in_range() {
    let release = HelmReleaseBuilder::new("api", "1.2.0")
        .filter("semver:>=1.0.0 <2.0.0")
        .build();
    let harness = RepoHarness::new()
        .with_release_config(ALL_YAML)
        .with_file("main", "deploy/api.yaml", &release)
        .with_chart("api", &["1.3.0", "2.0.0", "1.2.1"]);

    let report = harness.run().await;
    let file = &report.rules[0].files[0];
    let updates: Vec<_> = file.updates().collect();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].from, "1.2.0");
    assert_eq!(updates[0].to, "1.3.0");

    let content = harness
        .content("valet/deploy/api.yaml/bump", "deploy/api.yaml")
        .unwrap();
    assert!(content.contains("version: 1.3.0"));
    assert!(content.contains("filter.valet.io/chart"));
}

#[tokio::test]
async fn test_missing_release_config_is_not_fatal() {
    let harness = RepoHarness::new()
        .with_file("main", "deploy/api.yaml", &helm_release("api", "1.0.0"))
        .with_chart("api", &["2.0.0"]);

    let report = harness.run().await;
    assert_eq!(report.outcome, RepositoryOutcome::Skipped);
    assert!(report.failures().is_empty());
    assert_eq!(harness.host.write_count(), 0);
    assert_eq!(harness.host.branches(harness.id()), vec!["main".to_string()]);
}

#[tokio::test]
async fn test_long_path_uses_trailing_characters_for_branch() {
    let filler = "a".repeat(80 - "clusters/".len() - "/api.yaml".len());
    let path = format!("clusters/{}/api.yaml", filler);
    assert_eq!(path.len(), 80);

    let harness = RepoHarness::new()
        .with_release_config(ALL_YAML)
        .with_file("main", &path, &helm_release("api", "1.0.0"))
        .with_chart("api", &["1.0.1"]);

    harness.run().await;

    let branch = format!("valet/{}/bump", &path[30..]);
    assert!(harness.host.branches(harness.id()).contains(&branch));
    let pulls = harness.host.pull_requests(harness.id());
    assert_eq!(pulls.len(), 1);
    assert_eq!(pulls[0].head, branch);
    assert_eq!(pulls[0].base, "main");
    assert_eq!(pulls[0].title, format!("Bump chart in {}", path));
}

#[tokio::test]
async fn test_short_path_branch_is_not_truncated() {
    let harness = RepoHarness::new()
        .with_release_config(ALL_YAML)
        .with_file("main", "x/api.yaml", &helm_release("api", "1.0.0"))
        .with_chart("api", &["1.0.1"]);

    harness.run().await;
    assert!(harness
        .host
        .branches(harness.id())
        .contains(&"valet/x/api.yaml/bump".to_string()));
}

#[tokio::test]
async fn test_existing_branch_fails_publish_by_default() {
    let harness = RepoHarness::new()
        .with_release_config(ALL_YAML)
        .with_file("main", "deploy/api.yaml", &helm_release("api", "1.0.0"))
        .with_chart("api", &["1.1.0"]);

    let first = harness.run().await;
    assert!(first.rules[0].files[0].is_published());

    let second = harness.run().await;
    assert!(matches!(
        second.rules[0].files[0].outcome,
        FileOutcome::Failed(ReleaserError::Publish(_))
    ));
    assert_eq!(second.outcome, RepositoryOutcome::Scanned);
    assert_eq!(harness.host.pull_requests(harness.id()).len(), 1);
}

#[tokio::test]
async fn test_reset_policy_reuses_open_pull_request() {
    let harness = RepoHarness::new()
        .with_release_config(ALL_YAML)
        .with_file("main", "deploy/api.yaml", &helm_release("api", "1.0.0"))
        .with_chart("api", &["1.1.0"])
        .with_branch_policy(BranchPolicy::Reset);

    harness.run().await;
    let second = harness.run().await;

    assert!(matches!(
        &second.rules[0].files[0].outcome,
        FileOutcome::Published(PublishResult::PullRequestReused { .. })
    ));
    let pulls = harness.host.pull_requests(harness.id());
    assert_eq!(pulls.len(), 1);
    assert!(pulls[0].open);
    assert_eq!(
        harness.content("valet/deploy/api.yaml/bump", "deploy/api.yaml"),
        Some(helm_release("api", "1.1.0"))
    );
}

#[tokio::test]
async fn test_reset_policy_keeps_branch_backing_other_base() {
    let harness = RepoHarness::new()
        .with_release_config(
            "rules:\n  - branch: main\n    files: ^app\\.yaml$\n  - branch: release\n    files: ^app\\.yaml$\n",
        )
        .with_file("main", "app.yaml", &helm_release("api", "1.0.0"))
        .with_chart("api", &["1.0.0", "1.0.5", "1.1.0"])
        .with_branch_policy(BranchPolicy::Reset);
    harness.host.add_branch(harness.id(), "main", "release");
    harness
        .host
        .put_file(harness.id(), "release", "app.yaml", &helm_release("api", "1.0.5"));

    let report = harness.run().await;
    assert_eq!(report.rules.len(), 2);
    assert!(report.rules[0].files[0].is_published());
    assert!(matches!(
        &report.rules[1].files[0].outcome,
        FileOutcome::Failed(ReleaserError::Publish(PublishError::BranchInUse { base, other_base, number: 1, .. }))
            if base == "release" && other_base == "main"
    ));

    let pulls = harness.host.pull_requests(harness.id());
    assert_eq!(pulls.len(), 1);
    assert_eq!(pulls[0].base, "main");
    assert_eq!(
        harness.content("valet/app.yaml/bump", "app.yaml"),
        Some(helm_release("api", "1.1.0"))
    );
    assert_eq!(
        harness.content("release", "app.yaml"),
        Some(helm_release("api", "1.0.5"))
    );
}

#[tokio::test]
async fn test_direct_strategy_commits_to_rule_branch() {
    let harness = RepoHarness::new()
        .with_release_config("rules:\n  - branch: main\n    files: \\.yaml$\n    strategy: direct\n")
        .with_file("main", "deploy/api.yaml", &helm_release("api", "1.0.0"))
        .with_chart("api", &["1.1.0"]);

    let report = harness.run().await;
    assert!(matches!(
        &report.rules[0].files[0].outcome,
        FileOutcome::Published(PublishResult::Committed { branch, .. }) if branch == "main"
    ));
    assert_eq!(
        harness.content("main", "deploy/api.yaml"),
        Some(helm_release("api", "1.1.0"))
    );
    assert!(harness.host.pull_requests(harness.id()).is_empty());
}

#[tokio::test]
async fn test_rule_targets_non_default_branch() {
    let harness = RepoHarness::new()
        .with_release_config("rules:\n  - branch: staging\n    files: ^apps/\n")
        .with_file("main", "apps/api.yaml", &helm_release("api", "1.0.0"));
    harness
        .host
        .add_branch(harness.id(), "main", "staging");
    harness
        .host
        .put_file(harness.id(), "staging", "apps/api.yaml", &helm_release("api", "1.0.5"));
    let harness = harness.with_chart("api", &["1.0.0", "1.0.5", "1.1.0"]);

    let report = harness.run().await;
    let updates: Vec<_> = report.rules[0].files[0].updates().collect();
    assert_eq!(updates[0].from, "1.0.5");

    let pulls = harness.host.pull_requests(harness.id());
    assert_eq!(pulls[0].base, "staging");
}

#[tokio::test]
async fn test_invalid_rule_does_not_block_valid_rules() {
    let harness = RepoHarness::new()
        .with_release_config(
            "rules:\n  - branch: main\n    files: '(unclosed'\n  - branch: main\n    files: \\.yaml$\n",
        )
        .with_file("main", "deploy/api.yaml", &helm_release("api", "1.0.0"))
        .with_chart("api", &["1.1.0"]);

    let report = harness.run().await;
    assert_eq!(report.rejected_rules.len(), 1);
    assert_eq!(report.rules.len(), 1);
    assert!(report.rules[0].files[0].is_published());
}

#[tokio::test]
async fn test_broken_document_does_not_block_siblings() {
    let broken = "apiVersion: helm.toolkit.fluxcd.io/v2\nkind: HelmRelease\nmetadata:\n  name: broken\n  annotations:\n    valet.io/automated: 'true'\nspec:\n  chart:\n    repository: https://charts.example.com\n    version: 1.0.0\n";
    let original = [broken.to_string(), helm_release("api", "1.0.0")].join("---\n");
    let harness = RepoHarness::new()
        .with_release_config(ALL_YAML)
        .with_file("main", "deploy/apps.yaml", &original)
        .with_chart("api", &["1.1.0"]);

    let report = harness.run().await;
    let file = &report.rules[0].files[0];
    assert!(matches!(file.documents[0].outcome, DocumentOutcome::Failed(_)));
    assert!(matches!(file.documents[1].outcome, DocumentOutcome::Updated(_)));
    assert!(file.is_published());

    let content = harness
        .content("valet/deploy/apps.yaml/bump", "deploy/apps.yaml")
        .unwrap();
    assert!(content.starts_with(broken));
    assert_eq!(report.failures().len(), 1);
}

#[tokio::test]
async fn test_unknown_chart_fails_document_only() {
    let original = [helm_release("ghost", "1.0.0"), helm_release("api", "1.0.0")].join("---\n");
    let harness = RepoHarness::new()
        .with_release_config(ALL_YAML)
        .with_file("main", "deploy/apps.yaml", &original)
        .with_chart("api", &["1.2.0"]);

    let report = harness.run().await;
    let file = &report.rules[0].files[0];
    assert!(matches!(file.documents[0].outcome, DocumentOutcome::Failed(_)));
    assert!(file.is_published());
}

#[tokio::test]
async fn test_cancelled_run_writes_nothing() {
    let harness = RepoHarness::new()
        .with_release_config(ALL_YAML)
        .with_file("main", "deploy/api.yaml", &helm_release("api", "1.0.0"))
        .with_chart("api", &["1.1.0"]);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = harness.run_with(cancel).await;
    assert_eq!(report.outcome, RepositoryOutcome::Cancelled);
    assert_eq!(harness.host.write_count(), 0);
}
