//! Repository release rules.
//!
//! Each repository opts in with a YAML file on its default branch:
//!
//! ```yaml
//! rules:
//!   - branch: main
//!     files: ^deploy/.*\.ya?ml$
//!     strategy: pull-request
//! ```
//!
//! A rule pairs a branch with a path pattern; every blob on that branch whose
//! path matches is a candidate manifest.

use regex::Regex;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::hosting::{Repository, SourceHost, TreeEntry};

use super::error::{ReleaserError, RuleError};

/// Default location of the release config inside a repository.
pub const DEFAULT_RELEASE_CONFIG_PATH: &str = ".github/valet.yaml";

/// Raw release config as read from the repository.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseConfig {
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
    /// Branch to scan; the repository's default branch when omitted.
    #[serde(default)]
    pub branch: Option<String>,
    /// Regular expression matched against full file paths.
    pub files: String,
    #[serde(default)]
    pub strategy: Option<String>,
}

/// How a patched file is proposed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strategy {
    /// Bump branch, commit and pull request against the rule branch.
    #[default]
    PullRequest,
    /// Commit straight to the rule branch.
    Direct,
}

impl Strategy {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pull-request" => Some(Strategy::PullRequest),
            "direct" => Some(Strategy::Direct),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::PullRequest => "pull-request",
            Strategy::Direct => "direct",
        }
    }
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub branch: String,
    pub files: Regex,
    pub strategy: Strategy,
}

impl Rule {
    pub fn matches(&self, path: &str) -> bool {
        self.files.is_match(path)
    }
}

/// Rules that compiled, plus the ones that were rejected.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
    pub rejected: Vec<RuleError>,
}

impl ReleaseConfig {
    /// Parses a release config. An empty file has no rules.
    pub fn parse(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }
}

/// Compiles rule configs; rules that fail are collected, not fatal.
pub fn compile_rules(configs: &[RuleConfig], default_branch: &str) -> RuleSet {
    let mut set = RuleSet::default();
    for (index, config) in configs.iter().enumerate() {
        match compile_rule(index, config, default_branch) {
            Ok(rule) => set.rules.push(rule),
            Err(e) => {
                warn!(error = %e, "Skipping release rule");
                set.rejected.push(e);
            }
        }
    }
    set
}

fn compile_rule(index: usize, config: &RuleConfig, default_branch: &str) -> Result<Rule, RuleError> {
    let branch = match config.branch.as_deref() {
        None => default_branch.to_string(),
        Some(branch) if branch.trim().is_empty() => {
            return Err(RuleError::EmptyBranch { index });
        }
        Some(branch) => branch.to_string(),
    };

    let strategy = match config.strategy.as_deref() {
        None => Strategy::default(),
        Some(value) => Strategy::parse(value).ok_or_else(|| RuleError::UnknownStrategy {
            index,
            strategy: value.to_string(),
        })?,
    };

    let files = Regex::new(&config.files).map_err(|e| RuleError::InvalidPattern {
        index,
        pattern: config.files.clone(),
        reason: e.to_string(),
    })?;

    Ok(Rule {
        branch,
        files,
        strategy,
    })
}

/// Reads and compiles the release config of `repository`.
///
/// A missing file is [`ReleaserError::FileMissing`], which callers treat as
/// "repository not enrolled".
pub async fn fetch_rules(
    host: &dyn SourceHost,
    repository: &Repository,
    config_path: &str,
    cancel: &CancellationToken,
) -> Result<RuleSet, ReleaserError> {
    debug!(path = config_path, branch = %repository.default_branch, "Reading release config");
    let bytes = host
        .download_contents(&repository.id, config_path, &repository.default_branch, cancel)
        .await
        .map_err(|e| {
            if e.is_not_found() {
                ReleaserError::FileMissing {
                    path: config_path.to_string(),
                }
            } else {
                ReleaserError::ReadConfig {
                    path: config_path.to_string(),
                    source: e,
                }
            }
        })?;

    let text = String::from_utf8(bytes).map_err(|_| ReleaserError::NotUtf8 {
        path: config_path.to_string(),
    })?;
    let config = ReleaseConfig::parse(&text).map_err(|e| ReleaserError::ParseConfig {
        path: config_path.to_string(),
        message: e.to_string(),
    })?;

    Ok(compile_rules(&config.rules, &repository.default_branch))
}

/// Blob entries of `tree` whose path matches `rule`, in tree order.
pub fn scan<'a>(tree: &'a [TreeEntry], rule: &Rule) -> Vec<&'a TreeEntry> {
    tree.iter()
        .filter(|entry| entry.is_blob() && rule.matches(&entry.path))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosting::{EntryKind, MemoryHost, RepositoryId};

    fn entry(path: &str, kind: EntryKind) -> TreeEntry {
        TreeEntry {
            path: path.to_string(),
            sha: format!("sha-{}", path),
            kind,
        }
    }

    fn rule(pattern: &str) -> Rule {
        Rule {
            branch: "main".to_string(),
            files: Regex::new(pattern).unwrap(),
            strategy: Strategy::PullRequest,
        }
    }

    #[test]
    fn test_parse_config() {
        let config = ReleaseConfig::parse(concat!(
            "rules:\n",
            "  - branch: main\n",
            "    files: ^deploy/.*\\.yaml$\n",
            "  - files: charts\n",
            "    strategy: direct\n",
        ))
        .unwrap();
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[0].branch.as_deref(), Some("main"));
        assert_eq!(config.rules[1].strategy.as_deref(), Some("direct"));
    }

    #[test]
    fn test_empty_config_has_no_rules() {
        assert!(ReleaseConfig::parse("").unwrap().rules.is_empty());
        assert!(ReleaseConfig::parse("rules: []\n").unwrap().rules.is_empty());
    }

    #[test]
    fn test_compile_rules_defaults() {
        let configs = vec![RuleConfig {
            branch: None,
            files: "\\.yaml$".to_string(),
            strategy: None,
        }];
        let set = compile_rules(&configs, "trunk");
        assert_eq!(set.rules.len(), 1);
        assert_eq!(set.rules[0].branch, "trunk");
        assert_eq!(set.rules[0].strategy, Strategy::PullRequest);
    }

    #[test]
    fn test_bad_rules_are_skipped() {
        let configs = vec![
            RuleConfig {
                branch: Some("main".to_string()),
                files: "([".to_string(),
                strategy: None,
            },
            RuleConfig {
                branch: Some("main".to_string()),
                files: ".*".to_string(),
                strategy: Some("merge".to_string()),
            },
            RuleConfig {
                branch: Some(" ".to_string()),
                files: ".*".to_string(),
                strategy: None,
            },
            RuleConfig {
                branch: Some("release".to_string()),
                files: "\\.yaml$".to_string(),
                strategy: Some("direct".to_string()),
            },
        ];
        let set = compile_rules(&configs, "main");
        assert_eq!(set.rules.len(), 1);
        assert_eq!(set.rules[0].branch, "release");
        assert_eq!(set.rules[0].strategy, Strategy::Direct);
        assert!(matches!(
            set.rejected[0],
            RuleError::InvalidPattern { index: 0, .. }
        ));
        assert!(matches!(
            set.rejected[1],
            RuleError::UnknownStrategy { index: 1, .. }
        ));
        assert!(matches!(set.rejected[2], RuleError::EmptyBranch { index: 2 }));
    }

    #[test]
    fn test_scan_only_matches_blobs() {
        let tree = vec![
            entry("deploy", EntryKind::Tree),
            entry("deploy/api.yaml", EntryKind::Blob),
            entry("deploy/web.yaml", EntryKind::Blob),
            entry("deploy/vendor.yaml", EntryKind::Commit),
            entry("README.md", EntryKind::Blob),
        ];
        let matched: Vec<_> = scan(&tree, &rule("^deploy"))
            .into_iter()
            .map(|e| e.path.as_str())
            .collect();
        assert_eq!(matched, vec!["deploy/api.yaml", "deploy/web.yaml"]);
    }

    #[test]
    fn test_pattern_is_unanchored() {
        assert!(rule("api").matches("apps/api/release.yaml"));
        assert!(!rule("^api").matches("apps/api/release.yaml"));
    }

    #[tokio::test]
    async fn test_fetch_rules_missing_file() {
        let host = MemoryHost::new();
        let id = host.add_repository("acme", "deploy", "main");
        let repository = Repository {
            id: RepositoryId::new("acme", "deploy"),
            default_branch: "main".to_string(),
        };
        assert_eq!(id, repository.id);
        let err = fetch_rules(
            &host,
            &repository,
            DEFAULT_RELEASE_CONFIG_PATH,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ReleaserError::FileMissing { .. }));
    }

    #[tokio::test]
    async fn test_fetch_rules_parse_error() {
        let host = MemoryHost::new();
        let id = host.add_repository("acme", "deploy", "main");
        host.put_file(&id, "main", DEFAULT_RELEASE_CONFIG_PATH, "rules: {oops\n");
        let repository = Repository {
            id,
            default_branch: "main".to_string(),
        };
        let err = fetch_rules(
            &host,
            &repository,
            DEFAULT_RELEASE_CONFIG_PATH,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ReleaserError::ParseConfig { .. }));
    }
}
