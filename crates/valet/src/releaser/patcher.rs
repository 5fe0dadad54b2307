//! Chart reference extraction and in-place version rewrite.

use std::future::Future;

use semver::Version;

use crate::document::Node;

use super::constraint::parse_version;
use super::error::DocumentError;
use super::report::ChartUpdate;
use super::resolver::Resolution;

const NAME_PATH: &[&str] = &["spec", "chart", "name"];
const REPOSITORY_PATH: &[&str] = &["spec", "chart", "repository"];
const VERSION_PATH: &[&str] = &["spec", "chart", "version"];

/// The chart a document deploys, read from `spec.chart`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartReference {
    pub name: String,
    pub repository: String,
    pub current_version: Version,
    /// The version exactly as written in the document.
    pub raw_version: String,
}

impl ChartReference {
    /// Reads the chart reference. Each field must be a string.
    pub fn extract(document: &Node) -> Result<Self, DocumentError> {
        let name = document
            .get_str(NAME_PATH)
            .ok_or(DocumentError::MissingChartName)?;
        let repository = document
            .get_str(REPOSITORY_PATH)
            .ok_or(DocumentError::MissingChartRepository)?;
        let raw_version = document
            .get_str(VERSION_PATH)
            .ok_or(DocumentError::MissingChartVersion)?;
        let current_version =
            parse_version(raw_version).map_err(|e| DocumentError::InvalidCurrentVersion {
                value: raw_version.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name: name.to_string(),
            repository: repository.to_string(),
            current_version,
            raw_version: raw_version.to_string(),
        })
    }
}

/// Result of patching one document.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchResult {
    pub document: Node,
    pub changed: bool,
    /// The applied bump, when `changed`.
    pub update: Option<ChartUpdate>,
    /// Chart name from the reference.
    pub chart: String,
}

/// Extracts the chart reference, asks `resolve` for a newer version and
/// writes it to `spec.chart.version`.
///
/// [`Resolution::NoNewVersion`] yields an unchanged document, not an error.
/// On error the caller keeps the original document.
pub async fn patch<F, Fut>(document: &Node, resolve: F) -> Result<PatchResult, DocumentError>
where
    F: FnOnce(ChartReference) -> Fut,
    Fut: Future<Output = Result<Resolution, DocumentError>>,
{
    let reference = ChartReference::extract(document)?;
    let chart = reference.name.clone();
    let repository = reference.repository.clone();
    let from = reference.raw_version.clone();

    let version = match resolve(reference).await? {
        Resolution::Upgrade(version) => version,
        Resolution::NoNewVersion => {
            return Ok(PatchResult {
                document: document.clone(),
                changed: false,
                update: None,
                chart,
            });
        }
    };

    let mut patched = document.clone();
    patched.set(VERSION_PATH, Node::string(version.to_string()))?;

    Ok(PatchResult {
        document: patched,
        changed: true,
        update: Some(ChartUpdate {
            chart: chart.clone(),
            repository,
            from,
            to: version.to_string(),
        }),
        chart,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{parse_documents, render_documents};

    const RELEASE: &str = r#"apiVersion: helm.toolkit.fluxcd.io/v2
kind: HelmRelease
metadata:
  name: api
  annotations:
    valet.io/automated: 'true'
spec:
  chart:
    name: api
    repository: https://charts.example.com
    version: 1.2.0
  values:
    replicas: 2
"#;

    fn doc(text: &str) -> Node {
        parse_documents(text).unwrap().remove(0)
    }

    #[test]
    fn test_extract_reference() {
        let reference = ChartReference::extract(&doc(RELEASE)).unwrap();
        assert_eq!(reference.name, "api");
        assert_eq!(reference.repository, "https://charts.example.com");
        assert_eq!(reference.current_version, Version::new(1, 2, 0));
    }

    #[test]
    fn test_missing_fields_are_distinct() {
        let cases = [
            ("spec:\n  chart:\n    repository: r\n    version: 1.0.0\n", DocumentError::MissingChartName),
            ("spec:\n  chart:\n    name: n\n    version: 1.0.0\n", DocumentError::MissingChartRepository),
            ("spec:\n  chart:\n    name: n\n    repository: r\n", DocumentError::MissingChartVersion),
        ];
        for (text, expected) in cases {
            assert_eq!(ChartReference::extract(&doc(text)).unwrap_err(), expected);
        }
    }

    #[test]
    fn test_mistyped_version_is_missing() {
        let d = doc("spec:\n  chart:\n    name: n\n    repository: r\n    version: 1.5\n");
        assert_eq!(
            ChartReference::extract(&d).unwrap_err(),
            DocumentError::MissingChartVersion
        );
    }

    #[test]
    fn test_invalid_current_version() {
        let d = doc("spec:\n  chart:\n    name: n\n    repository: r\n    version: latest\n");
        assert!(matches!(
            ChartReference::extract(&d),
            Err(DocumentError::InvalidCurrentVersion { .. })
        ));
    }

    #[tokio::test]
    async fn test_patch_rewrites_only_version() {
        let original = doc(RELEASE);
        let result = patch(&original, |reference| async move {
            assert_eq!(reference.name, "api");
            Ok(Resolution::Upgrade(Version::new(1, 3, 0)))
        })
        .await
        .unwrap();

        assert!(result.changed);
        assert_eq!(
            result.update,
            Some(ChartUpdate {
                chart: "api".to_string(),
                repository: "https://charts.example.com".to_string(),
                from: "1.2.0".to_string(),
                to: "1.3.0".to_string(),
            })
        );
        let rendered = render_documents(&[result.document]).unwrap();
        assert_eq!(rendered, RELEASE.replace("version: 1.2.0", "version: 1.3.0"));
    }

    #[tokio::test]
    async fn test_no_new_version_is_unchanged() {
        let original = doc(RELEASE);
        let result = patch(&original, |_| async { Ok(Resolution::NoNewVersion) })
            .await
            .unwrap();
        assert!(!result.changed);
        assert!(result.update.is_none());
        assert_eq!(result.document, original);
    }

    #[tokio::test]
    async fn test_resolver_error_propagates() {
        let original = doc(RELEASE);
        let err = patch(&original, |_| async {
            Err(DocumentError::Registry {
                chart: "api".to_string(),
                source: crate::registry::RegistryError::Cancelled,
            })
        })
        .await
        .unwrap_err();
        assert!(err.is_cancelled());
    }
}
