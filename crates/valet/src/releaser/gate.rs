//! Per-document opt-in check and filter extraction.
//!
//! A document takes part in automated bumps only when its
//! `metadata.annotations` carry `valet.io/automated: "true"`. The optional
//! `filter.valet.io/chart` annotation narrows the acceptable versions with a
//! `<kind>:<expression>` value, where `semver` is the only kind.

use crate::document::Node;

use super::constraint::Constraint;
use super::error::DocumentError;

/// Annotation that opts a document into automation.
pub const AUTOMATED_ANNOTATION: &str = "valet.io/automated";

/// Annotation holding the chart version filter.
pub const CHART_FILTER_ANNOTATION: &str = "filter.valet.io/chart";

const ANNOTATIONS_PATH: &[&str] = &["metadata", "annotations"];

/// An eligible document's automation settings.
#[derive(Debug, Clone, Default)]
pub struct Automation {
    pub constraint: Constraint,
}

/// Supported filter kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Semver,
}

impl FilterKind {
    fn parse(kind: &str) -> Option<Self> {
        match kind {
            "semver" => Some(FilterKind::Semver),
            _ => None,
        }
    }
}

/// Decides whether `document` may be modified and extracts its constraint.
///
/// Returns [`DocumentError::NotAutomated`] for documents that did not opt in.
/// The opt-in value is compared as a string, so a YAML boolean `true` does
/// not count.
pub fn evaluate(document: &Node) -> Result<Automation, DocumentError> {
    let annotations = document.get(ANNOTATIONS_PATH);
    let automated = annotations.and_then(|a| a.child(AUTOMATED_ANNOTATION));
    if automated.and_then(Node::as_str) != Some("true") {
        return Err(DocumentError::NotAutomated);
    }

    let mut automation = Automation::default();
    let Some(entries) = annotations.and_then(Node::as_map) else {
        return Ok(automation);
    };

    for (key, value) in entries {
        if key.as_str() != Some(CHART_FILTER_ANNOTATION) {
            continue;
        }
        let filter = value
            .as_str()
            .ok_or_else(|| DocumentError::FilterNotString {
                value: value.describe(),
            })?;
        automation.constraint = parse_filter(filter)?;
    }

    Ok(automation)
}

/// Parses a `<kind>:<expression>` filter value into a constraint.
pub fn parse_filter(filter: &str) -> Result<Constraint, DocumentError> {
    let Some((kind, expression)) = filter.split_once(':') else {
        return Err(DocumentError::MalformedFilter {
            value: filter.to_string(),
        });
    };

    match FilterKind::parse(kind) {
        Some(FilterKind::Semver) => Ok(Constraint::parse(expression)?),
        None => Err(DocumentError::UnknownFilterKind {
            kind: kind.to_string(),
        }),
    }
}
