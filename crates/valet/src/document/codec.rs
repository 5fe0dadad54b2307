//! Multi-document YAML parsing and rendering.

use serde::Deserialize;
use serde_yaml::Value;

use super::error::{Result, YamlError};
use super::node::{Node, Scalar};

const DOCUMENT_SEPARATOR: &str = "---\n";

/// Splits a (possibly multi-document) YAML stream into node trees, in order.
pub fn parse_documents(text: &str) -> Result<Vec<Node>> {
    let mut documents = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let value = Value::deserialize(document).map_err(|e| YamlError::Parse {
            index,
            message: e.to_string(),
        })?;
        let node = Node::from_value(value).map_err(|e| YamlError::Parse {
            index,
            message: e.to_string(),
        })?;
        documents.push(node);
    }
    Ok(documents)
}

/// Renders documents back into one stream separated by `---`.
///
/// Output is the canonical `serde_yaml` form: block style, two-space indent.
/// An empty (null) document renders as nothing between its separators.
pub fn render_documents(documents: &[Node]) -> Result<String> {
    let mut out = String::new();
    for (index, document) in documents.iter().enumerate() {
        if index > 0 {
            out.push_str(DOCUMENT_SEPARATOR);
        }
        if matches!(document, Node::Scalar(Scalar::Null)) {
            continue;
        }
        let rendered = serde_yaml::to_string(&document.to_value())
            .map_err(|e| YamlError::Serialize(e.to_string()))?;
        out.push_str(&rendered);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTI: &str = r#"apiVersion: v1
kind: ConfigMap
metadata:
  name: first
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: second
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: third
"#;

    #[test]
    fn test_parse_multi_document_keeps_order() {
        let documents = parse_documents(MULTI).unwrap();
        let names: Vec<_> = documents
            .iter()
            .map(|d| d.get_str(&["metadata", "name"]).unwrap())
            .collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_render_is_stable_for_canonical_input() {
        let documents = parse_documents(MULTI).unwrap();
        let rendered = render_documents(&documents).unwrap();
        assert_eq!(rendered, MULTI);
    }

    #[test]
    fn test_render_uses_two_space_indent() {
        let documents = parse_documents("a:\n      b:\n            c: d\n").unwrap();
        let rendered = render_documents(&documents).unwrap();
        assert_eq!(rendered, "a:\n  b:\n    c: d\n");
    }

    #[test]
    fn test_trailing_separator_round_trips() {
        let text = "a: 1\n---\n";
        let documents = parse_documents(text).unwrap();
        assert_eq!(render_documents(&documents).unwrap(), text);
    }

    #[test]
    fn test_empty_document_in_the_middle_round_trips() {
        let text = "a: 1\n---\n---\nb: 2\n";
        let documents = parse_documents(text).unwrap();
        assert_eq!(documents.len(), 3);
        assert_eq!(documents[1], Node::Scalar(Scalar::Null));
        assert_eq!(render_documents(&documents).unwrap(), text);
    }

    #[test]
    fn test_parse_error_reports_document_index() {
        let err = parse_documents("a: 1\n---\nb: [unclosed\n").unwrap_err();
        match err {
            YamlError::Parse { index, .. } => assert_eq!(index, 1),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
