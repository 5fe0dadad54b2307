//! Order-preserving, schema-free YAML node tree.
//!
//! Manifests are only inspected at a handful of fixed paths, so documents are
//! kept as a tagged union instead of being deserialized into structs. Mapping
//! entries keep their insertion order so an untouched document renders back
//! the way it was read.

use serde_yaml::{Mapping, Number, Value};

use super::error::YamlError;

/// A scalar leaf, also used as a mapping key.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl Scalar {
    /// Returns the string value, if this is a string scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Number(n) => Value::Number(n.clone()),
            Scalar::String(s) => Value::String(s.clone()),
        }
    }

    fn describe(&self) -> String {
        match self {
            Scalar::Null => "null".to_string(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Number(n) => n.to_string(),
            Scalar::String(s) => s.clone(),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

/// One node of a YAML document.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Mapping with entries in document order.
    Map(Vec<(Scalar, Node)>),
    Sequence(Vec<Node>),
    Scalar(Scalar),
    /// A node carrying an explicit YAML tag such as `!Ref`.
    Tagged { tag: String, value: Box<Node> },
}

impl Node {
    /// An empty mapping.
    pub fn map() -> Self {
        Node::Map(Vec::new())
    }

    /// A string scalar.
    pub fn string(value: impl Into<String>) -> Self {
        Node::Scalar(Scalar::String(value.into()))
    }

    /// Returns the string value, if this is a string scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Scalar(s) => s.as_str(),
            _ => None,
        }
    }

    /// Returns the mapping entries, if this is a mapping.
    pub fn as_map(&self) -> Option<&[(Scalar, Node)]> {
        match self {
            Node::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Looks up a direct child of a mapping by string key.
    pub fn child(&self, key: &str) -> Option<&Node> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    fn child_mut(&mut self, key: &str) -> Option<&mut Node> {
        match self {
            Node::Map(entries) => entries
                .iter_mut()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Follows a path of mapping keys.
    pub fn get(&self, path: &[&str]) -> Option<&Node> {
        path.iter().try_fold(self, |node, key| node.child(key))
    }

    /// Mutable variant of [`Node::get`].
    pub fn get_mut(&mut self, path: &[&str]) -> Option<&mut Node> {
        path.iter().try_fold(self, |node, key| node.child_mut(key))
    }

    /// Returns the string at `path`, if the path exists and holds a string.
    pub fn get_str(&self, path: &[&str]) -> Option<&str> {
        self.get(path)?.as_str()
    }

    /// Sets the value at `path`, returning the previous value if there was one.
    ///
    /// An existing key is replaced in place, keeping its position. Missing
    /// keys are appended, creating intermediate mappings as needed.
    pub fn set(&mut self, path: &[&str], value: Node) -> Result<Option<Node>, YamlError> {
        let Some((last, parents)) = path.split_last() else {
            return Ok(Some(std::mem::replace(self, value)));
        };

        let mut node = self;
        for key in parents {
            let Node::Map(entries) = node else {
                return Err(YamlError::NotAMap {
                    segment: (*key).to_string(),
                });
            };
            let index = match entries.iter().position(|(k, _)| k.as_str() == Some(*key)) {
                Some(index) => index,
                None => {
                    entries.push((Scalar::from(*key), Node::map()));
                    entries.len() - 1
                }
            };
            node = &mut entries[index].1;
        }

        let Node::Map(entries) = node else {
            return Err(YamlError::NotAMap {
                segment: (*last).to_string(),
            });
        };
        match entries.iter_mut().find(|(k, _)| k.as_str() == Some(*last)) {
            Some((_, slot)) => Ok(Some(std::mem::replace(slot, value))),
            None => {
                entries.push((Scalar::from(*last), value));
                Ok(None)
            }
        }
    }

    /// Converts a parsed `serde_yaml` value into a node tree.
    pub fn from_value(value: Value) -> Result<Self, YamlError> {
        Ok(match value {
            Value::Null => Node::Scalar(Scalar::Null),
            Value::Bool(b) => Node::Scalar(Scalar::Bool(b)),
            Value::Number(n) => Node::Scalar(Scalar::Number(n)),
            Value::String(s) => Node::Scalar(Scalar::String(s)),
            Value::Sequence(items) => Node::Sequence(
                items
                    .into_iter()
                    .map(Node::from_value)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Mapping(mapping) => {
                let mut entries = Vec::with_capacity(mapping.len());
                for (key, value) in mapping {
                    let key = match key {
                        Value::Null => Scalar::Null,
                        Value::Bool(b) => Scalar::Bool(b),
                        Value::Number(n) => Scalar::Number(n),
                        Value::String(s) => Scalar::String(s),
                        other => {
                            return Err(YamlError::UnsupportedKey(format!("{:?}", other)));
                        }
                    };
                    entries.push((key, Node::from_value(value)?));
                }
                Node::Map(entries)
            }
            Value::Tagged(tagged) => Node::Tagged {
                tag: format!("!{}", tagged.tag.to_string().trim_start_matches('!')),
                value: Box::new(Node::from_value(tagged.value)?),
            },
        })
    }

    /// Converts the node tree back into a `serde_yaml` value.
    pub fn to_value(&self) -> Value {
        match self {
            Node::Scalar(s) => s.to_value(),
            Node::Sequence(items) => Value::Sequence(items.iter().map(Node::to_value).collect()),
            Node::Map(entries) => {
                let mut mapping = Mapping::with_capacity(entries.len());
                for (key, value) in entries {
                    mapping.insert(key.to_value(), value.to_value());
                }
                Value::Mapping(mapping)
            }
            Node::Tagged { tag, value } => {
                Value::Tagged(Box::new(serde_yaml::value::TaggedValue {
                    tag: serde_yaml::value::Tag::new(tag.trim_start_matches('!')),
                    value: value.to_value(),
                }))
            }
        }
    }

    /// Short human readable rendering of a scalar, used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Node::Scalar(s) => s.describe(),
            Node::Sequence(_) => "<sequence>".to_string(),
            Node::Map(_) => "<mapping>".to_string(),
            Node::Tagged { tag, .. } => format!("<{}>", tag),
        }
    }
}
