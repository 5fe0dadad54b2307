//! Schema-free YAML documents.
//!
//! A manifest file is a stream of documents. Each document is parsed into a
//! [`Node`] tree, edited through path lookups, and rendered back with the
//! other documents in their original order.

pub mod codec;
pub mod error;
pub mod node;

pub use codec::{parse_documents, render_documents};
pub use error::YamlError;
pub use node::{Node, Scalar};
