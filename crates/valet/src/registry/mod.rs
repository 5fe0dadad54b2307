//! Chart version registry collaborator.
//!
//! Given a chart repository URL and a chart name, a [`ChartRegistry`]
//! returns every version string the repository publishes. The list is
//! unordered and may contain values that do not parse as versions.

pub mod error;
pub mod helm;
pub mod index;
pub mod static_index;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use error::{RegistryError, Result};
pub use helm::HelmRepositoryRegistry;
pub use index::{ChartVersion, IndexFile};
pub use static_index::StaticIndexRegistry;

#[async_trait]
pub trait ChartRegistry: Send + Sync {
    /// Lists the published versions of `chart` in `repository`.
    async fn list_versions(
        &self,
        repository: &str,
        chart: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>>;
}
