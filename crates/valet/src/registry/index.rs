//! Helm repository `index.yaml` model.
//!
//! Only the fields version resolution needs are typed; the rest of each
//! entry is ignored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFile {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub entries: BTreeMap<String, Vec<ChartVersion>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<String>,
}

/// One published version of a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartVersion {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
}

impl ChartVersion {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            app_version: None,
            deprecated: None,
            urls: Vec::new(),
        }
    }
}

impl IndexFile {
    pub fn parse(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Version strings published for `chart`, in index order.
    pub fn versions(&self, chart: &str) -> Option<Vec<String>> {
        self.entries
            .get(chart)
            .map(|entries| entries.iter().map(|e| e.version.clone()).collect())
    }

    /// Adds a version entry for `chart`.
    pub fn push(&mut self, chart: &str, version: &str) {
        self.entries
            .entry(chart.to_string())
            .or_default()
            .push(ChartVersion::new(chart, version));
    }
}
