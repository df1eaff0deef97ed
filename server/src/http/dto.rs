use rest_store::ListOptions;
use serde::{Deserialize, Serialize};

/// Query parameters accepted by list and watch endpoints
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub label_selector: Option<String>,
    pub resource_version: Option<String>,
}

impl ListParams {
    pub fn into_options(self) -> ListOptions {
        ListOptions {
            label_selector: self.label_selector.filter(|s| !s.is_empty()),
            resource_version: self.resource_version.filter(|rv| !rv.is_empty()),
        }
    }
}

/// Response of `GET /health`
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: String,
}
