use serde::Deserialize;

/// A workspace as returned by the workspace metadata service.
///
/// `capacity_uri` is `None` when the workspace is not backed by
/// dedicated capacity; the XMLA protocol cannot proceed in that case
/// and `open()` fails terminally.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub capacity_sku: String,
    #[serde(default)]
    pub capacity_object_id: Option<String>,
    #[serde(default)]
    pub capacity_uri: Option<String>,
}

/// Wrapper for the OData-style list returned by the workspace lookup.
#[derive(Debug, Deserialize)]
pub struct WorkspaceListResponse {
    pub value: Vec<Workspace>,
}
