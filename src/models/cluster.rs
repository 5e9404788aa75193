use serde::Deserialize;

/// Physical compute cluster backing a workspace, resolved once per
/// connection and immutable for the connection's lifetime.
#[derive(Debug, Clone, Deserialize)]
pub struct Cluster {
    /// Hostname queries are POSTed to (`https://{cluster_fqdn}/webapi/xmla`).
    #[serde(rename = "clusterFQDN")]
    pub cluster_fqdn: String,

    /// Server name carried in the `x-ms-xmlaserver` header.
    #[serde(rename = "coreServerName")]
    pub core_server_name: String,
}
