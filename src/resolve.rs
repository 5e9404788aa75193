//! Workspace, token and cluster resolution.
//!
//! Three strictly ordered network calls turn a logical workspace
//! reference into a physical XMLA endpoint:
//!
//! 1. workspace lookup by catalog name
//! 2. analysis-service token for that workspace/capacity
//! 3. cluster resolution against the capacity host
//!
//! Each step is fatal on failure and nothing is retried; the caller
//! must re-invoke `open()` from scratch.

use crate::connection_string::ConnectionDescriptor;
use crate::error::{Result, XmlaLinkError};
use crate::models::{Cluster, Token, Workspace, WorkspaceListResponse};
use crate::transport::HttpTransport;
use log::debug;
use serde_json::json;
use url::Url;

/// Look up the workspace named by the descriptor's catalog.
///
/// A workspace without a capacity URI is not on dedicated capacity and
/// cannot serve XMLA traffic; that is a terminal failure, not a
/// retryable one.
pub async fn resolve_workspace(
    transport: &HttpTransport,
    descriptor: &ConnectionDescriptor,
) -> Result<Workspace> {
    let url = format!(
        "https://{}/v1.0/myorg/groups?$filter=name eq '{}'",
        descriptor.root_host, descriptor.catalog
    );
    debug!("[XMLA_RESOLVE] Resolving workspace '{}'", descriptor.catalog);

    let body = transport.get_json(&url, descriptor.token.as_ref()).await?;
    let list: WorkspaceListResponse = serde_json::from_value(body)?;

    let workspace = list.value.into_iter().next().ok_or_else(|| {
        XmlaLinkError::Resolution(format!("workspace '{}' not found", descriptor.catalog))
    })?;

    if workspace.capacity_uri.is_none() {
        return Err(XmlaLinkError::Resolution(format!(
            "workspace '{}' is not on dedicated capacity",
            workspace.name
        )));
    }

    debug!("[XMLA_RESOLVE] Workspace resolved: id={} sku={}", workspace.id, workspace.capacity_sku);
    Ok(workspace)
}

/// Mint an analysis-service token scoped to the workspace/capacity.
pub async fn acquire_analysis_token(
    transport: &HttpTransport,
    descriptor: &ConnectionDescriptor,
    workspace: &Workspace,
) -> Result<Token> {
    let url = format!(
        "https://{}/metadata/v201606/generateastoken",
        descriptor.root_host
    );
    let body = json!({
        "capacityObjectId": workspace.capacity_object_id,
        "workspaceObjectId": workspace.id,
    });
    debug!("[XMLA_RESOLVE] Acquiring analysis token for workspace {}", workspace.id);

    let response = transport
        .post_buffered(&url, body.to_string(), descriptor.token.as_ref(), &[])
        .await?
        .into_json()?;

    let token = response
        .get("Token")
        .and_then(|t| t.as_str())
        .ok_or_else(|| {
            XmlaLinkError::Resolution("analysis-token response carried no 'Token' field".to_string())
        })?;

    Ok(Token::mwc(token))
}

/// Resolve the physical cluster behind the workspace's capacity.
///
/// The call is tagged with the connection's request id for server-side
/// correlation.
pub async fn resolve_cluster(
    transport: &HttpTransport,
    workspace: &Workspace,
    token: &Token,
    request_id: &str,
) -> Result<Cluster> {
    let capacity_uri = workspace
        .capacity_uri
        .as_deref()
        .ok_or_else(|| XmlaLinkError::Resolution("workspace has no capacity URI".to_string()))?;

    let capacity_host = Url::parse(capacity_uri)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .ok_or_else(|| {
            XmlaLinkError::Resolution(format!("capacity URI '{}' has no host", capacity_uri))
        })?;

    let url = format!("https://{}/webapi/clusterResolve", capacity_host);
    let body = json!({
        "serverName": workspace.capacity_object_id,
        "premiumPublicXmlaEndpoint": true,
    });
    let headers = vec![("x-ms-parent-activity-id".to_string(), request_id.to_string())];
    debug!("[XMLA_RESOLVE] Resolving cluster via {}", capacity_host);

    let response = transport
        .post_buffered(&url, body.to_string(), Some(token), &headers)
        .await?
        .into_json()?;

    let cluster: Cluster = serde_json::from_value(response)?;
    debug!("[XMLA_RESOLVE] Cluster resolved: {}", cluster.cluster_fqdn);
    Ok(cluster)
}
