//! Session-scoped XMLA connection.
//!
//! A [`Connection`] owns the parsed descriptor and, once opened, the
//! resolved cluster/token/session triple. The state machine is
//! `Closed -> Connecting -> Open`, with `Open <-> Executing` around
//! buffered calls, `Fetching` while a streamed response is being
//! issued, and `Broken` as the terminal failure state. One in-flight
//! operation at a time; concurrent misuse is a caller error.

use crate::connection_string::ConnectionDescriptor;
use crate::envelope;
use crate::error::{Result, XmlaLinkError};
use crate::models::{Cluster, Row, Token, Workspace};
use crate::resolve;
use crate::rowset;
use crate::transport::HttpTransport;
use log::{debug, info, warn};
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
    Executing,
    Fetching,
    Broken,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Closed => "Closed",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Open => "Open",
            ConnectionState::Executing => "Executing",
            ConnectionState::Fetching => "Fetching",
            ConnectionState::Broken => "Broken",
        };
        f.write_str(name)
    }
}

/// Session-scoped fields, write-once per open cycle. Bundled in one
/// struct so they cannot be read before `open()` succeeds.
#[derive(Debug, Clone)]
struct SessionContext {
    workspace: Workspace,
    cluster: Cluster,
    analysis_token: Token,
    session_id: String,
}

/// A stateful XMLA connection to an analytical engine.
///
/// # Examples
///
/// ```rust,no_run
/// use xmla_link::Connection;
///
/// # async fn example() -> xmla_link::Result<()> {
/// let mut conn = Connection::from_connection_string(
///     "Data Source=powerbi://api.example.com/Sales;Catalog=Sales;Password=eyJhbGc...",
/// )?;
/// conn.open().await?;
/// let rows = conn.execute_query("EVALUATE Sales").await?;
/// conn.close().await;
/// # Ok(())
/// # }
/// ```
pub struct Connection {
    descriptor: ConnectionDescriptor,
    transport: HttpTransport,
    /// Process-unique correlation id, generated at construction.
    request_id: String,
    state: ConnectionState,
    session: Option<SessionContext>,
}

impl Connection {
    /// Build a connection from a semicolon-delimited connection string.
    ///
    /// Parsing happens eagerly; an unsupported scheme fails here,
    /// before any network activity.
    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        let descriptor = ConnectionDescriptor::parse(connection_string)?;
        Ok(Self {
            descriptor,
            transport: HttpTransport::new()?,
            request_id: Uuid::new_v4().to_string(),
            state: ConnectionState::Closed,
            session: None,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Server-assigned session id, available once `open()` succeeds.
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id.as_str())
    }

    /// Resolve workspace, token and cluster, then begin a session.
    ///
    /// Valid only from `Closed`; calling `open()` on an already-open
    /// connection is a caller error. Any failure resets the connection
    /// to `Closed` with no partial state and propagates the cause.
    pub async fn open(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Closed => {},
            ConnectionState::Open | ConnectionState::Executing | ConnectionState::Fetching => {
                return Err(XmlaLinkError::InvalidState("already open".to_string()));
            },
            other => {
                return Err(XmlaLinkError::InvalidState(format!(
                    "cannot open from state {}",
                    other
                )));
            },
        }

        self.state = ConnectionState::Connecting;
        match self.open_inner().await {
            Ok(session) => {
                info!(
                    "[XMLA_SESSION] Session {} open for workspace '{}' on {}",
                    session.session_id, session.workspace.name, session.cluster.cluster_fqdn
                );
                self.session = Some(session);
                self.state = ConnectionState::Open;
                Ok(())
            },
            Err(e) => {
                self.session = None;
                self.state = ConnectionState::Closed;
                Err(e)
            },
        }
    }

    async fn open_inner(&mut self) -> Result<SessionContext> {
        let workspace = resolve::resolve_workspace(&self.transport, &self.descriptor).await?;
        let analysis_token =
            resolve::acquire_analysis_token(&self.transport, &self.descriptor, &workspace).await?;
        let cluster = resolve::resolve_cluster(
            &self.transport,
            &workspace,
            &analysis_token,
            &self.request_id,
        )
        .await?;

        let envelope = envelope::begin_session(&self.request_id, &self.descriptor.locale);
        let response = self
            .transport
            .post_buffered(
                &Self::xmla_url(&cluster),
                envelope,
                Some(&analysis_token),
                &self.xmla_headers(&cluster),
            )
            .await?
            .into_text();

        let session_id = extract_session_id(&response).ok_or_else(|| XmlaLinkError::Protocol {
            description: "session-begin response carried no session id".to_string(),
            code: "session".to_string(),
        })?;

        Ok(SessionContext {
            workspace,
            cluster,
            analysis_token,
            session_id,
        })
    }

    /// Execute a query inside the open session and return the raw XML
    /// response text. Valid only from `Open`.
    pub async fn execute(&mut self, query: &str) -> Result<String> {
        let session = self.require_open("execute")?.clone();
        self.state = ConnectionState::Executing;

        let envelope = envelope::command_with_session(
            &session.session_id,
            &self.request_id,
            &self.descriptor.locale,
            query,
        );
        let result = self
            .transport
            .post_buffered(
                &Self::xmla_url(&session.cluster),
                envelope,
                Some(&session.analysis_token),
                &self.xmla_headers(&session.cluster),
            )
            .await;

        match result {
            Ok(response) => {
                self.state = ConnectionState::Open;
                Ok(response.into_text())
            },
            Err(e) => {
                self.state = ConnectionState::Broken;
                Err(e)
            },
        }
    }

    /// Execute a query and hand back the live response stream, meant
    /// to be fed straight into the rowset parser. Valid only from
    /// `Open`; the connection returns to `Open` once the stream is
    /// handed out (one in-flight read at a time is a caller contract).
    pub async fn execute_stream(&mut self, query: &str) -> Result<reqwest::Response> {
        let session = self.require_open("executeStream")?.clone();
        self.state = ConnectionState::Fetching;

        let envelope = envelope::command_with_session(
            &session.session_id,
            &self.request_id,
            &self.descriptor.locale,
            query,
        );
        let result = self
            .transport
            .post_stream(
                &Self::xmla_url(&session.cluster),
                envelope,
                Some(&session.analysis_token),
                &self.xmla_headers(&session.cluster),
            )
            .await;

        match result {
            Ok(response) => {
                self.state = ConnectionState::Open;
                Ok(response)
            },
            Err(e) => {
                self.state = ConnectionState::Broken;
                Err(e)
            },
        }
    }

    /// Execute a query and materialize the parsed rowset.
    pub async fn execute_query(&mut self, query: &str) -> Result<Vec<Row>> {
        let response = self.execute(query).await?;
        rowset::parse_rowset(&response)
    }

    /// Execute a query and stream parsed rows as they arrive.
    pub async fn execute_query_stream(
        &mut self,
        query: &str,
    ) -> Result<mpsc::Receiver<Result<Row>>> {
        let response = self.execute_stream(query).await?;
        Ok(rowset::stream_rowset(response.bytes_stream()))
    }

    /// End the session and transition to `Closed`.
    ///
    /// Teardown is best-effort: a server-side failure to end the
    /// session is logged and swallowed, since the client is discarding
    /// the connection regardless. A no-op unless currently `Open`.
    pub async fn close(&mut self) {
        if self.state != ConnectionState::Open {
            debug!("[XMLA_SESSION] close() in state {} is a no-op", self.state);
            return;
        }
        if let Some(session) = self.session.take() {
            let envelope = envelope::end_session(
                &session.session_id,
                &self.request_id,
                &self.descriptor.locale,
            );
            let result = self
                .transport
                .post_buffered(
                    &Self::xmla_url(&session.cluster),
                    envelope,
                    Some(&session.analysis_token),
                    &self.xmla_headers(&session.cluster),
                )
                .await;
            if let Err(e) = result {
                warn!("[XMLA_SESSION] Session teardown failed (ignored): {}", e);
            } else {
                info!("[XMLA_SESSION] Session {} closed", session.session_id);
            }
        }
        self.state = ConnectionState::Closed;
    }

    fn require_open(&self, operation: &str) -> Result<&SessionContext> {
        if self.state != ConnectionState::Open {
            return Err(XmlaLinkError::InvalidState(format!(
                "{} requires an open connection (state is {})",
                operation, self.state
            )));
        }
        self.session.as_ref().ok_or_else(|| {
            XmlaLinkError::InvalidState("connection has no session context".to_string())
        })
    }

    fn xmla_url(cluster: &Cluster) -> String {
        format!("https://{}/webapi/xmla", cluster.cluster_fqdn)
    }

    /// Fixed header set for XMLA POSTs: correlation, capability
    /// negotiation, continuation acceptance, and fresh per-call
    /// registration/round-trip ids.
    fn xmla_headers(&self, cluster: &Cluster) -> Vec<(String, String)> {
        vec![
            ("Content-Type".to_string(), "text/xml".to_string()),
            ("X-AS-AcquireTokenStats".to_string(), "tokenProvided".to_string()),
            ("x-ms-parent-activity-id".to_string(), self.request_id.clone()),
            ("x-ms-xmlaserver".to_string(), cluster.core_server_name.clone()),
            ("x-ms-xmlacaps-negotiation-flags".to_string(), "0,0,0,0,0".to_string()),
            ("x-ms-accepts-continuations".to_string(), "1".to_string()),
            ("x-ms-xmladedicatedconnection".to_string(), "1".to_string()),
            ("x-ms-xmlaregistrationid".to_string(), Uuid::new_v4().to_string()),
            ("x-ms-roundtrip-id".to_string(), Uuid::new_v4().to_string()),
        ]
    }
}

/// Scrape the server-assigned session id out of the session-begin
/// response XML. The attribute casing varies, so the scan is
/// case-insensitive on `SessionId="`.
fn extract_session_id(xml: &str) -> Option<String> {
    let lower = xml.to_ascii_lowercase();
    let needle = "sessionid=\"";
    let start = lower.find(needle)? + needle.len();
    let end = start + lower[start..].find('"')?;
    if start == end {
        return None;
    }
    Some(xml[start..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONN_STR: &str =
        "Data Source=powerbi://api.example.com/Sales;Catalog=Sales;Password=tok123";

    fn open_connection() -> Connection {
        let mut conn = Connection::from_connection_string(CONN_STR).unwrap();
        conn.session = Some(SessionContext {
            workspace: serde_json::from_str(r#"{"id": "ws-1", "name": "Sales"}"#).unwrap(),
            cluster: Cluster {
                cluster_fqdn: "cluster.example.net".to_string(),
                core_server_name: "core-1".to_string(),
            },
            analysis_token: Token::mwc("mwc-token"),
            session_id: "sess-1".to_string(),
        });
        conn.state = ConnectionState::Open;
        conn
    }

    #[test]
    fn construction_fails_on_bad_connection_string() {
        assert!(Connection::from_connection_string("Catalog=Sales").is_err());
        assert!(Connection::from_connection_string(
            "Data Source=asazure://h.example.com/s;Catalog=Sales"
        )
        .is_err());
    }

    #[test]
    fn new_connection_starts_closed() {
        let conn = Connection::from_connection_string(CONN_STR).unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(conn.session_id().is_none());
    }

    #[tokio::test]
    async fn execute_before_open_is_an_invalid_state() {
        let mut conn = Connection::from_connection_string(CONN_STR).unwrap();
        let err = conn.execute("EVALUATE T").await.unwrap_err();
        assert!(matches!(err, XmlaLinkError::InvalidState(_)));
        // Still Closed, not Broken: the call never left the client.
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn execute_stream_before_open_is_an_invalid_state() {
        let mut conn = Connection::from_connection_string(CONN_STR).unwrap();
        assert!(matches!(
            conn.execute_stream("EVALUATE T").await.unwrap_err(),
            XmlaLinkError::InvalidState(_)
        ));
    }

    #[tokio::test]
    async fn open_twice_fails_without_rerunning_resolution() {
        let mut conn = open_connection();
        let err = conn.open().await.unwrap_err();
        assert!(err.to_string().contains("already open"));
        // The session survives the rejected second open.
        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(conn.session_id(), Some("sess-1"));
    }

    #[tokio::test]
    async fn close_when_not_open_is_a_noop() {
        let mut conn = Connection::from_connection_string(CONN_STR).unwrap();
        conn.close().await;
        assert_eq!(conn.state(), ConnectionState::Closed);

        let mut broken = Connection::from_connection_string(CONN_STR).unwrap();
        broken.state = ConnectionState::Broken;
        broken.close().await;
        assert_eq!(broken.state(), ConnectionState::Broken);
    }

    #[test]
    fn session_id_scrape_handles_casing() {
        let xml = r#"<Envelope><Header><Session SessionId="ABC-123"/></Header></Envelope>"#;
        assert_eq!(extract_session_id(xml).as_deref(), Some("ABC-123"));

        let xml = r#"<return><root sessionid="xyz"/></return>"#;
        assert_eq!(extract_session_id(xml).as_deref(), Some("xyz"));

        assert!(extract_session_id("<Envelope/>").is_none());
        assert!(extract_session_id(r#"<Session SessionId=""/>"#).is_none());
    }

    #[test]
    fn xmla_headers_include_fixed_set_with_fresh_ids() {
        let conn = open_connection();
        let cluster = Cluster {
            cluster_fqdn: "c.example.net".to_string(),
            core_server_name: "core-7".to_string(),
        };
        let headers = conn.xmla_headers(&cluster);
        let get = |key: &str| {
            headers
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(get("Content-Type"), "text/xml");
        assert_eq!(get("x-ms-xmlaserver"), "core-7");
        assert_eq!(get("x-ms-accepts-continuations"), "1");

        // Registration ids are fresh per call.
        let second = conn.xmla_headers(&cluster);
        let reg = |set: &[(String, String)]| {
            set.iter()
                .find(|(k, _)| k == "x-ms-xmlaregistrationid")
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_ne!(reg(&headers), reg(&second));
    }
}
