//! Error types for the xmla-link client library.

use thiserror::Error;

/// Result type used throughout xmla-link.
pub type Result<T> = std::result::Result<T, XmlaLinkError>;

/// Errors that can occur while talking to an XMLA endpoint.
///
/// The variants follow the lifecycle of a connection: configuration
/// problems surface before any network activity, resolution problems
/// during `open()`, transport and protocol problems during execution.
/// None of these are retried internally.
#[derive(Debug, Error)]
pub enum XmlaLinkError {
    /// The connection string could not be parsed or names an
    /// unsupported data source scheme.
    #[error("invalid connection string: {0}")]
    ConnectionString(String),

    /// Client-side configuration problem outside the connection string.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Workspace, analysis-token or cluster resolution failed.
    /// Fatal to `open()`; no partial state is retained.
    #[error("resolution failed: {0}")]
    Resolution(String),

    /// The server answered with a non-success HTTP status.
    #[error("server error ({status_code}): {message}")]
    Server { status_code: u16, message: String },

    /// The server rejected the access token (HTTP 401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Network-level failure from the HTTP client.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Malformed XML in a response.
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Malformed XML attribute in a response.
    #[error("xml attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    /// A SOAP fault or embedded `<error>` element inside an
    /// otherwise-successful response.
    #[error("protocol error {code}: {description}")]
    Protocol { description: String, code: String },

    /// An operation was invoked from an illegal connection state
    /// (e.g. `execute()` before `open()`).
    #[error("invalid connection state: {0}")]
    InvalidState(String),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
