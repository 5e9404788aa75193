//! Connection-string parsing.
//!
//! A connection string is a semicolon-delimited list of `Key=Value`
//! segments, e.g.:
//!
//! ```text
//! Data Source=powerbi://cluster.example.com/Sales;Catalog=Sales;Password=eyJ...;LocaleIdentifier=1033
//! ```
//!
//! `Password` carries a bearer token, not a literal password. Unknown
//! keys are ignored; malformed segments are skipped.

use crate::error::{Result, XmlaLinkError};
use crate::models::Token;
use url::Url;

/// Default locale identifier (en-US) when `LocaleIdentifier` is absent.
const DEFAULT_LOCALE: &str = "1033";

/// The only data source scheme this client speaks.
const SUPPORTED_SCHEME: &str = "powerbi";

/// Parsed, immutable connection descriptor. Built once and owned
/// exclusively by the [`Connection`](crate::Connection).
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    /// Full `Data Source` URL as supplied.
    pub data_source: String,
    /// Host component of the data source URL.
    pub root_host: String,
    /// First path segment of the data source URL (may be empty).
    pub database: String,
    /// Scheme of the data source URL (always `powerbi` today).
    pub connection_type: String,
    /// Catalog (workspace) name used for workspace resolution.
    pub catalog: String,
    /// Locale identifier forwarded in the session properties.
    pub locale: String,
    /// Caller-supplied bearer token from the `Password` key.
    pub token: Option<Token>,
}

impl ConnectionDescriptor {
    /// Parse a semicolon-delimited connection string.
    ///
    /// Fails when `Data Source` is missing, is not a valid URL, or its
    /// scheme is not supported. All other problems (unknown keys,
    /// segments without exactly one `=`) are silently skipped.
    pub fn parse(connection_string: &str) -> Result<Self> {
        let mut data_source: Option<String> = None;
        let mut catalog = String::new();
        let mut locale = DEFAULT_LOCALE.to_string();
        let mut token: Option<Token> = None;

        for segment in connection_string.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let parts: Vec<&str> = segment.split('=').collect();
            if parts.len() != 2 {
                // Not exactly one '=': skip, not an error.
                log::debug!("[CONN_STRING] Skipping malformed segment");
                continue;
            }
            let key = parts[0].trim();
            let value = parts[1].trim();

            match key {
                "Data Source" => data_source = Some(value.to_string()),
                "Catalog" => catalog = value.to_string(),
                "Password" => token = Some(Token::bearer(value)),
                "LocaleIdentifier" => locale = value.to_string(),
                _ => {
                    log::debug!("[CONN_STRING] Ignoring unrecognized key '{}'", key);
                },
            }
        }

        let data_source = data_source.ok_or_else(|| {
            XmlaLinkError::ConnectionString("missing required key 'Data Source'".to_string())
        })?;

        let url = Url::parse(&data_source).map_err(|e| {
            XmlaLinkError::ConnectionString(format!("'Data Source' is not a valid URL: {}", e))
        })?;

        let connection_type = url.scheme().to_string();
        if connection_type != SUPPORTED_SCHEME {
            return Err(XmlaLinkError::ConnectionString(format!(
                "unsupported data source scheme '{}' (expected '{}')",
                connection_type, SUPPORTED_SCHEME
            )));
        }

        let root_host = url
            .host_str()
            .ok_or_else(|| {
                XmlaLinkError::ConnectionString("'Data Source' URL has no host".to_string())
            })?
            .to_string();

        let database = url
            .path()
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            data_source,
            root_host,
            database,
            connection_type,
            catalog,
            locale,
            token,
        })
    }
}
