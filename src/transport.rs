//! HTTP transport for resolution and XMLA calls.
//!
//! Two entry points: a buffered POST that collects the whole body (and
//! JSON-decodes it when the response says `application/json`), and a
//! streaming POST that resolves as soon as headers arrive and hands
//! back the live response. No retries, no pagination, no timeouts;
//! higher layers own those policies.

use crate::error::{Result, XmlaLinkError};
use crate::models::Token;
use log::{debug, warn};
use std::time::Instant;

/// A fully buffered response body.
#[derive(Debug)]
pub enum BufferedResponse {
    /// Body decoded from an `application/json` response.
    Json(serde_json::Value),
    /// Raw body text for any other content type.
    Text(String),
}

impl BufferedResponse {
    pub fn into_json(self) -> Result<serde_json::Value> {
        match self {
            BufferedResponse::Json(value) => Ok(value),
            BufferedResponse::Text(text) => Ok(serde_json::from_str(&text)?),
        }
    }

    pub fn into_text(self) -> String {
        match self {
            BufferedResponse::Json(value) => value.to_string(),
            BufferedResponse::Text(text) => text,
        }
    }
}

/// Thin wrapper over a pooled `reqwest::Client`.
#[derive(Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        // Keep-alive pooling; no request timeout here, callers wrap
        // their own cancellation around open()/execute().
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .build()
            .map_err(|e| XmlaLinkError::Configuration(e.to_string()))?;
        Ok(Self { http_client })
    }

    /// Issue a GET and JSON-decode the response.
    pub async fn get_json(
        &self,
        url: &str,
        token: Option<&Token>,
    ) -> Result<serde_json::Value> {
        let start = Instant::now();
        debug!("[XMLA_HTTP] GET {}", url);

        let mut req = self.http_client.get(url);
        if let Some(token) = token {
            req = req.header("Authorization", token.authorization_value());
        }
        let response = req.send().await?;
        let status = response.status();
        debug!("[XMLA_HTTP] Response: status={} duration_ms={}", status, start.elapsed().as_millis());

        if !status.is_success() {
            return Err(Self::status_error(status, response).await);
        }
        Ok(response.json().await?)
    }

    /// Issue a POST and buffer the full response body.
    ///
    /// Attaches `Authorization: {scheme} {token}` when a token is
    /// supplied and defaults `Content-Type` to `application/json`
    /// unless the extra headers override it.
    pub async fn post_buffered(
        &self,
        url: &str,
        body: String,
        token: Option<&Token>,
        headers: &[(String, String)],
    ) -> Result<BufferedResponse> {
        let start = Instant::now();
        debug!("[XMLA_HTTP] POST {} (buffered, {} byte body)", url, body.len());

        let response = self.build_post(url, body, token, headers).send().await?;
        let status = response.status();
        debug!("[XMLA_HTTP] Response: status={} duration_ms={}", status, start.elapsed().as_millis());

        if !status.is_success() {
            return Err(Self::status_error(status, response).await);
        }

        let is_json = response
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("application/json"))
            .unwrap_or(false);

        if is_json {
            Ok(BufferedResponse::Json(response.json().await?))
        } else {
            Ok(BufferedResponse::Text(response.text().await?))
        }
    }

    /// Issue a POST and resolve at response headers, handing back the
    /// live response for incremental consumption.
    ///
    /// A 401 is surfaced as [`XmlaLinkError::Unauthorized`] so callers
    /// know to re-authenticate rather than retry.
    pub async fn post_stream(
        &self,
        url: &str,
        body: String,
        token: Option<&Token>,
        headers: &[(String, String)],
    ) -> Result<reqwest::Response> {
        let start = Instant::now();
        debug!("[XMLA_HTTP] POST {} (streaming, {} byte body)", url, body.len());

        let response = self.build_post(url, body, token, headers).send().await?;
        let status = response.status();
        debug!("[XMLA_HTTP] Headers received: status={} duration_ms={}", status, start.elapsed().as_millis());

        if status.as_u16() == 401 {
            warn!("[XMLA_HTTP] Access token rejected (401)");
            return Err(XmlaLinkError::Unauthorized(
                "access token rejected, re-authenticate and retry".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(Self::status_error(status, response).await);
        }
        Ok(response)
    }

    fn build_post(
        &self,
        url: &str,
        body: String,
        token: Option<&Token>,
        headers: &[(String, String)],
    ) -> reqwest::RequestBuilder {
        let mut req = self.http_client.post(url);
        if let Some(token) = token {
            req = req.header("Authorization", token.authorization_value());
        }
        if !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-type")) {
            req = req.header("Content-Type", "application/json");
        }
        for (key, value) in headers {
            req = req.header(key.as_str(), value.as_str());
        }
        req.body(body)
    }

    async fn status_error(status: reqwest::StatusCode, response: reqwest::Response) -> XmlaLinkError {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        warn!("[XMLA_HTTP] Server error: status={} message=\"{}\"", status, message);
        XmlaLinkError::Server {
            status_code: status.as_u16(),
            message,
        }
    }
}
