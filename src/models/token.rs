/// Scheme used when rendering a token into an `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenScheme {
    /// Standard bearer token (caller-supplied identity).
    Bearer,
    /// Analysis-service token minted for a specific workspace/capacity.
    MwcToken,
}

impl TokenScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenScheme::Bearer => "Bearer",
            TokenScheme::MwcToken => "MwcToken",
        }
    }
}

/// A short-lived access token together with its header scheme.
///
/// Three independent tokens exist per session: the caller-supplied
/// bearer token, the derived analysis-service token, and (outside this
/// library) the refresh chain that produced the bearer token. Tokens
/// are never refreshed here; an expired token is a session-open failure.
#[derive(Debug, Clone)]
pub struct Token {
    pub access_token: String,
    pub scheme: TokenScheme,
}

impl Token {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self { access_token: access_token.into(), scheme: TokenScheme::Bearer }
    }

    pub fn mwc(access_token: impl Into<String>) -> Self {
        Self { access_token: access_token.into(), scheme: TokenScheme::MwcToken }
    }

    /// Render the `Authorization` header value, e.g. `Bearer eyJhbGc...`.
    pub fn authorization_value(&self) -> String {
        format!("{} {}", self.scheme.as_str(), self.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_value_includes_scheme() {
        let t = Token::bearer("tok123");
        assert_eq!(t.authorization_value(), "Bearer tok123");

        let t = Token::mwc("abc");
        assert_eq!(t.authorization_value(), "MwcToken abc");
    }
}
