use std::fmt;
use std::time::Duration;

use drf_core::error::AppError;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Handle for an OpenAI-compatible HTTP API.
///
/// Built once by the host and passed into every hosted component; there is no
/// process-wide client.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    api_key: String,
    agent: ureq::Agent,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl ApiClient {
    /// Plain `http://` is only accepted for loopback hosts so local
    /// OpenAI-compatible servers work; anything else must be `https://`.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, AppError> {
        Self::with_timeout(base_url, api_key, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, AppError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        validate_base_url(&base_url)?;

        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(AppError::new(
                "AI_CREDENTIAL_MISSING",
                "An API key is required for the hosted model API",
            ));
        }

        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            base_url,
            api_key: api_key.to_string(),
            agent,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` as JSON to `{base_url}/{path}` and decode the JSON reply.
    /// Failures carry `code`; HTTP status and body go into `details`.
    pub(crate) fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        code: &str,
        what: &str,
    ) -> Result<R, AppError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let payload = serde_json::to_value(body).map_err(|e| {
            AppError::new(code, format!("Failed to encode {what} request")).with_details(e.to_string())
        })?;

        tracing::debug!(url = %url, "calling hosted API");
        let resp = self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(payload);

        match resp {
            Ok(r) => r.into_json::<R>().map_err(|e| {
                AppError::new(code, format!("Failed to decode {what} response"))
                    .with_details(e.to_string())
            }),
            Err(ureq::Error::Status(status, r)) => {
                let body = r
                    .into_string()
                    .unwrap_or_else(|_| "<body unavailable>".to_string());
                Err(AppError::new(code, format!("{what} request failed"))
                    .with_details(format!("status={status}; body={body}"))
                    .with_retryable(status == 429 || status >= 500))
            }
            Err(e) => Err(
                AppError::new(code, format!("Failed to call {what} endpoint"))
                    .with_details(e.to_string())
                    .with_retryable(true),
            ),
        }
    }
}

fn validate_base_url(base_url: &str) -> Result<(), AppError> {
    let invalid = |why: &str| {
        AppError::new("AI_BASE_URL_INVALID", "Hosted API base URL is not allowed")
            .with_details(format!("base_url={base_url}; {why}"))
    };

    let (secure, rest) = if let Some(rest) = base_url.strip_prefix("https://") {
        (true, rest)
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        (false, rest)
    } else {
        return Err(invalid("scheme must be http or https"));
    };

    // Harden against userinfo and query based tricks.
    if rest.contains(|c| matches!(c, '@' | '?' | '#')) {
        return Err(invalid("userinfo, query and fragment are not allowed"));
    }

    let authority = rest.split('/').next().unwrap_or_default();
    let (host, port) = match authority.rsplit_once(':') {
        // Bracketed IPv6 literal without a port.
        Some((h, _)) if !h.ends_with(']') && h.contains(':') => (authority, None),
        Some((host, port)) => (host, Some(port)),
        None => (authority, None),
    };
    if host.is_empty() {
        return Err(invalid("host is missing"));
    }
    if let Some(port) = port {
        match port.parse::<u16>() {
            Ok(p) if p > 0 => {}
            _ => return Err(invalid("port must be in 1..=65535")),
        }
    }

    if !secure && host != "127.0.0.1" && host != "localhost" && host != "[::1]" {
        return Err(invalid("plain http is only allowed for loopback hosts"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_base_urls() {
        let ok = |u: &str| ApiClient::new(u, "sk-test").is_ok();

        assert!(ok("https://api.openai.com/v1"));
        assert!(ok("https://api.openai.com/v1/")); // trailing slash is trimmed
        assert!(ok("https://llm.internal:8443/v1"));
        assert!(ok("http://127.0.0.1:11434/v1"));
        assert!(ok("http://localhost:8080/v1"));
        assert!(ok("http://[::1]:8080/v1"));

        assert!(!ok("http://example.com/v1"));
        assert!(!ok("ftp://api.openai.com"));
        assert!(!ok("api.openai.com/v1"));
        assert!(!ok("https://"));
        assert!(!ok("https://user@api.openai.com/v1"));
        assert!(!ok("https://api.openai.com/v1?key=1"));
        assert!(!ok("https://api.openai.com/v1#frag"));
        assert!(!ok("http://127.0.0.1.evil.com:11434"));
        assert!(!ok("http://127.0.0.1@evil.com:11434"));
        assert!(!ok("http://127.0.0.1:"));
        assert!(!ok("http://127.0.0.1:0"));
        assert!(!ok("http://127.0.0.1:99999"));
    }

    #[test]
    fn requires_an_api_key() {
        let err = ApiClient::new(DEFAULT_BASE_URL, "   ").unwrap_err();
        assert_eq!(err.code, "AI_CREDENTIAL_MISSING");
    }

    #[test]
    fn debug_output_redacts_the_key() {
        let client = ApiClient::new(DEFAULT_BASE_URL, "sk-secret").expect("client");
        let dbg = format!("{client:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("https://api.openai.com/v1"));
    }
}
