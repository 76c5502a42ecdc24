//! Plumbing shared by the upstream clients: URL building, bearer auth, and
//! status checks.

use reqwest::{RequestBuilder, Response, Url};
use tracing::warn;

use crate::error::{RelayError, Result};

/// Appends path segments to `base`, percent-encoding each one.
///
/// `join_url("https://api.openai.com/v1", &["chat", "completions"])`
/// yields `https://api.openai.com/v1/chat/completions`.
pub fn join_url(base: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| RelayError::Configuration(format!("invalid base URL {}: {}", base, e)))?;
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            RelayError::Configuration(format!("base URL cannot carry a path: {}", base))
        })?;
        path.pop_if_empty();
        path.extend(segments);
    }
    Ok(url)
}

pub fn bearer(builder: RequestBuilder, api_key: &str) -> RequestBuilder {
    builder.header("Authorization", format!("Bearer {}", api_key))
}

/// Passes successful responses through; turns anything else into
/// [`RelayError::Upstream`] carrying the status and body text.
pub async fn check_status(service: &'static str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            warn!(service, status = status.as_u16(), error = %e, "failed to read upstream error body");
            format!("<unreadable body: {}>", e)
        }
    };
    warn!(service, status = status.as_u16(), body = %body, "upstream returned error status");
    Err(RelayError::upstream(service, status.as_u16(), body))
}
