//! Shared HTTP client construction and response status classification.

use std::time::Duration;

use reqwest::StatusCode;

use crate::error::{LlmError, Result};

/// Create the HTTP client shared by all remote providers.
///
/// Config: 30s connect timeout, 120s request timeout, rustls TLS,
/// `repodoc/{version}` user-agent, redirect limit 10. Callers still bound each
/// collaborator call with their own timeout.
#[must_use]
pub fn default_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(120))
        .user_agent(concat!("repodoc/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("falling back to default HTTP client: {e}");
            reqwest::Client::new()
        })
}

/// Map a non-success status to the error taxonomy, logging the body.
///
/// # Errors
///
/// Returns `Auth` for 401/403, `RateLimited` for 429 and `Service` otherwise.
pub(crate) fn check_status(provider: &str, status: StatusCode, body: &str) -> Result<()> {
    match status_error(provider, status) {
        None => Ok(()),
        Some(err) => {
            tracing::error!(provider, %status, "API error: {body}");
            Err(err)
        }
    }
}

/// Error for a non-success status, `None` on success.
pub(crate) fn status_error(provider: &str, status: StatusCode) -> Option<LlmError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Auth {
            provider: provider.to_owned(),
            status: status.as_u16(),
        },
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited,
        _ => LlmError::Service {
            provider: provider.to_owned(),
            status: status.as_u16(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_passes() {
        assert!(check_status("openai", StatusCode::OK, "").is_ok());
    }

    #[test]
    fn unauthorized_maps_to_auth() {
        let err = check_status("voyage", StatusCode::UNAUTHORIZED, "bad key").unwrap_err();
        assert!(matches!(err, LlmError::Auth { status: 401, .. }));
    }

    #[test]
    fn too_many_requests_maps_to_rate_limited() {
        let err = check_status("openai", StatusCode::TOO_MANY_REQUESTS, "").unwrap_err();
        assert!(matches!(err, LlmError::RateLimited));
    }

    #[test]
    fn server_error_maps_to_service() {
        let err = check_status("openai", StatusCode::BAD_GATEWAY, "").unwrap_err();
        assert!(matches!(err, LlmError::Service { status: 502, .. }));
    }
}
