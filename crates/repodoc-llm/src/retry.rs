use std::future::Future;
use std::time::Duration;

use crate::error::LlmError;
use crate::http::status_error;

const BASE_BACKOFF_MS: u64 = 500;

/// Honour `Retry-After` (seconds) when present, otherwise back off exponentially.
pub(crate) fn retry_delay(response: &reqwest::Response, attempt: u32) -> Duration {
    if let Some(val) = response.headers().get("retry-after")
        && let Ok(s) = val.to_str()
        && let Ok(secs) = s.parse::<u64>()
    {
        return Duration::from_secs(secs);
    }
    backoff(attempt)
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(BASE_BACKOFF_MS.saturating_mul(1u64 << attempt.min(16)))
}

/// Send a request, retrying up to `max_retries` times while the failure is transient.
///
/// Transient means [`LlmError::is_transient`]: transport errors, 429 and 5xx.
/// With `max_retries == 0` this is a single attempt. The final response is
/// returned even when its status is retryable so the caller can classify it.
///
/// # Errors
///
/// Returns `LlmError::Http` if the request cannot be sent on the last attempt.
pub(crate) async fn send_with_retry<F, Fut>(
    provider_name: &str,
    max_retries: u32,
    mut f: F,
) -> Result<reqwest::Response, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut attempt = 0;
    loop {
        let (reason, delay) = match f().await {
            Ok(response) => {
                let status = response.status();
                let transient = status_error(provider_name, status)
                    .is_some_and(|e| e.is_transient());
                if !transient || attempt >= max_retries {
                    return Ok(response);
                }
                (status.to_string(), retry_delay(&response, attempt))
            }
            Err(e) => {
                let err = LlmError::Http(e);
                if !err.is_transient() || attempt >= max_retries {
                    return Err(err);
                }
                (err.to_string(), backoff(attempt))
            }
        };

        tracing::warn!(
            provider = provider_name,
            %reason,
            attempt = attempt + 1,
            max_retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "retrying request"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
