use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::config::Settings;
use crate::error::CatalogError;

/// Fixed-pause retry: up to `max_attempts` tries, `pause` between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_attempts: settings.max_retries.max(1),
            pause: settings.retry_pause(),
        }
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or the
    /// attempts are used up. `op` receives the 1-based attempt number.
    /// `label` names the request in logs and must not carry credentials.
    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T, CatalogError>
    where
        F: FnMut(u32) -> Result<T, CatalogError>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    debug!(
                        request = label,
                        attempt,
                        max_attempts,
                        error = %err,
                        "transient failure, retrying"
                    );
                    thread::sleep(self.pause);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

pub fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            pause: Duration::ZERO,
        }
    }

    fn unavailable() -> CatalogError {
        CatalogError::HttpStatus {
            status: 503,
            message: "busy".to_string(),
        }
    }

    #[test]
    fn retries_transient_failures_until_success() {
        let mut calls = 0;
        let value = policy(5)
            .run("test", |attempt| {
                calls += 1;
                if attempt < 3 { Err(unavailable()) } else { Ok(attempt) }
            })
            .unwrap();
        assert_eq!(value, 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut calls = 0;
        let err = policy(4)
            .run::<(), _>("test", |_| {
                calls += 1;
                Err(unavailable())
            })
            .unwrap_err();
        assert_matches!(err, CatalogError::HttpStatus { status: 503, .. });
        assert_eq!(calls, 4);
    }

    #[test]
    fn permanent_failures_are_not_retried() {
        let mut calls = 0;
        let err = policy(5)
            .run::<(), _>("test", |_| {
                calls += 1;
                Err(CatalogError::HttpStatus {
                    status: 404,
                    message: "gone".to_string(),
                })
            })
            .unwrap_err();
        assert_matches!(err, CatalogError::HttpStatus { status: 404, .. });
        assert_eq!(calls, 1);
    }

    #[test]
    fn retryable_statuses() {
        for status in [429, 500, 502, 503, 504] {
            assert!(is_retryable_status(status));
        }
        for status in [200, 400, 401, 404, 501] {
            assert!(!is_retryable_status(status));
        }
    }

    #[test]
    fn default_policy_matches_settings() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.pause, Duration::from_secs(5));
    }
}
