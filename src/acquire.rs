//! Data acquisition: HTTP GET with exponential-backoff retry.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::RetryConfig;
use crate::error::{PipelineError, Result};

/// Bounded retry schedule for [`fetch`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of tries, including the first one
    pub max_attempts: u32,
    /// Wait before the second attempt
    pub initial_wait: Duration,
    /// Factor applied to the wait after every failed attempt
    pub backoff_multiplier: f64,
    /// Timeout of a single request
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_wait: Duration::from_secs(3),
            backoff_multiplier: 2.0,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Upper bound for any single wait or request timeout.
pub const MAX_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Seconds to a `Duration` in `[0, MAX_WAIT]`; NaN and negatives become zero.
fn clamped_secs(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).map_or(MAX_WAIT, |d| d.min(MAX_WAIT))
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.attempts,
            initial_wait: clamped_secs(config.wait_seconds),
            backoff_multiplier: config.wait_multiple,
            timeout: clamped_secs(config.timeout_seconds),
        }
    }
}

impl RetryPolicy {
    /// Wait before 1-based `attempt`: nothing for the first one, then
    /// `initial_wait * multiplier^(attempt - 2)`, capped at [`MAX_WAIT`].
    pub fn wait_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 || self.initial_wait.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
        clamped_secs(self.initial_wait.as_secs_f64() * self.backoff_multiplier.powi(exponent))
    }
}

/// Download `url`, retrying on connection errors, timeouts and non-2xx
/// statuses.
///
/// # Errors
/// * `InvalidInput` when the URL does not start with `http`; no request is made.
/// * `HttpClient` when the client cannot be built; no request is made.
/// * `FetchExhausted` wrapping the last transport error once all attempts fail.
pub fn fetch(url: &str, policy: &RetryPolicy) -> Result<Vec<u8>> {
    if !url.starts_with("http") {
        error!("Invalid URL. URL must start with 'http' or 'https'.");
        return Err(PipelineError::InvalidInput(format!(
            "URL must start with 'http' or 'https', got '{url}'"
        )));
    }
    let attempts = policy.max_attempts.max(1);

    let client = reqwest::blocking::Client::builder()
        .timeout(policy.timeout)
        .build()
        .map_err(|e| {
            error!("Could not build an HTTP client for {}: {}", url, e);
            PipelineError::HttpClient(e)
        })?;

    let mut attempt = 1;
    loop {
        match get_once(&client, url) {
            Ok(body) => {
                info!("Data acquired successfully from {}", url);
                return Ok(body);
            }
            Err(source) if attempt >= attempts => {
                error!(
                    "Failed to acquire data from {} after {} attempts: {}",
                    url, attempts, source
                );
                return Err(PipelineError::FetchExhausted {
                    url: url.to_string(),
                    attempts,
                    source,
                });
            }
            Err(e) => {
                let wait = policy.wait_before(attempt + 1);
                warn!(
                    "Attempt {}/{} failed ({}). Retrying in {:.1} seconds...",
                    attempt,
                    attempts,
                    e,
                    wait.as_secs_f64()
                );
                thread::sleep(wait);
                attempt += 1;
            }
        }
    }
}

fn get_once(client: &reqwest::blocking::Client, url: &str) -> reqwest::Result<Vec<u8>> {
    let response = client.get(url).send()?.error_for_status()?;
    Ok(response.bytes()?.to_vec())
}

/// Write fetched bytes to `path`. Any I/O problem becomes `WriteFailure`.
pub fn write_data<P: AsRef<Path>>(data: &[u8], path: P) -> Result<()> {
    let path = path.as_ref();
    let mut file = File::create(path).map_err(|e| {
        match e.kind() {
            std::io::ErrorKind::NotFound => error!("File '{}' not found.", path.display()),
            std::io::ErrorKind::PermissionDenied => {
                error!("Permission denied to write to '{}'.", path.display())
            }
            _ if path.is_dir() => error!(
                "'{}' is a directory, cannot write data to it.",
                path.display()
            ),
            _ => error!("Failed to write data to '{}': {}.", path.display(), e),
        }
        PipelineError::write(path, e)
    })?;
    file.write_all(data)
        .and_then(|_| file.flush())
        .map_err(|e| PipelineError::write(path, e))
}

/// Fetch `url` and store the bytes at `save_path`.
pub fn acquire_data<P: AsRef<Path>>(url: &str, save_path: P, policy: &RetryPolicy) -> Result<()> {
    let save_path = save_path.as_ref();
    debug!(
        "Acquiring {} (attempts: {}, initial wait: {:?}, multiplier: {})",
        url, policy.max_attempts, policy.initial_wait, policy.backoff_multiplier
    );
    let contents = fetch(url, policy)?;
    write_data(&contents, save_path)?;
    info!("Data written to {}", save_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_wait_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.wait_before(1), Duration::ZERO);
        assert_eq!(policy.wait_before(2), Duration::from_secs(3));
        assert_eq!(policy.wait_before(3), Duration::from_secs(6));
        assert_eq!(policy.wait_before(4), Duration::from_secs(12));
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from(&RetryConfig::default());
        assert_eq!(policy, RetryPolicy::default());
    }

    #[test]
    fn test_long_backoff_is_capped() {
        let config = RetryConfig {
            attempts: 40,
            wait_multiple: 10.0,
            ..RetryConfig::default()
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.wait_before(40), MAX_WAIT);
        assert_eq!(policy.wait_before(u32::MAX), MAX_WAIT);

        let policy = RetryPolicy {
            backoff_multiplier: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.wait_before(2), Duration::from_secs(3));
        assert_eq!(policy.wait_before(3), Duration::ZERO);
    }

    #[test]
    fn test_out_of_range_seconds_do_not_panic() {
        for (wait, timeout) in [
            (f64::INFINITY, f64::INFINITY),
            (f64::NAN, f64::NAN),
            (1e300, 1e300),
            (-5.0, -5.0),
        ] {
            let config = RetryConfig {
                wait_seconds: wait,
                timeout_seconds: timeout,
                ..RetryConfig::default()
            };
            let policy = RetryPolicy::from(&config);
            assert!(policy.initial_wait <= MAX_WAIT);
            assert!(policy.timeout <= MAX_WAIT);
            assert!(policy.wait_before(5) <= MAX_WAIT);
        }
    }

    #[test]
    fn test_client_error_is_not_a_fetch_failure() {
        let source = reqwest::blocking::Client::new()
            .get("not a url")
            .build()
            .unwrap_err();
        let err = PipelineError::HttpClient(source);
        assert!(err.to_string().contains("HTTP client"));
        assert!(!err.to_string().contains("attempts"));
        assert!(!err.is_write_failure());
    }

    #[test]
    fn test_rejects_non_http_url() {
        let result = fetch("ftp://x", &RetryPolicy::default());
        assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn test_write_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clouds.data");
        write_data(b"1 2 3\n", &path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"1 2 3\n");
    }

    #[test]
    fn test_write_data_failures() {
        let dir = tempdir().unwrap();

        let missing = dir.path().join("missing").join("clouds.data");
        assert!(write_data(b"x", &missing).unwrap_err().is_write_failure());

        let is_dir = dir.path().to_path_buf();
        assert!(write_data(b"x", &is_dir).unwrap_err().is_write_failure());
    }
}
