//! Report Polling
//!
//! Waits for an asynchronously generated credential report. Only the
//! "still generating" signal is retried; the loop never starts an attempt
//! that would finish waiting past the configured budget, and an attempt
//! still in flight at the deadline is abandoned.

use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info};

use super::client::CredentialReportApi;
use super::types::{FetchConfig, ReportError, ReportPayload, ReportPoll, MIN_POLL_INTERVAL};

/// Poll `get_credential_report` until the report is ready, a fatal error
/// occurs, or the time budget in `config` runs out.
pub async fn wait_for_report<A>(api: &A, config: &FetchConfig) -> Result<ReportPayload, ReportError>
where
    A: CredentialReportApi + ?Sized,
{
    let start = Instant::now();
    let poll_interval = config.poll_interval.max(MIN_POLL_INTERVAL);
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;

        let remaining = config.timeout.saturating_sub(start.elapsed());
        let poll = match timeout(remaining, api.get_credential_report()).await {
            Ok(poll) => poll,
            Err(_) => {
                let waited = start.elapsed();
                debug!(attempts = attempts, "Credential report attempt exceeded the deadline");
                return Err(ReportError::Timeout { attempts, waited });
            }
        };

        match poll {
            ReportPoll::Ready(payload) => {
                info!(
                    attempts = attempts,
                    bytes = payload.content.len(),
                    generated_time = ?payload.generated_time,
                    "Credential report ready"
                );
                return Ok(payload);
            }
            ReportPoll::Fatal(err) => {
                debug!(attempts = attempts, error = %err, "Credential report fetch failed");
                return Err(err);
            }
            ReportPoll::NotYetReady => {
                let waited = start.elapsed();
                if waited.saturating_add(poll_interval) > config.timeout {
                    return Err(ReportError::Timeout { attempts, waited });
                }

                if attempts % 10 == 1 {
                    debug!(attempt = attempts, "Credential report still being generated");
                }
                sleep(poll_interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::types::VirtualMfaDevice;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves scripted poll results, then `NotYetReady` forever
    struct ScriptedApi {
        polls: Mutex<VecDeque<ReportPoll>>,
        calls: Mutex<u32>,
        latency: Duration,
    }

    impl ScriptedApi {
        fn new(polls: Vec<ReportPoll>) -> Self {
            Self {
                polls: Mutex::new(polls.into()),
                calls: Mutex::new(0),
                latency: Duration::ZERO,
            }
        }

        fn latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl CredentialReportApi for ScriptedApi {
        async fn generate_credential_report(&self) -> Result<(), ReportError> {
            Ok(())
        }

        async fn get_credential_report(&self) -> ReportPoll {
            *self.calls.lock().unwrap() += 1;
            if !self.latency.is_zero() {
                sleep(self.latency).await;
            }
            self.polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(ReportPoll::NotYetReady)
        }

        async fn list_virtual_mfa_devices(&self) -> Result<Vec<VirtualMfaDevice>, ReportError> {
            Ok(Vec::new())
        }
    }

    fn config() -> FetchConfig {
        FetchConfig::default()
            .timeout(Duration::from_secs(10))
            .poll_interval(Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_first_attempt() {
        let generated = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let api = ScriptedApi::new(vec![ReportPoll::Ready(
            ReportPayload::new("user\n").generated_at(generated),
        )]);

        let payload = wait_for_report(&api, &config()).await.unwrap();
        assert_eq!(payload.content, b"user\n");
        assert_eq!(payload.generated_time, Some(generated));
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_retries() {
        let api = ScriptedApi::new(vec![
            ReportPoll::NotYetReady,
            ReportPoll::NotYetReady,
            ReportPoll::NotYetReady,
            ReportPoll::Ready(ReportPayload::new("user\n")),
        ]);
        let start = Instant::now();

        let payload = wait_for_report(&api, &config()).await.unwrap();
        assert_eq!(payload.content, b"user\n");
        assert_eq!(api.calls(), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_when_never_ready() {
        let api = ScriptedApi::new(Vec::new());
        let start = Instant::now();

        let err = wait_for_report(&api, &config()).await.unwrap_err();
        match err {
            ReportError::Timeout { attempts, waited } => {
                assert_eq!(attempts, 11);
                assert_eq!(waited, Duration::from_secs(10));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        // No attempt is issued past the deadline
        assert_eq!(api.calls(), 11);
        assert!(start.elapsed() <= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let api = ScriptedApi::new(vec![
            ReportPoll::NotYetReady,
            ReportPoll::Fatal(ReportError::Fetch("AccessDenied".to_string())),
            ReportPoll::Ready(ReportPayload::new("user\n")),
        ]);

        let err = wait_for_report(&api, &config()).await.unwrap_err();
        assert!(matches!(err, ReportError::Fetch(ref m) if m == "AccessDenied"));
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_makes_single_attempt() {
        let api = ScriptedApi::new(Vec::new());
        let config = config().timeout(Duration::ZERO);

        let err = wait_for_report(&api, &config).await.unwrap_err();
        assert!(matches!(err, ReportError::Timeout { attempts: 1, .. }));
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_attempt_times_out_at_deadline() {
        let api = ScriptedApi::new(vec![ReportPoll::Ready(ReportPayload::new("user\n"))])
            .latency(Duration::from_secs(300));
        let start = Instant::now();

        let err = wait_for_report(&api, &config()).await.unwrap_err();
        match err {
            ReportError::Timeout { attempts, waited } => {
                assert_eq!(attempts, 1);
                assert_eq!(waited, Duration::from_secs(10));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempts_count_against_budget() {
        let api = ScriptedApi::new(vec![
            ReportPoll::NotYetReady,
            ReportPoll::NotYetReady,
            ReportPoll::Ready(ReportPayload::new("user\n")),
        ])
        .latency(Duration::from_secs(4));

        let start = Instant::now();

        // Attempts end at 4s and 9s; the third starts at 10s and is cut off
        let err = wait_for_report(&api, &config()).await.unwrap_err();
        assert!(matches!(err, ReportError::Timeout { attempts: 3, .. }));
        assert_eq!(api.calls(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped() {
        let api = ScriptedApi::new(Vec::new());
        let config = FetchConfig {
            timeout: Duration::from_secs(1),
            poll_interval: Duration::ZERO,
        };

        let err = wait_for_report(&api, &config).await.unwrap_err();
        assert!(matches!(err, ReportError::Timeout { attempts: 11, .. }));
        assert_eq!(api.calls(), 11);
    }
}
