//! Types for the IAM credential report
//!
//! Rows decoded from the credential report CSV, the raw payload returned by
//! the service, and the errors surfaced by a read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Fixed identifier of the singleton report resource
pub const RESOURCE_ID: &str = "iam-credential-report";

/// Name the credential report uses for the root account
pub const ROOT_ACCOUNT_MARKER: &str = "<root_account>";

/// Device name AWS assigns to the root account's virtual MFA device
pub const ROOT_MFA_DEVICE_NAME: &str = "root-account-mfa-device";

/// Default total time budget for the report to become ready
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default wait between "get report" attempts
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Shortest wait between attempts; smaller intervals are raised to this
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Options for a credential report read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    /// Total budget for polling a report that is still being generated
    pub timeout: Duration,
    /// Fixed wait between polling attempts
    pub poll_interval: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl FetchConfig {
    /// Set the total polling budget
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the wait between attempts (at least `MIN_POLL_INTERVAL`)
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        self
    }
}

/// One access key slot of a report row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKey {
    pub active: bool,
    pub last_used_date: String,
    pub last_rotated: String,
}

/// One user entry of the credential report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    /// IAM user name, or `<root_account>` for the root account
    pub user: String,
    pub password_enabled: bool,
    /// Timestamp string or a sentinel such as `N/A` / `no_information`
    pub password_last_used: String,
    pub password_last_changed: String,
    /// MFA flag as reported in the CSV
    pub mfa_active: bool,
    /// Set when a virtual MFA device is registered for this user
    pub mfa_virtual: bool,
    /// Key slots 1 and 2, always both present
    pub access_keys: [AccessKey; 2],
}

/// Raw report returned by a successful fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPayload {
    /// CSV bytes
    pub content: Vec<u8>,
    /// When the service generated the report
    pub generated_time: Option<DateTime<Utc>>,
}

impl ReportPayload {
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: content.into(),
            generated_time: None,
        }
    }

    pub fn generated_at(mut self, time: DateTime<Utc>) -> Self {
        self.generated_time = Some(time);
        self
    }
}

/// Outcome of a single "get report" attempt
#[derive(Debug)]
pub enum ReportPoll {
    /// Report is available
    Ready(ReportPayload),
    /// Service is still generating the report; retryable
    NotYetReady,
    /// Any other failure; aborts the read
    Fatal(ReportError),
}

/// A registered virtual MFA device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMfaDevice {
    /// ARN of the form `arn:aws:iam::<account-id>:mfa/<name>`
    pub serial_number: String,
}

impl VirtualMfaDevice {
    pub fn new(serial_number: impl Into<String>) -> Self {
        Self {
            serial_number: serial_number.into(),
        }
    }
}

/// Errors that can occur while reading the credential report
#[derive(Debug, Error)]
pub enum ReportError {
    /// GenerateCredentialReport failed
    #[error("Failed to generate credential report: {0}")]
    Generate(String),

    /// GetCredentialReport failed with a non-retryable error
    #[error("Failed to get credential report: {0}")]
    Fetch(String),

    /// ListVirtualMFADevices failed
    #[error("Failed to list virtual MFA devices: {0}")]
    ListMfaDevices(String),

    /// Report was still being generated when the time budget ran out
    #[error("Timed out waiting for credential report after {attempts} attempts ({waited:?})")]
    Timeout { attempts: u32, waited: Duration },

    /// Report header lacks a required column
    #[error("Credential report is missing required column: {0}")]
    MissingColumn(String),

    /// Report body is not valid CSV
    #[error("Malformed credential report CSV: {0}")]
    MalformedCsv(String),

    /// Stored state record does not have the report shape
    #[error("Invalid credential report state: {0}")]
    InvalidState(String),
}

impl From<csv::Error> for ReportError {
    fn from(err: csv::Error) -> Self {
        ReportError::MalformedCsv(err.to_string())
    }
}

impl ReportError {
    /// Whether the error came from one of the external API calls
    pub fn is_api_error(&self) -> bool {
        matches!(
            self,
            ReportError::Generate(_) | ReportError::Fetch(_) | ReportError::ListMfaDevices(_)
        )
    }
}
