//! IAM Credential Report
//!
//! Generates the AWS IAM credential report, waits for it to become ready,
//! decodes the CSV into typed rows and marks users that own a virtual MFA
//! device. The result is projected into a state record for a declarative
//! infrastructure engine.
//!
//! ## Example Usage
//!
//! ```ignore
//! use iam_credential_report::report::{
//!     load_sdk_config, AwsCredentialReportApi, CredentialReportFetcher, FetchConfig,
//! };
//!
//! let config = load_sdk_config(None, None).await;
//! let fetcher = CredentialReportFetcher::new(
//!     AwsCredentialReportApi::new(&config),
//!     FetchConfig::default(),
//! );
//!
//! for row in fetcher.fetch().await? {
//!     println!("{} mfa_virtual={}", row.user, row.mfa_virtual);
//! }
//! ```

pub mod client;
pub mod mfa;
pub mod parser;
pub mod poller;
pub mod state;
pub mod types;

pub use client::{load_sdk_config, AwsCredentialReportApi, CredentialReportApi};
pub use state::{expand_credential_report, flatten_credential_report, ResourceState};
pub use types::{
    AccessKey, FetchConfig, ReportError, ReportPayload, ReportPoll, ReportRow, VirtualMfaDevice,
    RESOURCE_ID, ROOT_ACCOUNT_MARKER,
};

use tracing::{debug, info};

/// Reads the credential report through a `CredentialReportApi`
pub struct CredentialReportFetcher<A> {
    api: A,
    config: FetchConfig,
}

impl<A: CredentialReportApi> CredentialReportFetcher<A> {
    pub fn new(api: A, config: FetchConfig) -> Self {
        Self { api, config }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Run a full read: generate, poll, parse, then enrich with virtual MFA.
    ///
    /// Every call regenerates the report; nothing is cached between calls.
    pub async fn fetch(&self) -> Result<Vec<ReportRow>, ReportError> {
        info!(
            timeout = ?self.config.timeout,
            poll_interval = ?self.config.poll_interval,
            "Requesting credential report"
        );
        self.api.generate_credential_report().await?;

        let payload = poller::wait_for_report(&self.api, &self.config).await?;
        debug!(bytes = payload.content.len(), "Parsing credential report");
        let mut rows = parser::parse_credential_report(&payload.content)?;

        let devices = self.api.list_virtual_mfa_devices().await?;
        mfa::apply_virtual_mfa(&mut rows, &devices);

        info!(
            users = rows.len(),
            virtual_mfa = rows.iter().filter(|r| r.mfa_virtual).count(),
            "Credential report read"
        );
        Ok(rows)
    }
}

/// Lifecycle entry points of the singleton report resource
pub struct CredentialReportResource<A> {
    fetcher: CredentialReportFetcher<A>,
}

impl<A: CredentialReportApi> CredentialReportResource<A> {
    pub fn new(fetcher: CredentialReportFetcher<A>) -> Self {
        Self { fetcher }
    }

    /// Assign the fixed id, then read
    pub async fn create(&self, state: &mut ResourceState) -> Result<(), ReportError> {
        state.id = Some(RESOURCE_ID.to_string());
        self.read(state).await
    }

    /// Same as create; the report has no configurable inputs
    pub async fn update(&self, state: &mut ResourceState) -> Result<(), ReportError> {
        self.create(state).await
    }

    /// Replace the stored report with a fresh one. On failure the state is untouched.
    pub async fn read(&self, state: &mut ResourceState) -> Result<(), ReportError> {
        let rows = self.fetcher.fetch().await?;
        state.report = Some(flatten_credential_report(&rows));
        Ok(())
    }

    /// No external call; the report stays with the service
    pub async fn delete(&self, _state: &mut ResourceState) -> Result<(), ReportError> {
        debug!("Delete is a no-op for the credential report");
        Ok(())
    }

    /// Import passes the id through unchanged
    pub fn import(&self, id: &str) -> ResourceState {
        ResourceState::imported(id)
    }
}
