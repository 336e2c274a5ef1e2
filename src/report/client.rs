//! IAM Report API
//!
//! Capability trait for the three IAM calls a credential report read makes,
//! and the AWS SDK implementation of it.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_iam::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_iam::operation::get_credential_report::GetCredentialReportError;
use aws_sdk_iam::Client as IamClient;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::types::{ReportError, ReportPayload, ReportPoll, VirtualMfaDevice};

/// Error code IAM returns while a report is still being generated
const REPORT_IN_PROGRESS: &str = "ReportInProgress";

/// External calls needed to read the credential report
#[async_trait]
pub trait CredentialReportApi: Send + Sync {
    /// Start (or restart) asynchronous report generation
    async fn generate_credential_report(&self) -> Result<(), ReportError>;

    /// Attempt to fetch the generated report
    async fn get_credential_report(&self) -> ReportPoll;

    /// List every registered virtual MFA device
    async fn list_virtual_mfa_devices(&self) -> Result<Vec<VirtualMfaDevice>, ReportError>;
}

/// Credential report API backed by the AWS IAM SDK client
#[derive(Clone)]
pub struct AwsCredentialReportApi {
    client: IamClient,
}

impl AwsCredentialReportApi {
    /// Create from a loaded SDK configuration
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: IamClient::new(config),
        }
    }

    /// Wrap an existing IAM client
    pub fn from_client(client: IamClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CredentialReportApi for AwsCredentialReportApi {
    async fn generate_credential_report(&self) -> Result<(), ReportError> {
        let output = self
            .client
            .generate_credential_report()
            .send()
            .await
            .map_err(|e| ReportError::Generate(DisplayErrorContext(&e).to_string()))?;

        debug!(
            state = ?output.state(),
            description = output.description().unwrap_or_default(),
            "Credential report generation requested"
        );
        Ok(())
    }

    async fn get_credential_report(&self) -> ReportPoll {
        match self.client.get_credential_report().send().await {
            Ok(output) => {
                let generated_time = output
                    .generated_time()
                    .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()));
                let content = output.content.map(|blob| blob.into_inner()).unwrap_or_default();

                ReportPoll::Ready(ReportPayload {
                    content,
                    generated_time,
                })
            }
            Err(err) => {
                let in_progress = err.as_service_error().is_some_and(is_report_in_progress);
                if in_progress {
                    ReportPoll::NotYetReady
                } else {
                    ReportPoll::Fatal(ReportError::Fetch(DisplayErrorContext(&err).to_string()))
                }
            }
        }
    }

    async fn list_virtual_mfa_devices(&self) -> Result<Vec<VirtualMfaDevice>, ReportError> {
        let devices = self
            .client
            .list_virtual_mfa_devices()
            .into_paginator()
            .items()
            .send()
            .collect::<Result<Vec<_>, _>>()
            .await
            .map_err(|e| ReportError::ListMfaDevices(DisplayErrorContext(&e).to_string()))?;

        Ok(devices
            .iter()
            .map(|device| VirtualMfaDevice::new(device.serial_number()))
            .collect())
    }
}

fn is_report_in_progress(err: &GetCredentialReportError) -> bool {
    err.is_credential_report_not_ready_exception() || err.code() == Some(REPORT_IN_PROGRESS)
}

/// Load the shared AWS configuration, optionally pinning region and profile.
pub async fn load_sdk_config(region: Option<String>, profile: Option<String>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }
    if let Some(region) = region {
        loader = loader.region(Region::new(region));
    }

    loader.load().await
}
