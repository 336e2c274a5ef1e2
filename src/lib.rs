//! IAM Credential Report Library
//!
//! Reads the AWS IAM credential report, enriches it with virtual MFA
//! devices and projects it into a declarative state record.

pub mod report;

pub use report::{
    AwsCredentialReportApi, CredentialReportApi, CredentialReportFetcher,
    CredentialReportResource, FetchConfig, ReportError, ReportRow, ResourceState,
};
