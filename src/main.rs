//! IAM Credential Report - Standalone Binary
//!
//! Generates the AWS IAM credential report, waits for it, flags users with
//! virtual MFA devices and prints the resulting state record.
//!
//! ## Usage
//!
//! ```bash
//! # Print a summary table using the default credential chain
//! iam-credential-report
//!
//! # Print the state record as JSON for a specific profile
//! iam-credential-report --profile audit --output json
//!
//! # Allow the report up to five minutes to generate
//! iam-credential-report --timeout-secs 300 --poll-interval-secs 5
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use iam_credential_report::report::{
    load_sdk_config, AwsCredentialReportApi, CredentialReportFetcher, CredentialReportResource,
    FetchConfig, ReportRow, ResourceState,
};
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// IAM Credential Report - fetch and flatten the AWS IAM credential report
#[derive(Parser, Debug)]
#[command(name = "iam-credential-report", version, about)]
struct Args {
    /// AWS region (IAM is global; the region only selects the endpoint)
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Named AWS profile to load credentials from
    #[arg(long, env = "AWS_PROFILE")]
    profile: Option<String>,

    /// Total seconds to wait for the report to be generated
    #[arg(long, default_value = "60", env = "REPORT_TIMEOUT_SECS")]
    timeout_secs: u64,

    /// Seconds between "get report" attempts
    #[arg(long, default_value = "2", env = "REPORT_POLL_INTERVAL_SECS")]
    poll_interval_secs: u64,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable table
    Text,
    /// State record as JSON
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging (stderr keeps stdout clean for the report)
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    info!(
        region = ?args.region,
        profile = ?args.profile,
        "Starting IAM credential report"
    );

    let sdk_config = load_sdk_config(args.region.clone(), args.profile.clone()).await;
    let fetch_config = FetchConfig::default()
        .timeout(Duration::from_secs(args.timeout_secs))
        .poll_interval(Duration::from_secs(args.poll_interval_secs));

    let resource = CredentialReportResource::new(CredentialReportFetcher::new(
        AwsCredentialReportApi::new(&sdk_config),
        fetch_config,
    ));

    let mut state = ResourceState::default();
    resource
        .create(&mut state)
        .await
        .context("Failed to read IAM credential report")?;

    match args.output {
        OutputFormat::Text => {
            let rows = state.rows().context("Failed to read back report state")?;
            print_table(&rows);
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&state).context("Failed to serialize state")?
            );
        }
    }

    Ok(())
}

fn print_table(rows: &[ReportRow]) {
    println!(
        "\n{:<32} {:<8} {:<26} {:<6} {:<8} {:<6} {:<6}",
        "USER", "PASSWORD", "PASSWORD LAST USED", "MFA", "VIRTUAL", "KEY 1", "KEY 2"
    );
    println!("{}", "-".repeat(100));

    for row in rows {
        println!(
            "{:<32} {:<8} {:<26} {:<6} {:<8} {:<6} {:<6}",
            truncate(&row.user, 32),
            yes_no(row.password_enabled),
            truncate(&row.password_last_used, 26),
            yes_no(row.mfa_active),
            yes_no(row.mfa_virtual),
            yes_no(row.access_keys[0].active),
            yes_no(row.access_keys[1].active),
        );
    }

    info!("Listed {} users", rows.len());
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let kept: String = s.chars().take(max - 3).collect();
        format!("{}...", kept)
    } else {
        s.to_string()
    }
}
