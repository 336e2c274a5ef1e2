//! Virtual MFA Enrichment
//!
//! Resolves virtual MFA device serial numbers to the user names the
//! credential report uses and flags the matching rows.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;

use super::types::{ReportRow, VirtualMfaDevice, ROOT_ACCOUNT_MARKER, ROOT_MFA_DEVICE_NAME};

static MFA_SERIAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^arn:aws:iam::[0-9]+:mfa/(.*)$").expect("virtual MFA serial pattern is valid")
});

/// Extract the report user name from a virtual MFA serial number.
///
/// Returns `None` when the serial is not an IAM MFA ARN.
pub fn account_name_from_serial(serial_number: &str) -> Option<String> {
    let name = MFA_SERIAL.captures(serial_number)?.get(1)?.as_str();

    if name == ROOT_MFA_DEVICE_NAME {
        Some(ROOT_ACCOUNT_MARKER.to_string())
    } else {
        Some(name.to_string())
    }
}

/// Set of report user names that have a virtual MFA device
pub fn accounts_with_virtual_mfa(devices: &[VirtualMfaDevice]) -> HashSet<String> {
    devices
        .iter()
        .filter_map(|device| {
            let name = account_name_from_serial(&device.serial_number);
            if name.is_none() {
                debug!(serial = %device.serial_number, "Skipping unrecognized virtual MFA serial");
            }
            name
        })
        .collect()
}

/// Flag every row whose user owns a virtual MFA device.
///
/// Rows without a device keep their current value.
pub fn apply_virtual_mfa(rows: &mut [ReportRow], devices: &[VirtualMfaDevice]) {
    let accounts = accounts_with_virtual_mfa(devices);

    let mut flagged = 0;
    for row in rows.iter_mut().filter(|row| accounts.contains(&row.user)) {
        row.mfa_virtual = true;
        flagged += 1;
    }

    debug!(
        devices = devices.len(),
        flagged = flagged,
        "Applied virtual MFA devices to report"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(user: &str) -> ReportRow {
        ReportRow {
            user: user.to_string(),
            ..Default::default()
        }
    }

    fn devices(serials: &[&str]) -> Vec<VirtualMfaDevice> {
        serials.iter().map(|s| VirtualMfaDevice::new(*s)).collect()
    }

    #[test]
    fn test_account_name_from_serial() {
        assert_eq!(
            account_name_from_serial("arn:aws:iam::123456789012:mfa/alice"),
            Some("alice".to_string())
        );
        assert_eq!(
            account_name_from_serial("arn:aws:iam::123456789012:mfa/root-account-mfa-device"),
            Some("<root_account>".to_string())
        );
        assert_eq!(account_name_from_serial("not-an-arn"), None);
        assert_eq!(
            account_name_from_serial("arn:aws:iam::acct:mfa/alice"),
            None,
            "account id must be numeric"
        );
        assert_eq!(
            account_name_from_serial("xarn:aws:iam::123456789012:mfa/alice"),
            None,
            "pattern is anchored"
        );
    }

    #[test]
    fn test_name_keeps_path_segments() {
        assert_eq!(
            account_name_from_serial("arn:aws:iam::123456789012:mfa/team/alice"),
            Some("team/alice".to_string())
        );
    }

    #[test]
    fn test_apply_flags_matching_user_only() {
        let mut rows = vec![row("<root_account>"), row("alice"), row("bob")];
        apply_virtual_mfa(&mut rows, &devices(&["arn:aws:iam::123456789012:mfa/alice"]));

        assert!(!rows[0].mfa_virtual);
        assert!(rows[1].mfa_virtual);
        assert!(!rows[2].mfa_virtual);
    }

    #[test]
    fn test_apply_flags_root_account() {
        let mut rows = vec![row("<root_account>"), row("alice")];
        apply_virtual_mfa(
            &mut rows,
            &devices(&["arn:aws:iam::123456789012:mfa/root-account-mfa-device"]),
        );

        assert!(rows[0].mfa_virtual);
        assert!(!rows[1].mfa_virtual);
    }

    #[test]
    fn test_unrecognized_serial_is_skipped() {
        let mut rows = vec![row("alice"), row("not-an-arn")];
        let before = rows.clone();
        apply_virtual_mfa(&mut rows, &devices(&["not-an-arn"]));

        assert_eq!(rows, before);
    }

    #[test]
    fn test_only_iam_serials_are_collected() {
        let accounts = accounts_with_virtual_mfa(&devices(&[
            "arn:aws:iam::123456789012:mfa/alice",
            "not-an-arn",
            "GAHT12345678",
        ]));
        assert_eq!(accounts, HashSet::from(["alice".to_string()]));
    }

    #[test]
    fn test_device_without_report_row_is_ignored() {
        let mut rows = vec![row("alice")];
        apply_virtual_mfa(&mut rows, &devices(&["arn:aws:iam::123456789012:mfa/ghost"]));
        assert!(!rows[0].mfa_virtual);
    }

    #[test]
    fn test_existing_flag_is_preserved() {
        let mut rows = vec![ReportRow {
            mfa_virtual: true,
            ..row("carol")
        }];
        apply_virtual_mfa(&mut rows, &[]);
        assert!(rows[0].mfa_virtual);
    }
}
