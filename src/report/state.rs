//! State Record Projection
//!
//! Flattens report rows into the generic nested key/value shape stored in a
//! declarative state record, and reads that shape back.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::types::{AccessKey, ReportError, ReportRow};

/// State record of the singleton report resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Fixed resource identifier once created or imported
    pub id: Option<String>,
    /// Computed report, one object per row
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Vec<Value>>,
}

impl ResourceState {
    /// State for an imported resource; the next read fills `report`
    pub fn imported(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            report: None,
        }
    }

    /// Rows stored in this state, if any
    pub fn rows(&self) -> Result<Vec<ReportRow>, ReportError> {
        match &self.report {
            Some(report) => expand_credential_report(report),
            None => Ok(Vec::new()),
        }
    }
}

/// Project rows into state objects, preserving order
pub fn flatten_credential_report(report: &[ReportRow]) -> Vec<Value> {
    report
        .iter()
        .map(|row| {
            json!({
                "user": row.user,
                "password_enabled": row.password_enabled,
                "password_last_used": row.password_last_used,
                "password_last_changed": row.password_last_changed,
                "mfa_active": row.mfa_active,
                "mfa_virtual": row.mfa_virtual,
                "access_keys": flatten_access_keys(&row.access_keys),
            })
        })
        .collect()
}

fn flatten_access_keys(access_keys: &[AccessKey]) -> Vec<Value> {
    access_keys
        .iter()
        .map(|key| {
            json!({
                "active": key.active,
                "last_used_date": key.last_used_date,
                "last_rotated": key.last_rotated,
            })
        })
        .collect()
}

/// Read state objects back into rows.
///
/// Fails when an element lacks a field, has the wrong type, or does not
/// carry exactly two access keys.
pub fn expand_credential_report(report: &[Value]) -> Result<Vec<ReportRow>, ReportError> {
    report
        .iter()
        .enumerate()
        .map(|(i, value)| {
            ReportRow::deserialize(value)
                .map_err(|e| ReportError::InvalidState(format!("report[{}]: {}", i, e)))
        })
        .collect()
}
