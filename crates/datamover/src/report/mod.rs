//! Operation outcome reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::OperationKind;
use crate::error::{MoverError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    Success,
    Failed,
    Skipped,
}

/// Result of one unit of work (a table, a dump, a provisioning step).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitOutcome {
    pub name: String,
    pub status: UnitStatus,
    pub rows: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub duration_ms: u64,
}

impl UnitOutcome {
    pub fn success(name: impl Into<String>, rows: u64, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            status: UnitStatus::Success,
            rows,
            message: None,
            duration_ms,
        }
    }

    pub fn failed(name: impl Into<String>, message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            status: UnitStatus::Failed,
            rows: 0,
            message: Some(message.into()),
            duration_ms,
        }
    }

    pub fn skipped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: UnitStatus::Skipped,
            rows: 0,
            message: Some("cancelled before start".to_string()),
            duration_ms: 0,
        }
    }
}

/// Full report for one operation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationReport {
    /// Unique id for this invocation, for correlating logs and reports.
    pub run_id: Uuid,
    pub operation: OperationKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub units: Vec<UnitOutcome>,
}

impl OperationReport {
    pub fn new(
        operation: OperationKind,
        started_at: DateTime<Utc>,
        units: Vec<UnitOutcome>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            operation,
            started_at,
            finished_at: Utc::now(),
            units,
        }
    }

    /// True when every unit succeeded.
    pub fn is_success(&self) -> bool {
        self.units.iter().all(|u| u.status == UnitStatus::Success)
    }

    pub fn total_rows(&self) -> u64 {
        self.units.iter().map(|u| u.rows).sum()
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        let mut ok = 0;
        let mut failed = 0;
        let mut skipped = 0;
        for unit in &self.units {
            match unit.status {
                UnitStatus::Success => ok += 1,
                UnitStatus::Failed => failed += 1,
                UnitStatus::Skipped => skipped += 1,
            }
        }
        (ok, failed, skipped)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(MoverError::Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_fails_when_any_unit_fails() {
        let report = OperationReport::new(
            OperationKind::StagingToProcess,
            Utc::now(),
            vec![
                UnitOutcome::success("public.users", 10, 5),
                UnitOutcome::failed("public.orders", "row count mismatch", 7),
            ],
        );
        assert!(!report.is_success());
        assert_eq!(report.counts(), (1, 1, 0));
        assert_eq!(report.total_rows(), 10);
    }

    #[test]
    fn report_serializes_to_json() {
        let report = OperationReport::new(
            OperationKind::BackupRunner,
            Utc::now(),
            vec![UnitOutcome::skipped("public.events")],
        );
        let json = report.to_json().unwrap();
        assert!(json.contains("\"backup_runner\""));
        assert!(json.contains("\"skipped\""));
    }
}
