use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contract::{ChangeSet, FunctionName, OperationOutcome, ReconciliationResult};
use crate::error::DeployError;

pub const REPORT_SCHEMA_VERSION: &str = "v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReport {
    pub name: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Serializable breakdown of a settled run, written once by the entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub schema_version: String,
    pub started_at: String,
    pub finished_at: String,
    pub succeeded: usize,
    pub failed: usize,
    pub created: Vec<ItemReport>,
    pub updated: Vec<ItemReport>,
    pub deleted: Vec<ItemReport>,
}

impl RunReport {
    pub fn from_result(
        change_set: &ChangeSet,
        result: &ReconciliationResult,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let created = item_reports(&change_set.created, &result.created, |deployed| {
            Some(deployed.arn.clone())
        });
        let updated = item_reports(&change_set.updated, &result.updated, |_| None);
        let deleted = item_reports(&change_set.deleted, &result.deleted, |_| None);

        let failed = result.failure_count();
        let total = created.len() + updated.len() + deleted.len();
        Self {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            started_at: started_at.to_rfc3339(),
            finished_at: finished_at.to_rfc3339(),
            succeeded: total - failed,
            failed,
            created,
            updated,
            deleted,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

fn item_reports<T>(
    names: &[FunctionName],
    outcomes: &[OperationOutcome<T>],
    arn: impl Fn(&T) -> Option<String>,
) -> Vec<ItemReport> {
    names
        .iter()
        .zip(outcomes)
        .map(|(name, outcome)| match outcome {
            OperationOutcome::Success(value) => ItemReport {
                name: name.to_string(),
                status: ItemStatus::Success,
                arn: arn(value),
                error_kind: None,
                platform_error_kind: None,
                error: None,
            },
            OperationOutcome::Failure(error) => failure_report(name, error),
        })
        .collect()
}

fn failure_report(name: &FunctionName, error: &DeployError) -> ItemReport {
    ItemReport {
        name: name.to_string(),
        status: ItemStatus::Failure,
        arn: None,
        error_kind: Some(error.kind().to_string()),
        platform_error_kind: error
            .platform_error()
            .map(|source| source.kind.as_str().to_string()),
        error: Some(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::{json, Value};

    use super::*;
    use crate::contract::DeployedFunction;
    use crate::error::{PlatformError, PlatformErrorKind};

    fn name(raw: &str) -> FunctionName {
        FunctionName::parse(raw).expect("valid name")
    }

    #[test]
    fn report_serializes_mixed_outcomes() {
        let change_set = ChangeSet::new(vec![name("fn-a"), name("fn-c")], vec![], vec![name("fn-b")]);
        let result = ReconciliationResult {
            created: vec![
                OperationOutcome::Success(DeployedFunction {
                    name: "fn-a".to_string(),
                    arn: "arn:aws:lambda:us-east-1:123456789012:function:fn-a".to_string(),
                }),
                OperationOutcome::Failure(DeployError::RoleCreation {
                    role_name: "fn-c-ExecRole".to_string(),
                    source: PlatformError::new(PlatformErrorKind::AlreadyExists, "exists"),
                }),
            ],
            updated: vec![],
            deleted: vec![OperationOutcome::Success(name("fn-b"))],
        };
        let at = Utc.with_ymd_and_hms(2026, 2, 14, 0, 0, 0).unwrap();

        let report = RunReport::from_result(&change_set, &result, at, at);
        let value: Value = serde_json::to_value(&report).expect("report should serialize");

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert!(report.has_failures());
        assert_eq!(
            value["created"][0],
            json!({
                "name": "fn-a",
                "status": "success",
                "arn": "arn:aws:lambda:us-east-1:123456789012:function:fn-a"
            })
        );
        assert_eq!(value["created"][1]["error_kind"], "role_creation");
        assert_eq!(value["created"][1]["platform_error_kind"], "already_exists");
        assert_eq!(value["deleted"][0], json!({"name": "fn-b", "status": "success"}));
        assert_eq!(value["started_at"], "2026-02-14T00:00:00+00:00");
    }
}
