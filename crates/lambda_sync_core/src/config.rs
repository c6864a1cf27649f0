use std::path::{Path, PathBuf};

use crate::contract::FunctionName;
use crate::retry::RetryPolicy;

pub const DEFAULT_SOURCE_ROOT: &str = "REST";
pub const DEFAULT_RUNTIME: &str = "nodejs20.x";
pub const DEFAULT_HANDLER: &str = "index.handler";
pub const DEFAULT_ROLE_SUFFIX: &str = "-ExecRole";
pub const BASIC_EXECUTION_POLICY_ARN: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";
pub const DEFAULT_TRUST_POLICY: &str = include_str!("../../../policies/default.json");

/// Settings shared by every component of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Root supplied by the hosting environment.
    pub workspace: PathBuf,
    /// Directory under `workspace` holding one folder per function.
    pub source_root: String,
    pub runtime: String,
    pub handler: String,
    pub trust_policy_document: String,
    pub baseline_policy_arn: String,
    pub role_suffix: String,
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            source_root: DEFAULT_SOURCE_ROOT.to_string(),
            runtime: DEFAULT_RUNTIME.to_string(),
            handler: DEFAULT_HANDLER.to_string(),
            trust_policy_document: DEFAULT_TRUST_POLICY.to_string(),
            baseline_policy_arn: BASIC_EXECUTION_POLICY_ARN.to_string(),
            role_suffix: DEFAULT_ROLE_SUFFIX.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncConfig {
    pub fn with_workspace(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            ..Self::default()
        }
    }

    pub fn source_dir(&self, function: &FunctionName) -> PathBuf {
        source_dir(&self.workspace, &self.source_root, function)
    }
}

pub fn source_dir(workspace: &Path, source_root: &str, function: &FunctionName) -> PathBuf {
    workspace.join(source_root).join(function.as_str())
}
