use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::DeployError;

pub const MAX_FUNCTION_NAME_LEN: usize = 64;

/// Name of a function on the compute platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct FunctionName(String);

impl FunctionName {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(ValidationError::new("function names must be non-empty"));
        }
        if name.len() > MAX_FUNCTION_NAME_LEN {
            return Err(ValidationError::new(format!(
                "function name '{name}' exceeds {MAX_FUNCTION_NAME_LEN} characters"
            )));
        }
        if let Some(invalid) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(ValidationError::new(format!(
                "function name '{name}' contains invalid character '{invalid}'"
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FunctionName {
    type Error = ValidationError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl std::fmt::Display for FunctionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Change-set as decoded from the automation input. Missing lists are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSetRequest {
    #[serde(default)]
    pub created: Vec<String>,
    #[serde(default)]
    pub updated: Vec<String>,
    #[serde(default)]
    pub deleted: Vec<String>,
}

/// Validated change-set. Immutable for the duration of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub created: Vec<FunctionName>,
    pub updated: Vec<FunctionName>,
    pub deleted: Vec<FunctionName>,
}

impl ChangeSet {
    pub fn new(
        created: Vec<FunctionName>,
        updated: Vec<FunctionName>,
        deleted: Vec<FunctionName>,
    ) -> Self {
        Self {
            created,
            updated,
            deleted,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }
}

pub fn normalize_change_set(request: ChangeSetRequest) -> Result<ChangeSet, ValidationError> {
    Ok(ChangeSet {
        created: parse_names("created", &request.created)?,
        updated: parse_names("updated", &request.updated)?,
        deleted: parse_names("deleted", &request.deleted)?,
    })
}

pub fn parse_change_set(raw: &str) -> Result<ChangeSet, ValidationError> {
    let request: ChangeSetRequest = serde_json::from_str(raw)
        .map_err(|error| ValidationError::new(format!("Malformed change-set: {error}")))?;
    normalize_change_set(request)
}

fn parse_names(list: &str, raw: &[String]) -> Result<Vec<FunctionName>, ValidationError> {
    raw.iter()
        .map(|name| {
            FunctionName::parse(name)
                .map_err(|error| ValidationError::new(format!("{list}: {}", error.message())))
        })
        .collect()
}

/// Positions of names that already appeared earlier in `names`.
pub(crate) fn repeated_positions(names: &[FunctionName]) -> HashSet<usize> {
    let mut seen = HashSet::new();
    names
        .iter()
        .enumerate()
        .filter_map(|(index, name)| (!seen.insert(name)).then_some(index))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageArtifact {
    pub source_path: PathBuf,
    pub artifact_path: PathBuf,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionIdentity {
    pub function_name: FunctionName,
    pub role_name: String,
    pub role_arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedFunction {
    pub name: String,
    pub arn: String,
}

/// Settled result of one per-item operation.
#[derive(Debug)]
pub enum OperationOutcome<T> {
    Success(T),
    Failure(DeployError),
}

impl<T> OperationOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&DeployError> {
        match self {
            Self::Success(_) => None,
            Self::Failure(error) => Some(error),
        }
    }
}

impl<T> From<Result<T, DeployError>> for OperationOutcome<T> {
    fn from(result: Result<T, DeployError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(error) => Self::Failure(error),
        }
    }
}

/// Settled output of one run. Index `i` of each list matches index `i` of
/// the corresponding change-set list.
#[derive(Debug, Default)]
pub struct ReconciliationResult {
    pub created: Vec<OperationOutcome<DeployedFunction>>,
    pub updated: Vec<OperationOutcome<()>>,
    pub deleted: Vec<OperationOutcome<FunctionName>>,
}

impl ReconciliationResult {
    pub fn failure_count(&self) -> usize {
        self.created.iter().filter(|o| !o.is_success()).count()
            + self.updated.iter().filter(|o| !o.is_success()).count()
            + self.deleted.iter().filter(|o| !o.is_success()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.failure_count() > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}
