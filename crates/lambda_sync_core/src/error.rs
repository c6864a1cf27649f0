use std::path::PathBuf;

use thiserror::Error;

/// Closed classification of errors reported by the remote platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformErrorKind {
    /// Rejected parameter; commonly a role that has not propagated yet.
    InvalidParameterValue,
    AlreadyExists,
    NotFound,
    Throttled,
    Other,
}

impl PlatformErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidParameterValue => "invalid_parameter_value",
            Self::AlreadyExists => "already_exists",
            Self::NotFound => "not_found",
            Self::Throttled => "throttled",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct PlatformError {
    pub kind: PlatformErrorKind,
    pub message: String,
}

impl PlatformError {
    pub fn new(kind: PlatformErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == PlatformErrorKind::InvalidParameterValue
    }
}

/// Per-item failure. Always converted into an `OperationOutcome::Failure`
/// at the item boundary.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("failed to package {function} from {}: {message}", source_path.display())]
    Packaging {
        function: String,
        source_path: PathBuf,
        message: String,
    },

    #[error("failed to create execution role {role_name}: {source}")]
    RoleCreation {
        role_name: String,
        #[source]
        source: PlatformError,
    },

    /// The role exists but has no baseline policy; it is not removed.
    #[error("failed to attach policy to role {role_name}: {source}")]
    PolicyAttach {
        role_name: String,
        #[source]
        source: PlatformError,
    },

    #[error("create function {function} rejected: {source}")]
    DeployRejected {
        function: String,
        #[source]
        source: PlatformError,
    },

    #[error("create function {function} failed after {attempts} attempts: {source}")]
    DeployExhausted {
        function: String,
        attempts: u32,
        #[source]
        source: PlatformError,
    },

    #[error("failed to update function {function}: {source}")]
    Update {
        function: String,
        #[source]
        source: PlatformError,
    },

    #[error("failed to remove function {function}: {source}")]
    Remove {
        function: String,
        #[source]
        source: PlatformError,
    },

    #[error("skipped {function}: {reason}")]
    DeploySkipped { function: String, reason: String },
}

impl DeployError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Packaging { .. } => "packaging",
            Self::RoleCreation { .. } => "role_creation",
            Self::PolicyAttach { .. } => "policy_attach",
            Self::DeployRejected { .. } => "deploy_rejected",
            Self::DeployExhausted { .. } => "deploy_exhausted",
            Self::Update { .. } => "update",
            Self::Remove { .. } => "remove",
            Self::DeploySkipped { .. } => "deploy_skipped",
        }
    }

    /// Underlying platform error, when the failure came from a remote call.
    pub fn platform_error(&self) -> Option<&PlatformError> {
        match self {
            Self::RoleCreation { source, .. }
            | Self::PolicyAttach { source, .. }
            | Self::DeployRejected { source, .. }
            | Self::DeployExhausted { source, .. }
            | Self::Update { source, .. }
            | Self::Remove { source, .. } => Some(source),
            Self::Packaging { .. } | Self::DeploySkipped { .. } => None,
        }
    }
}
