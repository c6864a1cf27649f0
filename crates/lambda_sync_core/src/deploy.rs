use std::sync::Arc;

use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::contract::{DeployedFunction, ExecutionIdentity, FunctionName, PackageArtifact};
use crate::error::{DeployError, PlatformError};
use crate::platform::{ComputeService, CreateFunctionRequest};
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Creates new functions, retrying while a fresh execution role is still
/// propagating through the identity service.
#[derive(Clone)]
pub struct FunctionDeployer {
    compute: Arc<dyn ComputeService>,
    runtime: String,
    handler: String,
    retry: RetryPolicy,
}

impl FunctionDeployer {
    pub fn new(compute: Arc<dyn ComputeService>, config: &SyncConfig) -> Self {
        Self {
            compute,
            runtime: config.runtime.clone(),
            handler: config.handler.clone(),
            retry: config.retry.clone(),
        }
    }

    pub async fn deploy(
        &self,
        function: &FunctionName,
        artifact: &PackageArtifact,
        identity: &ExecutionIdentity,
    ) -> Result<DeployedFunction, DeployError> {
        let zip_file = read_artifact(function, artifact).await?;

        let result = retry_with_backoff(&self.retry, PlatformError::is_transient, |attempt| {
            let request = CreateFunctionRequest {
                function_name: function.to_string(),
                zip_file: zip_file.clone(),
                role_arn: identity.role_arn.clone(),
                runtime: self.runtime.clone(),
                handler: self.handler.clone(),
            };
            info!(event = "create_function_attempt", function = %function, attempt);
            self.compute.create_function(request)
        })
        .await;

        match result {
            Ok(deployed) => {
                info!(
                    event = "function_created",
                    function = %deployed.name,
                    arn = %deployed.arn,
                    sha256 = %artifact.sha256,
                );
                Ok(deployed)
            }
            Err(error) if error.exhausted => {
                warn!(
                    event = "create_function_exhausted",
                    function = %function,
                    attempts = error.attempts,
                    error = %error.last_error,
                );
                Err(DeployError::DeployExhausted {
                    function: function.to_string(),
                    attempts: error.attempts,
                    source: error.last_error,
                })
            }
            Err(error) => Err(DeployError::DeployRejected {
                function: function.to_string(),
                source: error.last_error,
            }),
        }
    }
}

/// Reads the bytes of a finished artifact for upload.
pub async fn read_artifact(
    function: &FunctionName,
    artifact: &PackageArtifact,
) -> Result<Vec<u8>, DeployError> {
    tokio::fs::read(&artifact.artifact_path)
        .await
        .map_err(|error| DeployError::Packaging {
            function: function.to_string(),
            source_path: artifact.source_path.clone(),
            message: format!(
                "Failed to read artifact '{}': {error}",
                artifact.artifact_path.display()
            ),
        })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::PlatformErrorKind;
    use crate::test_helpers::{sample_artifact, FakePlatform};

    fn identity(function: &FunctionName) -> ExecutionIdentity {
        ExecutionIdentity {
            function_name: function.clone(),
            role_name: format!("{function}-ExecRole"),
            role_arn: format!("arn:aws:iam::123456789012:role/{function}-ExecRole"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_retry_until_success() {
        let workspace = tempfile::tempdir().expect("tempdir");
        let function = FunctionName::parse("fn-a").expect("valid name");
        let artifact = sample_artifact(workspace.path(), &function);
        let platform = Arc::new(FakePlatform::new().script_create_function(
            "fn-a",
            vec![
                PlatformErrorKind::InvalidParameterValue,
                PlatformErrorKind::InvalidParameterValue,
                PlatformErrorKind::InvalidParameterValue,
            ],
        ));
        let deployer = FunctionDeployer::new(platform.clone(), &SyncConfig::default());

        let deployed = deployer
            .deploy(&function, &artifact, &identity(&function))
            .await
            .expect("fourth attempt should succeed");

        assert_eq!(deployed.name, "fn-a");
        let attempts = platform.create_function_attempts("fn-a");
        assert_eq!(attempts.len(), 4);
        let gap = attempts[3] - attempts[2];
        assert!(gap >= Duration::from_secs(5) && gap <= Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_fails_after_single_attempt() {
        let workspace = tempfile::tempdir().expect("tempdir");
        let function = FunctionName::parse("fn-a").expect("valid name");
        let artifact = sample_artifact(workspace.path(), &function);
        let platform = Arc::new(
            FakePlatform::new().script_create_function("fn-a", vec![PlatformErrorKind::Other]),
        );
        let deployer = FunctionDeployer::new(platform.clone(), &SyncConfig::default());

        let error = deployer
            .deploy(&function, &artifact, &identity(&function))
            .await
            .expect_err("fatal error should fail");

        assert_eq!(error.kind(), "deploy_rejected");
        assert_eq!(platform.create_function_attempts("fn-a").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_carries_last_error() {
        let workspace = tempfile::tempdir().expect("tempdir");
        let function = FunctionName::parse("fn-a").expect("valid name");
        let artifact = sample_artifact(workspace.path(), &function);
        let platform = Arc::new(FakePlatform::new().script_create_function(
            "fn-a",
            vec![PlatformErrorKind::InvalidParameterValue; 4],
        ));
        let deployer = FunctionDeployer::new(platform.clone(), &SyncConfig::default());

        let error = deployer
            .deploy(&function, &artifact, &identity(&function))
            .await
            .expect_err("every attempt fails");

        match error {
            DeployError::DeployExhausted {
                attempts, source, ..
            } => {
                assert_eq!(attempts, 4);
                assert_eq!(source.message, "create_function fn-a attempt 4 failed");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn request_carries_runtime_handler_and_role() {
        let workspace = tempfile::tempdir().expect("tempdir");
        let function = FunctionName::parse("fn-a").expect("valid name");
        let artifact = sample_artifact(workspace.path(), &function);
        let platform = Arc::new(FakePlatform::new());
        let config = SyncConfig {
            runtime: "nodejs18.x".to_string(),
            handler: "main.handler".to_string(),
            ..SyncConfig::default()
        };
        let deployer = FunctionDeployer::new(platform.clone(), &config);

        deployer
            .deploy(&function, &artifact, &identity(&function))
            .await
            .expect("deploy should succeed");

        let request = platform
            .last_create_request("fn-a")
            .expect("request should be recorded");
        assert_eq!(request.runtime, "nodejs18.x");
        assert_eq!(request.handler, "main.handler");
        assert_eq!(
            request.role_arn,
            "arn:aws:iam::123456789012:role/fn-a-ExecRole"
        );
        assert_eq!(request.zip_file, b"PK-fn-a".to_vec());
    }
}
