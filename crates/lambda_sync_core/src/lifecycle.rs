//! Code replacement and removal of existing functions. Neither retries.

use std::sync::Arc;

use tracing::info;

use crate::contract::{FunctionName, PackageArtifact};
use crate::deploy::read_artifact;
use crate::error::DeployError;
use crate::platform::ComputeService;

#[derive(Clone)]
pub struct FunctionUpdater {
    compute: Arc<dyn ComputeService>,
}

impl FunctionUpdater {
    pub fn new(compute: Arc<dyn ComputeService>) -> Self {
        Self { compute }
    }

    /// Uploads new code as the unpublished latest revision.
    pub async fn update(
        &self,
        function: &FunctionName,
        artifact: &PackageArtifact,
    ) -> Result<(), DeployError> {
        let zip_file = read_artifact(function, artifact).await?;
        self.compute
            .update_function_code(function.as_str(), zip_file, false)
            .await
            .map_err(|source| DeployError::Update {
                function: function.to_string(),
                source,
            })?;
        info!(event = "function_updated", function = %function, sha256 = %artifact.sha256);
        Ok(())
    }
}

#[derive(Clone)]
pub struct FunctionRemover {
    compute: Arc<dyn ComputeService>,
}

impl FunctionRemover {
    pub fn new(compute: Arc<dyn ComputeService>) -> Self {
        Self { compute }
    }

    pub async fn remove(&self, function: &FunctionName) -> Result<(), DeployError> {
        self.compute
            .delete_function(function.as_str())
            .await
            .map_err(|source| DeployError::Remove {
                function: function.to_string(),
                source,
            })?;
        info!(event = "function_removed", function = %function);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformErrorKind;
    use crate::test_helpers::{sample_artifact, FakePlatform, PlatformCall};

    #[tokio::test]
    async fn update_uploads_without_publishing() {
        let workspace = tempfile::tempdir().expect("tempdir");
        let function = FunctionName::parse("fn-z").expect("valid name");
        let artifact = sample_artifact(workspace.path(), &function);
        let platform = Arc::new(FakePlatform::new().with_function("fn-z"));

        FunctionUpdater::new(platform.clone())
            .update(&function, &artifact)
            .await
            .expect("update should succeed");

        assert_eq!(
            platform.calls(),
            vec![PlatformCall::UpdateFunctionCode {
                function_name: "fn-z".to_string(),
                zip_len: b"PK-fn-z".len(),
                publish: false,
            }]
        );
    }

    #[tokio::test]
    async fn missing_artifact_fails_before_remote_call() {
        let workspace = tempfile::tempdir().expect("tempdir");
        let function = FunctionName::parse("fn-z").expect("valid name");
        let mut artifact = sample_artifact(workspace.path(), &function);
        artifact.artifact_path = workspace.path().join("missing.zip");
        let platform = Arc::new(FakePlatform::new());

        let error = FunctionUpdater::new(platform.clone())
            .update(&function, &artifact)
            .await
            .expect_err("missing artifact should fail");

        assert_eq!(error.kind(), "packaging");
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn remove_reports_not_found() {
        let platform = Arc::new(FakePlatform::new());
        let function = FunctionName::parse("fn-w").expect("valid name");

        let error = FunctionRemover::new(platform.clone())
            .remove(&function)
            .await
            .expect_err("unknown function should fail");

        assert!(matches!(
            error,
            DeployError::Remove { ref source, .. } if source.kind == PlatformErrorKind::NotFound
        ));
    }
}
