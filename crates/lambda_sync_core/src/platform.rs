use async_trait::async_trait;

use crate::contract::DeployedFunction;
use crate::error::PlatformError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateFunctionRequest {
    pub function_name: String,
    pub zip_file: Vec<u8>,
    pub role_arn: String,
    pub runtime: String,
    pub handler: String,
}

/// Identity/access service holding execution roles.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Returns the ARN of the new role.
    async fn create_role(
        &self,
        role_name: &str,
        trust_policy_document: &str,
    ) -> Result<String, PlatformError>;

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str)
        -> Result<(), PlatformError>;
}

/// Compute platform hosting the functions.
#[async_trait]
pub trait ComputeService: Send + Sync {
    async fn create_function(
        &self,
        request: CreateFunctionRequest,
    ) -> Result<DeployedFunction, PlatformError>;

    async fn update_function_code(
        &self,
        function_name: &str,
        zip_file: Vec<u8>,
        publish: bool,
    ) -> Result<(), PlatformError>;

    async fn delete_function(&self, function_name: &str) -> Result<(), PlatformError>;
}
