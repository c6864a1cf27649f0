use async_trait::async_trait;
use aws_sdk_iam::error::DisplayErrorContext;
use aws_sdk_iam::operation::attach_role_policy::AttachRolePolicyError;
use aws_sdk_iam::operation::create_role::CreateRoleError;
use lambda_sync_core::platform::IdentityService;
use lambda_sync_core::{PlatformError, PlatformErrorKind};

use super::to_platform_error;

#[derive(Clone)]
pub struct IamIdentityService {
    client: aws_sdk_iam::Client,
}

impl IamIdentityService {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_iam::Client::new(config),
        }
    }
}

#[async_trait]
impl IdentityService for IamIdentityService {
    async fn create_role(
        &self,
        role_name: &str,
        trust_policy_document: &str,
    ) -> Result<String, PlatformError> {
        let output = self
            .client
            .create_role()
            .role_name(role_name)
            .assume_role_policy_document(trust_policy_document)
            .send()
            .await
            .map_err(|error| {
                to_platform_error(
                    error.as_service_error(),
                    create_role_error_kind,
                    format!("failed to create role: {}", DisplayErrorContext(&error)),
                )
            })?;

        output
            .role()
            .map(|role| role.arn().to_string())
            .ok_or_else(|| {
                PlatformError::new(
                    PlatformErrorKind::Other,
                    format!("create role response for {role_name} did not include a role"),
                )
            })
    }

    async fn attach_role_policy(
        &self,
        role_name: &str,
        policy_arn: &str,
    ) -> Result<(), PlatformError> {
        self.client
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| {
                to_platform_error(
                    error.as_service_error(),
                    attach_role_policy_error_kind,
                    format!("failed to attach role policy: {}", DisplayErrorContext(&error)),
                )
            })
    }
}

pub fn create_role_error_kind(error: &CreateRoleError) -> PlatformErrorKind {
    if error.is_entity_already_exists_exception() {
        PlatformErrorKind::AlreadyExists
    } else {
        PlatformErrorKind::Other
    }
}

pub fn attach_role_policy_error_kind(error: &AttachRolePolicyError) -> PlatformErrorKind {
    if error.is_no_such_entity_exception() {
        PlatformErrorKind::NotFound
    } else if error.is_invalid_input_exception() {
        PlatformErrorKind::InvalidParameterValue
    } else {
        PlatformErrorKind::Other
    }
}
