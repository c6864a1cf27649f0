use async_trait::async_trait;
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::operation::create_function::CreateFunctionError;
use aws_sdk_lambda::operation::delete_function::DeleteFunctionError;
use aws_sdk_lambda::operation::update_function_code::UpdateFunctionCodeError;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{FunctionCode, Runtime};
use lambda_sync_core::platform::{ComputeService, CreateFunctionRequest};
use lambda_sync_core::{DeployedFunction, PlatformError, PlatformErrorKind};

use super::to_platform_error;

#[derive(Clone)]
pub struct LambdaComputeService {
    client: aws_sdk_lambda::Client,
}

impl LambdaComputeService {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_lambda::Client::new(config),
        }
    }
}

#[async_trait]
impl ComputeService for LambdaComputeService {
    async fn create_function(
        &self,
        request: CreateFunctionRequest,
    ) -> Result<DeployedFunction, PlatformError> {
        let code = FunctionCode::builder()
            .zip_file(Blob::new(request.zip_file))
            .build();
        let output = self
            .client
            .create_function()
            .function_name(&request.function_name)
            .runtime(Runtime::from(request.runtime.as_str()))
            .handler(&request.handler)
            .role(&request.role_arn)
            .code(code)
            .send()
            .await
            .map_err(|error| {
                to_platform_error(
                    error.as_service_error(),
                    create_function_error_kind,
                    format!("failed to create function: {}", DisplayErrorContext(&error)),
                )
            })?;

        let arn = output.function_arn().ok_or_else(|| {
            PlatformError::new(
                PlatformErrorKind::Other,
                format!(
                    "create function response for {} did not include an arn",
                    request.function_name
                ),
            )
        })?;
        Ok(DeployedFunction {
            name: output
                .function_name()
                .unwrap_or(request.function_name.as_str())
                .to_string(),
            arn: arn.to_string(),
        })
    }

    async fn update_function_code(
        &self,
        function_name: &str,
        zip_file: Vec<u8>,
        publish: bool,
    ) -> Result<(), PlatformError> {
        self.client
            .update_function_code()
            .function_name(function_name)
            .zip_file(Blob::new(zip_file))
            .publish(publish)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| {
                to_platform_error(
                    error.as_service_error(),
                    update_function_code_error_kind,
                    format!("failed to update function code: {}", DisplayErrorContext(&error)),
                )
            })
    }

    async fn delete_function(&self, function_name: &str) -> Result<(), PlatformError> {
        self.client
            .delete_function()
            .function_name(function_name)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| {
                to_platform_error(
                    error.as_service_error(),
                    delete_function_error_kind,
                    format!("failed to delete function: {}", DisplayErrorContext(&error)),
                )
            })
    }
}

/// `InvalidParameterValueException` is what Lambda returns while a freshly
/// created role cannot be assumed yet.
pub fn create_function_error_kind(error: &CreateFunctionError) -> PlatformErrorKind {
    if error.is_invalid_parameter_value_exception() {
        PlatformErrorKind::InvalidParameterValue
    } else if error.is_resource_conflict_exception() {
        PlatformErrorKind::AlreadyExists
    } else if error.is_resource_not_found_exception() {
        PlatformErrorKind::NotFound
    } else if error.is_too_many_requests_exception() {
        PlatformErrorKind::Throttled
    } else {
        PlatformErrorKind::Other
    }
}

pub fn update_function_code_error_kind(error: &UpdateFunctionCodeError) -> PlatformErrorKind {
    if error.is_resource_not_found_exception() {
        PlatformErrorKind::NotFound
    } else if error.is_invalid_parameter_value_exception() {
        PlatformErrorKind::InvalidParameterValue
    } else if error.is_too_many_requests_exception() {
        PlatformErrorKind::Throttled
    } else {
        PlatformErrorKind::Other
    }
}

pub fn delete_function_error_kind(error: &DeleteFunctionError) -> PlatformErrorKind {
    if error.is_resource_not_found_exception() {
        PlatformErrorKind::NotFound
    } else if error.is_too_many_requests_exception() {
        PlatformErrorKind::Throttled
    } else {
        PlatformErrorKind::Other
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_lambda::types::error::{
        InvalidParameterValueException, ResourceConflictException, ResourceNotFoundException,
        ServiceException,
    };

    use super::*;

    #[test]
    fn unpropagated_role_is_transient() {
        let error = CreateFunctionError::InvalidParameterValueException(
            InvalidParameterValueException::builder()
                .message("The role defined for the function cannot be assumed by Lambda.")
                .build(),
        );
        let kind = create_function_error_kind(&error);

        assert_eq!(kind, PlatformErrorKind::InvalidParameterValue);
        assert!(PlatformError::new(kind, "x").is_transient());
    }

    #[test]
    fn existing_function_is_fatal_conflict() {
        let error = CreateFunctionError::ResourceConflictException(
            ResourceConflictException::builder()
                .message("Function already exist: fn-a")
                .build(),
        );
        let kind = create_function_error_kind(&error);

        assert_eq!(kind, PlatformErrorKind::AlreadyExists);
        assert!(!PlatformError::new(kind, "x").is_transient());
    }

    #[test]
    fn service_fault_is_not_retried() {
        let error = CreateFunctionError::ServiceException(ServiceException::builder().build());
        assert_eq!(create_function_error_kind(&error), PlatformErrorKind::Other);
    }

    #[test]
    fn missing_function_maps_to_not_found() {
        let update = UpdateFunctionCodeError::ResourceNotFoundException(
            ResourceNotFoundException::builder().build(),
        );
        let delete = DeleteFunctionError::ResourceNotFoundException(
            ResourceNotFoundException::builder().build(),
        );

        assert_eq!(
            update_function_code_error_kind(&update),
            PlatformErrorKind::NotFound
        );
        assert_eq!(delete_function_error_kind(&delete), PlatformErrorKind::NotFound);
    }
}
