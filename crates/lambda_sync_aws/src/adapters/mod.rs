use lambda_sync_core::{PlatformError, PlatformErrorKind};

pub mod compute;
pub mod identity;

pub use compute::LambdaComputeService;
pub use identity::IamIdentityService;

/// Classifies a failed SDK call. Transport failures and unmodeled errors
/// carry no service error and map to `Other`.
pub(crate) fn to_platform_error<E>(
    service_error: Option<&E>,
    classify: impl Fn(&E) -> PlatformErrorKind,
    message: String,
) -> PlatformError {
    let kind = service_error.map(classify).unwrap_or(PlatformErrorKind::Other);
    PlatformError::new(kind, message)
}
