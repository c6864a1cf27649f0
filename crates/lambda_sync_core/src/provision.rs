use std::sync::Arc;

use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::contract::{ExecutionIdentity, FunctionName};
use crate::error::DeployError;
use crate::platform::IdentityService;

/// Creates the dedicated execution role of a function and attaches the
/// baseline policy to it.
///
/// No existence check precedes role creation: provisioning a function whose
/// role already exists fails with `RoleCreation`. A failed policy attach
/// leaves the new role in place.
#[derive(Clone)]
pub struct RoleProvisioner {
    identity: Arc<dyn IdentityService>,
    trust_policy_document: String,
    baseline_policy_arn: String,
    role_suffix: String,
}

impl RoleProvisioner {
    pub fn new(identity: Arc<dyn IdentityService>, config: &SyncConfig) -> Self {
        Self {
            identity,
            trust_policy_document: config.trust_policy_document.clone(),
            baseline_policy_arn: config.baseline_policy_arn.clone(),
            role_suffix: config.role_suffix.clone(),
        }
    }

    pub fn role_name(&self, function: &FunctionName) -> String {
        format!("{function}{}", self.role_suffix)
    }

    pub async fn provision(&self, function: &FunctionName) -> Result<ExecutionIdentity, DeployError> {
        let role_name = self.role_name(function);

        let role_arn = self
            .identity
            .create_role(&role_name, &self.trust_policy_document)
            .await
            .map_err(|source| DeployError::RoleCreation {
                role_name: role_name.clone(),
                source,
            })?;
        info!(event = "role_created", function = %function, role = %role_name, role_arn = %role_arn);

        if let Err(source) = self
            .identity
            .attach_role_policy(&role_name, &self.baseline_policy_arn)
            .await
        {
            warn!(
                event = "role_orphaned",
                function = %function,
                role = %role_name,
                "role exists without baseline policy"
            );
            return Err(DeployError::PolicyAttach { role_name, source });
        }
        info!(
            event = "policy_attached",
            function = %function,
            role = %role_name,
            policy_arn = %self.baseline_policy_arn,
        );

        Ok(ExecutionIdentity {
            function_name: function.clone(),
            role_name,
            role_arn,
        })
    }
}
