//! In-memory platform and packager fakes shared by unit and scenario tests.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::contract::{DeployedFunction, FunctionName, PackageArtifact};
use crate::error::{DeployError, PlatformError, PlatformErrorKind};
use crate::packaging::ArtifactBuilder;
use crate::platform::{ComputeService, CreateFunctionRequest, IdentityService};

pub const TEST_ACCOUNT: &str = "123456789012";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    CreateRole(String),
    AttachRolePolicy(String, String),
    CreateFunction(String),
    UpdateFunctionCode {
        function_name: String,
        zip_len: usize,
        publish: bool,
    },
    DeleteFunction(String),
}

/// Scriptable stand-in for the identity and compute services.
///
/// Roles and functions are tracked like the real platform: creating an
/// existing role or function fails with `AlreadyExists`, updating or
/// deleting an unknown function fails with `NotFound`.
#[derive(Default)]
pub struct FakePlatform {
    calls: Mutex<Vec<(PlatformCall, Instant)>>,
    roles: Mutex<HashSet<String>>,
    functions: Mutex<BTreeSet<String>>,
    create_requests: Mutex<HashMap<String, CreateFunctionRequest>>,
    create_function_scripts: Mutex<HashMap<String, VecDeque<PlatformErrorKind>>>,
    create_role_failures: HashMap<String, PlatformErrorKind>,
    attach_failures: HashMap<String, PlatformErrorKind>,
    latencies: HashMap<String, Duration>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_function(self, function_name: &str) -> Self {
        self.functions
            .lock()
            .expect("poisoned mutex")
            .insert(function_name.to_string());
        self
    }

    pub fn with_role(self, role_name: &str) -> Self {
        self.roles
            .lock()
            .expect("poisoned mutex")
            .insert(role_name.to_string());
        self
    }

    pub fn fail_create_role(mut self, role_name: &str, kind: PlatformErrorKind) -> Self {
        self.create_role_failures.insert(role_name.to_string(), kind);
        self
    }

    pub fn fail_attach_policy(mut self, role_name: &str, kind: PlatformErrorKind) -> Self {
        self.attach_failures.insert(role_name.to_string(), kind);
        self
    }

    /// Queues failures returned by successive create-function attempts;
    /// once the queue is drained the call succeeds.
    pub fn script_create_function(self, function_name: &str, failures: Vec<PlatformErrorKind>) -> Self {
        self.create_function_scripts
            .lock()
            .expect("poisoned mutex")
            .insert(function_name.to_string(), failures.into());
        self
    }

    /// Delays every compute call for `function_name`.
    pub fn with_latency(mut self, function_name: &str, latency: Duration) -> Self {
        self.latencies.insert(function_name.to_string(), latency);
        self
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls
            .lock()
            .expect("poisoned mutex")
            .iter()
            .map(|(call, _)| call.clone())
            .collect()
    }

    pub fn call_time(&self, call: &PlatformCall) -> Option<Instant> {
        self.calls
            .lock()
            .expect("poisoned mutex")
            .iter()
            .find(|(recorded, _)| recorded == call)
            .map(|(_, at)| *at)
    }

    pub fn create_function_attempts(&self, function_name: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .expect("poisoned mutex")
            .iter()
            .filter(|(call, _)| matches!(call, PlatformCall::CreateFunction(name) if name == function_name))
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn last_create_request(&self, function_name: &str) -> Option<CreateFunctionRequest> {
        self.create_requests
            .lock()
            .expect("poisoned mutex")
            .get(function_name)
            .cloned()
    }

    pub fn role_exists(&self, role_name: &str) -> bool {
        self.roles.lock().expect("poisoned mutex").contains(role_name)
    }

    pub fn function_exists(&self, function_name: &str) -> bool {
        self.functions
            .lock()
            .expect("poisoned mutex")
            .contains(function_name)
    }

    fn record(&self, call: PlatformCall) {
        debug!(event = "platform_call", call = ?call);
        self.calls
            .lock()
            .expect("poisoned mutex")
            .push((call, Instant::now()));
    }

    async fn simulate_latency(&self, function_name: &str) {
        if let Some(latency) = self.latencies.get(function_name) {
            tokio::time::sleep(*latency).await;
        }
    }
}

#[async_trait]
impl IdentityService for FakePlatform {
    async fn create_role(
        &self,
        role_name: &str,
        _trust_policy_document: &str,
    ) -> Result<String, PlatformError> {
        self.record(PlatformCall::CreateRole(role_name.to_string()));
        if let Some(kind) = self.create_role_failures.get(role_name) {
            return Err(PlatformError::new(
                *kind,
                format!("create_role {role_name} failed"),
            ));
        }

        let mut roles = self.roles.lock().expect("poisoned mutex");
        if !roles.insert(role_name.to_string()) {
            return Err(PlatformError::new(
                PlatformErrorKind::AlreadyExists,
                format!("Role with name {role_name} already exists."),
            ));
        }
        Ok(format!("arn:aws:iam::{TEST_ACCOUNT}:role/{role_name}"))
    }

    async fn attach_role_policy(
        &self,
        role_name: &str,
        policy_arn: &str,
    ) -> Result<(), PlatformError> {
        self.record(PlatformCall::AttachRolePolicy(
            role_name.to_string(),
            policy_arn.to_string(),
        ));
        if let Some(kind) = self.attach_failures.get(role_name) {
            return Err(PlatformError::new(
                *kind,
                format!("attach_role_policy {role_name} failed"),
            ));
        }
        if !self.role_exists(role_name) {
            return Err(PlatformError::new(
                PlatformErrorKind::NotFound,
                format!("The role with name {role_name} cannot be found."),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ComputeService for FakePlatform {
    async fn create_function(
        &self,
        request: CreateFunctionRequest,
    ) -> Result<DeployedFunction, PlatformError> {
        let function_name = request.function_name.clone();
        self.record(PlatformCall::CreateFunction(function_name.clone()));
        self.create_requests
            .lock()
            .expect("poisoned mutex")
            .insert(function_name.clone(), request);
        self.simulate_latency(&function_name).await;

        let attempt = self.create_function_attempts(&function_name).len();
        let scripted = self
            .create_function_scripts
            .lock()
            .expect("poisoned mutex")
            .get_mut(&function_name)
            .and_then(VecDeque::pop_front);
        if let Some(kind) = scripted {
            return Err(PlatformError::new(
                kind,
                format!("create_function {function_name} attempt {attempt} failed"),
            ));
        }

        let mut functions = self.functions.lock().expect("poisoned mutex");
        if !functions.insert(function_name.clone()) {
            return Err(PlatformError::new(
                PlatformErrorKind::AlreadyExists,
                format!("Function already exist: {function_name}"),
            ));
        }
        Ok(DeployedFunction {
            arn: format!("arn:aws:lambda:us-east-1:{TEST_ACCOUNT}:function:{function_name}"),
            name: function_name,
        })
    }

    async fn update_function_code(
        &self,
        function_name: &str,
        zip_file: Vec<u8>,
        publish: bool,
    ) -> Result<(), PlatformError> {
        self.record(PlatformCall::UpdateFunctionCode {
            function_name: function_name.to_string(),
            zip_len: zip_file.len(),
            publish,
        });
        self.simulate_latency(function_name).await;
        if !self.function_exists(function_name) {
            return Err(PlatformError::new(
                PlatformErrorKind::NotFound,
                format!("Function not found: {function_name}"),
            ));
        }
        Ok(())
    }

    async fn delete_function(&self, function_name: &str) -> Result<(), PlatformError> {
        self.record(PlatformCall::DeleteFunction(function_name.to_string()));
        self.simulate_latency(function_name).await;
        if !self
            .functions
            .lock()
            .expect("poisoned mutex")
            .remove(function_name)
        {
            return Err(PlatformError::new(
                PlatformErrorKind::NotFound,
                format!("Function not found: {function_name}"),
            ));
        }
        Ok(())
    }
}

/// Writes a small fake artifact for `function` under `dir`.
pub fn sample_artifact(dir: &Path, function: &FunctionName) -> PackageArtifact {
    let artifact_path = dir.join(format!("{function}.zip"));
    fs::write(&artifact_path, format!("PK-{function}")).expect("fake artifact should be written");
    PackageArtifact {
        source_path: dir.to_path_buf(),
        artifact_path,
        sha256: format!("sha256-{function}"),
    }
}

/// Packager that skips compression and records which functions it built.
pub struct StaticPackager {
    dir: PathBuf,
    failing: HashSet<String>,
    built: Mutex<Vec<String>>,
}

impl StaticPackager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            failing: HashSet::new(),
            built: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_for(mut self, function_name: &str) -> Self {
        self.failing.insert(function_name.to_string());
        self
    }

    pub fn built(&self) -> Vec<String> {
        self.built.lock().expect("poisoned mutex").clone()
    }
}

#[async_trait]
impl ArtifactBuilder for StaticPackager {
    async fn build(&self, function: &FunctionName) -> Result<PackageArtifact, DeployError> {
        self.built
            .lock()
            .expect("poisoned mutex")
            .push(function.to_string());
        if self.failing.contains(function.as_str()) {
            return Err(DeployError::Packaging {
                function: function.to_string(),
                source_path: self.dir.join(function.as_str()),
                message: "source directory does not exist".to_string(),
            });
        }
        Ok(sample_artifact(&self.dir, function))
    }
}
