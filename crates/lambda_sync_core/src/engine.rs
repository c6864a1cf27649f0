//! Reconciliation Engine.
//!
//! A run moves through `Idle -> Dispatching -> AwaitingAll -> Settled`.
//! The create, update and delete pipelines run concurrently; inside each
//! pipeline every name is its own future, and all of them are joined with a
//! settle-all join so one failure never hides another item's outcome.
//! `join_all` yields outputs in input order, which keeps result index `i`
//! aligned with change-set index `i`.

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use tracing::{error, info};

use crate::config::SyncConfig;
use crate::contract::{
    normalize_change_set, repeated_positions, ChangeSet, ChangeSetRequest, DeployedFunction,
    FunctionName, OperationOutcome, ReconciliationResult, ValidationError,
};
use crate::deploy::FunctionDeployer;
use crate::error::DeployError;
use crate::lifecycle::{FunctionRemover, FunctionUpdater};
use crate::packaging::ArtifactBuilder;
use crate::platform::{ComputeService, IdentityService};
use crate::provision::RoleProvisioner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReconcilePhase {
    Idle,
    Dispatching,
    AwaitingAll,
    Settled,
}

impl ReconcilePhase {
    fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Dispatching => "dispatching",
            Self::AwaitingAll => "awaiting_all",
            Self::Settled => "settled",
        }
    }
}

struct RunPhase {
    current: ReconcilePhase,
}

impl RunPhase {
    fn new() -> Self {
        Self {
            current: ReconcilePhase::Idle,
        }
    }

    fn advance(&mut self, next: ReconcilePhase) {
        debug_assert!(next > self.current, "phases only move forward");
        info!(
            event = "phase_changed",
            from = self.current.as_str(),
            to = next.as_str(),
        );
        self.current = next;
    }
}

#[derive(Debug, Clone, Copy)]
enum Pipeline {
    Create,
    Update,
    Delete,
}

impl Pipeline {
    fn as_str(self) -> &'static str {
        match self {
            Self::Create => "created",
            Self::Update => "updated",
            Self::Delete => "deleted",
        }
    }
}

/// Converges the platform to a change-set. Holds long-lived service
/// references only; a single instance can serve several runs.
#[derive(Clone)]
pub struct Reconciler {
    packager: Arc<dyn ArtifactBuilder>,
    provisioner: RoleProvisioner,
    deployer: FunctionDeployer,
    updater: FunctionUpdater,
    remover: FunctionRemover,
}

impl Reconciler {
    pub fn new(
        config: &SyncConfig,
        packager: Arc<dyn ArtifactBuilder>,
        identity: Arc<dyn IdentityService>,
        compute: Arc<dyn ComputeService>,
    ) -> Self {
        Self {
            packager,
            provisioner: RoleProvisioner::new(identity, config),
            deployer: FunctionDeployer::new(compute.clone(), config),
            updater: FunctionUpdater::new(compute.clone()),
            remover: FunctionRemover::new(compute),
        }
    }

    /// Validates a decoded request before running it. A rejected request
    /// makes no remote call and yields no partial result.
    pub async fn reconcile_request(
        &self,
        request: ChangeSetRequest,
    ) -> Result<ReconciliationResult, ValidationError> {
        let change_set = normalize_change_set(request)?;
        Ok(self.reconcile(&change_set).await)
    }

    pub async fn reconcile(&self, change_set: &ChangeSet) -> ReconciliationResult {
        let started_at = Instant::now();
        let mut phase = RunPhase::new();

        phase.advance(ReconcilePhase::Dispatching);
        info!(
            event = "run_started",
            created = change_set.created.len(),
            updated = change_set.updated.len(),
            deleted = change_set.deleted.len(),
        );
        let create_pipeline = self.create_all(&change_set.created);
        let update_pipeline = self.update_all(&change_set.updated);
        let delete_pipeline = self.delete_all(&change_set.deleted);

        // Pipelines are lazy. With `biased` the marker is polled last, so
        // `AwaitingAll` is logged only once every item has been started.
        let (created, updated, deleted, ()) = tokio::join!(
            biased;
            create_pipeline,
            update_pipeline,
            delete_pipeline,
            async { phase.advance(ReconcilePhase::AwaitingAll) }
        );

        phase.advance(ReconcilePhase::Settled);
        let result = ReconciliationResult {
            created,
            updated,
            deleted,
        };
        info!(
            event = "run_settled",
            items = change_set.len(),
            failures = result.failure_count(),
            duration_ms = started_at.elapsed().as_millis() as u64,
        );
        result
    }

    async fn create_all(&self, names: &[FunctionName]) -> Vec<OperationOutcome<DeployedFunction>> {
        let repeated = repeated_positions(names);
        let items = names.iter().cloned().enumerate().map(move |(index, function)| {
            let is_repeat = repeated.contains(&index);
            async move {
                let result = if is_repeat {
                    Err(skipped(&function, Pipeline::Create))
                } else {
                    self.create_one(&function).await
                };
                log_outcome(Pipeline::Create, index, &function, &result);
                OperationOutcome::from(result)
            }
        });
        join_all(items).await
    }

    async fn create_one(&self, function: &FunctionName) -> Result<DeployedFunction, DeployError> {
        let artifact = self.packager.build(function).await?;
        let identity = self.provisioner.provision(function).await?;
        self.deployer.deploy(function, &artifact, &identity).await
    }

    async fn update_all(&self, names: &[FunctionName]) -> Vec<OperationOutcome<()>> {
        let repeated = repeated_positions(names);
        let items = names.iter().cloned().enumerate().map(move |(index, function)| {
            let is_repeat = repeated.contains(&index);
            async move {
                let result = if is_repeat {
                    Err(skipped(&function, Pipeline::Update))
                } else {
                    self.update_one(&function).await
                };
                log_outcome(Pipeline::Update, index, &function, &result);
                OperationOutcome::from(result)
            }
        });
        join_all(items).await
    }

    async fn update_one(&self, function: &FunctionName) -> Result<(), DeployError> {
        let artifact = self.packager.build(function).await?;
        self.updater.update(function, &artifact).await
    }

    async fn delete_all(&self, names: &[FunctionName]) -> Vec<OperationOutcome<FunctionName>> {
        let repeated = repeated_positions(names);
        let items = names.iter().cloned().enumerate().map(move |(index, function)| {
            let is_repeat = repeated.contains(&index);
            async move {
                let result = if is_repeat {
                    Err(skipped(&function, Pipeline::Delete))
                } else {
                    self.remover.remove(&function).await
                };
                log_outcome(Pipeline::Delete, index, &function, &result);
                OperationOutcome::from(result.map(|()| function))
            }
        });
        join_all(items).await
    }
}

fn skipped(function: &FunctionName, pipeline: Pipeline) -> DeployError {
    DeployError::DeploySkipped {
        function: function.to_string(),
        reason: format!(
            "duplicate of an earlier entry in {}",
            pipeline.as_str()
        ),
    }
}

fn log_outcome<T>(
    pipeline: Pipeline,
    index: usize,
    function: &FunctionName,
    result: &Result<T, DeployError>,
) {
    match result {
        Ok(_) => info!(
            event = "item_settled",
            pipeline = pipeline.as_str(),
            index,
            function = %function,
            status = "success",
        ),
        Err(failure) => error!(
            event = "item_settled",
            pipeline = pipeline.as_str(),
            index,
            function = %function,
            status = "failure",
            error_kind = failure.kind(),
            error = %failure,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformErrorKind;
    use crate::test_helpers::{FakePlatform, PlatformCall, StaticPackager};

    fn names(raw: &[&str]) -> Vec<FunctionName> {
        raw.iter()
            .map(|name| FunctionName::parse(name).expect("valid name"))
            .collect()
    }

    fn reconciler(platform: Arc<FakePlatform>, packager: StaticPackager) -> Reconciler {
        Reconciler::new(
            &SyncConfig::default(),
            Arc::new(packager),
            platform.clone(),
            platform,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn outcomes_follow_input_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let platform = Arc::new(
            FakePlatform::new()
                .with_function("u-1")
                .with_function("u-2")
                .with_function("d-1")
                .with_latency("c-1", std::time::Duration::from_secs(3)),
        );
        let engine = reconciler(platform.clone(), StaticPackager::new(dir.path()));
        let change_set = ChangeSet::new(
            names(&["c-1", "c-2", "c-3"]),
            names(&["u-1", "missing", "u-2"]),
            names(&["d-missing", "d-1"]),
        );

        let result = engine.reconcile(&change_set).await;

        let created: Vec<&str> = result
            .created
            .iter()
            .map(|outcome| outcome.success().expect("create succeeds").name.as_str())
            .collect();
        assert_eq!(created, vec!["c-1", "c-2", "c-3"]);

        let updated: Vec<bool> = result.updated.iter().map(OperationOutcome::is_success).collect();
        assert_eq!(updated, vec![true, false, true]);

        assert_eq!(result.deleted.len(), 2);
        assert_eq!(result.deleted[0].failure().map(DeployError::kind), Some("remove"));
        assert_eq!(
            result.deleted[1].success().map(FunctionName::as_str),
            Some("d-1")
        );
    }

    #[tokio::test]
    async fn packaging_failure_stops_chain_before_role() {
        let dir = tempfile::tempdir().expect("tempdir");
        let platform = Arc::new(FakePlatform::new());
        let engine = reconciler(
            platform.clone(),
            StaticPackager::new(dir.path()).fail_for("fn-a"),
        );

        let result = engine
            .reconcile(&ChangeSet::new(names(&["fn-a", "fn-b"]), vec![], vec![]))
            .await;

        assert_eq!(result.created[0].failure().map(DeployError::kind), Some("packaging"));
        assert!(result.created[1].is_success());
        assert!(!platform
            .calls()
            .contains(&PlatformCall::CreateRole("fn-a-ExecRole".to_string())));
    }

    #[tokio::test]
    async fn repeated_names_are_skipped_after_first_occurrence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let platform = Arc::new(FakePlatform::new());
        let packager = Arc::new(StaticPackager::new(dir.path()));
        let engine = Reconciler::new(
            &SyncConfig::default(),
            packager.clone(),
            platform.clone(),
            platform.clone(),
        );

        let result = engine
            .reconcile(&ChangeSet::new(names(&["fn-a", "fn-a"]), vec![], vec![]))
            .await;

        assert_eq!(packager.built(), vec!["fn-a".to_string()]);
        assert!(result.created[0].is_success());
        assert_eq!(
            result.created[1].failure().map(DeployError::kind),
            Some("deploy_skipped")
        );
        assert_eq!(
            platform
                .calls()
                .iter()
                .filter(|call| matches!(call, PlatformCall::CreateRole(_)))
                .count(),
            1
        );
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("poisoned mutex").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock().expect("poisoned mutex"))
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn awaiting_all_is_logged_after_every_pipeline_started() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let dir = tempfile::tempdir().expect("tempdir");
        let platform = Arc::new(
            FakePlatform::new()
                .with_function("fn-z")
                .with_function("fn-w")
                .with_latency("fn-w", std::time::Duration::from_secs(5)),
        );
        let engine = reconciler(platform, StaticPackager::new(dir.path()));

        engine
            .reconcile(&ChangeSet::new(
                names(&["fn-a"]),
                names(&["fn-z"]),
                names(&["fn-w"]),
            ))
            .await;

        let lines = logs.lines();
        let position = |needles: &[&str]| {
            lines
                .iter()
                .position(|line| needles.iter().all(|needle| line.contains(needle)))
                .unwrap_or_else(|| panic!("no log line with {needles:?}"))
        };
        let awaiting = position(&["phase_changed", "awaiting_all"]);
        assert!(position(&["platform_call", "CreateRole", "fn-a-ExecRole"]) < awaiting);
        assert!(position(&["platform_call", "DeleteFunction", "fn-w"]) < awaiting);
        assert!(awaiting < position(&["phase_changed", "settled"]));
    }

    #[tokio::test]
    async fn rejected_request_makes_no_remote_calls() {
        let dir = tempfile::tempdir().expect("tempdir");
        let platform = Arc::new(FakePlatform::new());
        let engine = reconciler(platform.clone(), StaticPackager::new(dir.path()));

        let error = engine
            .reconcile_request(ChangeSetRequest {
                created: vec!["fn-a".to_string()],
                updated: vec![],
                deleted: vec!["".to_string()],
            })
            .await
            .expect_err("blank name should be rejected");

        assert!(error.message().starts_with("deleted:"));
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_change_set_settles_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let platform = Arc::new(FakePlatform::new());
        let engine = reconciler(platform.clone(), StaticPackager::new(dir.path()));

        let change_set = ChangeSet::default();
        assert!(change_set.is_empty());

        let result = engine.reconcile(&change_set).await;

        assert!(result.created.is_empty() && result.updated.is_empty() && result.deleted.is_empty());
        assert!(!result.has_failures());
    }

    #[tokio::test]
    async fn deploy_fatal_error_is_reported_per_item() {
        let dir = tempfile::tempdir().expect("tempdir");
        let platform = Arc::new(
            FakePlatform::new().script_create_function("fn-a", vec![PlatformErrorKind::Throttled]),
        );
        let engine = reconciler(platform.clone(), StaticPackager::new(dir.path()));

        let result = engine
            .reconcile(&ChangeSet::new(names(&["fn-a"]), vec![], vec![]))
            .await;

        assert_eq!(
            result.created[0].failure().map(DeployError::kind),
            Some("deploy_rejected")
        );
        assert_eq!(result.failure_count(), 1);
    }
}
