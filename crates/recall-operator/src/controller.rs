//! Restore controller
//!
//! Watches Restore objects and runs the restore engine for each request,
//! recording progress and the aggregated outcome on the status subresource.
//! The controller framework serializes reconciles per object, so one restore
//! runs at a time for a given request.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use tracing::{debug, info, warn};

use recall_common::crd::{Restore, RestorePhase, RestoreStatus};
use recall_common::kube_utils::patch_resource_status;
use recall_common::{Error, REQUEUE_ERROR_SECS};
use recall_restore::{RestoreEngine, RestoreReport};

/// Field manager for status patches
const FIELD_MANAGER: &str = "recall-restore-controller";

/// Reconcile errors surfaced to the controller framework
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Status patch failed
    #[error("status update failed: {0}")]
    Status(String),

    /// The restore aborted with a fatal engine error
    #[error("restore failed: {0}")]
    Restore(String),
}

/// Controller context
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// The restore engine shared across reconciles
    pub engine: RestoreEngine,
}

/// Run the Restore controller until the watch stream ends
pub async fn run(client: Client) -> anyhow::Result<()> {
    let restores: Api<Restore> = Api::all(client.clone());
    let engine = RestoreEngine::new(client.clone());
    let ctx = Arc::new(Context { client, engine });

    info!("Starting Restore controller");
    Controller::new(restores, watcher::Config::default())
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _)) => debug!(object = %obj.name, "reconciled"),
                Err(e) => warn!(error = %e, "reconcile failed"),
            }
        })
        .await;
    Ok(())
}

/// Reconcile a Restore
pub async fn reconcile(
    restore: Arc<Restore>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let name = restore.name_any();
    let phase = restore
        .status
        .as_ref()
        .map(|s| s.phase)
        .unwrap_or_default();

    match phase {
        // Terminal phases: nothing to do until the spec changes
        RestorePhase::Completed | RestorePhase::Failed => Ok(Action::await_change()),

        // Pending starts a run; InProgress means a restart interrupted one,
        // and the replay is idempotent, so run it again
        RestorePhase::Pending | RestorePhase::InProgress => {
            info!(restore = %name, backup = %restore.spec.backup_filename, "starting restore");
            update_status(&ctx.client, &restore, in_progress_status(&restore)).await?;

            if restore.spec.prune {
                info!(restore = %name, "prune requested; the prune pass runs after the restore engine");
            }

            match ctx.engine.restore(&restore.spec).await {
                Ok(report) => {
                    let status = finished_status(&restore, report);
                    let restored = status.restored_objects;
                    let failed = matches!(status.phase, RestorePhase::Failed);
                    update_status(&ctx.client, &restore, status).await?;
                    if failed {
                        warn!(restore = %name, "restore finished with object failures");
                    } else {
                        info!(restore = %name, restored, "restore complete");
                    }
                    Ok(Action::await_change())
                }
                Err(e) => {
                    warn!(restore = %name, error = %e, "restore aborted");
                    update_status(&ctx.client, &restore, aborted_status(&restore, &e)).await?;
                    Err(ReconcileError::Restore(e.to_string()))
                }
            }
        }
    }
}

/// Error policy - requeue with a delay
pub fn error_policy(_restore: Arc<Restore>, error: &ReconcileError, _ctx: Arc<Context>) -> Action {
    warn!(error = %error, "Reconcile error, will retry");
    Action::requeue(Duration::from_secs(REQUEUE_ERROR_SECS))
}

fn in_progress_status(restore: &Restore) -> RestoreStatus {
    RestoreStatus {
        phase: RestorePhase::InProgress,
        start_time: Some(Utc::now()),
        observed_generation: restore.metadata.generation,
        ..Default::default()
    }
}

/// Status for a run the engine finished, successfully or with per-object
/// failures. Failures flip the phase to Failed and surface the composite
/// summary as the message.
fn finished_status(restore: &Restore, report: RestoreReport) -> RestoreStatus {
    let RestoreReport {
        restored,
        stranded,
        failures,
    } = report;
    let (phase, message) = match Error::aggregate(failures) {
        None => (RestorePhase::Completed, None),
        Some(summary) => (RestorePhase::Failed, Some(summary.to_string())),
    };
    RestoreStatus {
        phase,
        restored_objects: restored as u32,
        stranded_objects: stranded.len() as u32,
        start_time: restore.status.as_ref().and_then(|s| s.start_time),
        completion_time: Some(Utc::now()),
        message,
        observed_generation: restore.metadata.generation,
        ..Default::default()
    }
}

fn aborted_status(restore: &Restore, error: &Error) -> RestoreStatus {
    RestoreStatus {
        phase: RestorePhase::Failed,
        start_time: restore.status.as_ref().and_then(|s| s.start_time),
        completion_time: Some(Utc::now()),
        message: Some(error.to_string()),
        observed_generation: restore.metadata.generation,
        ..Default::default()
    }
}

async fn update_status(
    client: &Client,
    restore: &Restore,
    status: RestoreStatus,
) -> Result<(), ReconcileError> {
    let name = restore.name_any();
    let namespace = restore.namespace().unwrap_or_else(|| "default".to_string());
    debug!(restore = %name, phase = %status.phase, "updating status");
    patch_resource_status::<Restore, _>(client, &name, &namespace, &status, FIELD_MANAGER)
        .await
        .map_err(|e| ReconcileError::Status(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ObjectMeta;
    use recall_common::crd::{RestoreSpec, StorageLocation};

    fn sample_restore(phase: Option<RestorePhase>) -> Restore {
        Restore {
            metadata: ObjectMeta {
                name: Some("nightly".to_string()),
                namespace: Some("default".to_string()),
                generation: Some(3),
                ..Default::default()
            },
            spec: RestoreSpec {
                backup_filename: "nightly-20260801.tar.gz".to_string(),
                storage_location: StorageLocation {
                    local: Some("/var/backups".to_string()),
                    s3: None,
                },
                encryption_config_name: None,
                prune: false,
                delete_timeout_seconds: None,
            },
            status: phase.map(|phase| RestoreStatus {
                phase,
                start_time: Some(Utc::now()),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn in_progress_status_records_generation() {
        let restore = sample_restore(None);
        let status = in_progress_status(&restore);
        assert_eq!(status.phase, RestorePhase::InProgress);
        assert_eq!(status.observed_generation, Some(3));
        assert!(status.start_time.is_some());
    }

    #[test]
    fn clean_run_completes() {
        let restore = sample_restore(Some(RestorePhase::InProgress));
        let report = RestoreReport {
            restored: 12,
            stranded: vec!["widgets.example.io#v1/ns1/orphan.json".to_string()],
            failures: vec![],
        };
        let status = finished_status(&restore, report);
        assert_eq!(status.phase, RestorePhase::Completed);
        assert_eq!(status.restored_objects, 12);
        assert_eq!(status.stranded_objects, 1);
        assert!(status.message.is_none());
        assert!(status.completion_time.is_some());
        assert!(status.start_time.is_some(), "start time carried over");
    }

    #[test]
    fn object_failures_flip_to_failed_with_a_summary() {
        let restore = sample_restore(Some(RestorePhase::InProgress));
        let report = RestoreReport {
            restored: 3,
            stranded: vec![],
            failures: vec![Error::apply("ns1/w1", "admission webhook denied")],
        };
        let status = finished_status(&restore, report);
        assert_eq!(status.phase, RestorePhase::Failed);
        assert_eq!(status.restored_objects, 3);
        let message = status.message.expect("failure summary");
        assert!(message.contains("admission webhook denied"));
        assert!(message.contains("ns1/w1"));
    }

    #[test]
    fn aborted_run_carries_the_fatal_error() {
        let restore = sample_restore(Some(RestorePhase::InProgress));
        let err = Error::archive("unexpected EOF");
        let status = aborted_status(&restore, &err);
        assert_eq!(status.phase, RestorePhase::Failed);
        assert!(status.message.unwrap().contains("unexpected EOF"));
    }

    #[test]
    fn reconcile_error_display() {
        assert_eq!(
            ReconcileError::Status("patch denied".to_string()).to_string(),
            "status update failed: patch denied"
        );
        assert_eq!(
            ReconcileError::Restore("archive error: boom".to_string()).to_string(),
            "restore failed: archive error: boom"
        );
    }
}
