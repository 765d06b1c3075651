//! Restore orchestration
//!
//! One invocation: fetch and unpack the archive into a temp directory, load
//! the encryption transformers, install definitions, build the dependency
//! graph, then drain the ready queue applying objects one at a time. The
//! temp directory is removed on every exit path, including cancellation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use kube::api::Api;
use kube::Client;
use recall_archive::{load_status_subresource_set, unpack_tar_gz, Archive};
use recall_common::crd::{EncryptionConfig, RestoreSpec, S3StorageConfig};
use recall_common::{backup_stem, Error, ENCRYPTION_CONFIG_NAMESPACE};
use recall_crypto::{transformers_from_config, TransformerMap};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::apply::ApplyExecutor;
use crate::crds::install_definitions;
use crate::graph::GraphBuilder;
use crate::mapping::RestMapper;

/// Fetches backup tarballs from an S3-style object store.
///
/// The concrete client is wired in by the operator; the engine only needs a
/// local path to the downloaded tarball. The file is deleted after
/// extraction.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download `backup_filename` and return the local path of the tarball
    async fn fetch(&self, s3: &S3StorageConfig, backup_filename: &str)
        -> Result<PathBuf, Error>;
}

/// Outcome of one restore invocation
#[derive(Debug, Default)]
pub struct RestoreReport {
    /// Objects applied successfully
    pub restored: usize,
    /// Source keys of objects whose archive parents never resolved; they
    /// were not applied and raised no error
    pub stranded: Vec<String>,
    /// Per-object failures, in replay order
    pub failures: Vec<Error>,
}

/// The restore engine; owns the client handles for one or more invocations
pub struct RestoreEngine {
    client: Client,
    mapper: Arc<RestMapper>,
    store: Option<Arc<dyn ObjectStore>>,
}

impl RestoreEngine {
    /// Create an engine over the given client
    pub fn new(client: Client) -> Self {
        let mapper = Arc::new(RestMapper::new(client.clone()));
        Self {
            client,
            mapper,
            store: None,
        }
    }

    /// Attach an object-store client for S3 storage locations
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Run a restore to completion
    pub async fn restore(&self, spec: &RestoreSpec) -> Result<RestoreReport, Error> {
        self.restore_with_cancel(spec, CancellationToken::new())
            .await
    }

    /// Run a restore, aborting between or during API calls when `cancel`
    /// fires. Cancellation returns the accumulated per-object errors behind
    /// [`Error::Cancelled`]; the extraction directory is removed regardless.
    pub async fn restore_with_cancel(
        &self,
        spec: &RestoreSpec,
        cancel: CancellationToken,
    ) -> Result<RestoreReport, Error> {
        // Extraction directory lives exactly as long as this invocation
        let workdir = tempfile::Builder::new()
            .prefix(&format!("{}-", backup_stem(&spec.backup_filename)))
            .tempdir()
            .map_err(|e| Error::archive(format!("failed to create extraction dir: {}", e)))?;
        info!(dir = %workdir.path().display(), backup = %spec.backup_filename, "extracting backup");

        let (tarball, downloaded) = self.locate_tarball(spec).await?;
        unpack_tar_gz(&tarball, workdir.path())?;
        if downloaded {
            // Contents are unpacked; drop the fetched copy like the backup
            // producer's temp files
            if let Err(e) = std::fs::remove_file(&tarball) {
                warn!(path = %tarball.display(), error = %e, "could not remove downloaded tarball");
            }
        }

        let archive = Archive::open(workdir.path())?;
        let transformers = self.load_transformers(spec).await?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled {
                applied: 0,
                errors: Vec::new(),
            });
        }

        let applier = ApplyExecutor::new(self.client.clone(), self.mapper.clone());
        let created_definitions = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Error::Cancelled { applied: 0, errors: Vec::new() });
            }
            result = install_definitions(&archive, &transformers, &applier, &self.client) => result?,
        };
        // Definitions may have introduced kinds discovery has not seen
        self.mapper.invalidate().await;

        let status_subresources = load_status_subresource_set(archive.root())?;

        let mut graph = GraphBuilder::new(&archive, &transformers, self.mapper.as_ref())
            .build()
            .await?;
        graph.seed_created(created_definitions);

        let mut failures = graph.take_errors();
        let mut restored = 0usize;

        while let Some(mut obj) = graph.next_ready() {
            let key = obj.source_key();
            let has_status = status_subresources.contains(&obj.gvr.key());
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(applied = restored, "restore cancelled");
                    return Err(Error::Cancelled { applied: restored, errors: failures });
                }
                result = applier.apply(&mut obj, has_status) => match result {
                    Ok(()) => {
                        restored += 1;
                        graph.mark_created(&key);
                    }
                    Err(e) if !e.is_fatal() => {
                        warn!(object = %obj.display_name(), error = %e, "object failed, continuing");
                        failures.push(e);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let stranded = graph.stranded();
        for key in &stranded {
            warn!(object = %key, "never applied: not every owner was applied (missing from the archive, or failed)");
        }
        info!(
            restored,
            failed = failures.len(),
            stranded = stranded.len(),
            "restore finished"
        );

        Ok(RestoreReport {
            restored,
            stranded,
            failures,
        })
    }

    /// Resolve the tarball location. The bool is true when the file was
    /// downloaded and should be removed after extraction.
    async fn locate_tarball(&self, spec: &RestoreSpec) -> Result<(PathBuf, bool), Error> {
        if let Some(local) = &spec.storage_location.local {
            return Ok((Path::new(local).join(&spec.backup_filename), false));
        }
        if let Some(s3) = &spec.storage_location.s3 {
            let store = self.store.as_ref().ok_or_else(|| {
                Error::archive("restore names an S3 location but no object store is configured")
            })?;
            let path = store.fetch(s3, &spec.backup_filename).await?;
            return Ok((path, true));
        }
        Err(Error::archive(
            "restore spec has neither a local nor an S3 storage location",
        ))
    }

    async fn load_transformers(&self, spec: &RestoreSpec) -> Result<TransformerMap, Error> {
        let Some(name) = &spec.encryption_config_name else {
            return Ok(TransformerMap::new());
        };
        let api: Api<EncryptionConfig> =
            Api::namespaced(self.client.clone(), ENCRYPTION_CONFIG_NAMESPACE);
        let config = api.get(name).await?;
        info!(config = %name, "loaded encryption config");
        transformers_from_config(&config.spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_common::crd::StorageLocation;

    fn spec_with(location: StorageLocation) -> RestoreSpec {
        RestoreSpec {
            backup_filename: "nightly.tar.gz".to_string(),
            storage_location: location,
            encryption_config_name: None,
            prune: false,
            delete_timeout_seconds: None,
        }
    }

    /// Story: a spec with no storage location fails fast, before anything
    /// touches the cluster
    #[tokio::test]
    async fn missing_storage_location_aborts_early() {
        let Ok(client) = Client::try_default().await else {
            eprintln!("Skipping test: no kube config available");
            return;
        };
        let engine = RestoreEngine::new(client);
        let err = engine
            .restore(&spec_with(StorageLocation::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Archive { .. }));
    }

    /// Story: an S3 location without a configured object store is rejected
    /// rather than silently skipped
    #[tokio::test]
    async fn s3_location_requires_an_object_store() {
        let Ok(client) = Client::try_default().await else {
            eprintln!("Skipping test: no kube config available");
            return;
        };
        let engine = RestoreEngine::new(client);
        let err = engine
            .restore(&spec_with(StorageLocation {
                local: None,
                s3: Some(S3StorageConfig {
                    bucket: "backups".to_string(),
                    ..Default::default()
                }),
            }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no object store"));
    }
}
