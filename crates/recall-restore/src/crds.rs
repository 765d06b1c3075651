//! Definition installation
//!
//! CustomResourceDefinitions must exist on the API surface before any
//! instance of their kinds can be applied, so the archive's definition
//! directories are replayed first, outside the dependency graph, in
//! filesystem iteration order. After applying, each definition is polled
//! until the API surface reports it established; a freshly applied
//! definition is not served instantly and early instance applies would fail
//! with no-matches errors.

use kube::Client;
use recall_archive::Archive;
use recall_common::kube_utils::{crd_wait_config, wait_for_crd_established};
use recall_common::{Error, GroupVersionResource, CRD_KIND_DIRS};
use recall_crypto::{maybe_decrypt, TransformerMap};
use serde_json::Value;
use tracing::{info, warn};

use crate::apply::ApplyExecutor;
use crate::object::RestoreObject;

/// Apply every definition in the archive and wait until each is established.
///
/// Returns the source keys of the applied definitions; the caller seeds the
/// dependency graph with them so instances claiming a definition as an owner
/// find their parent pre-satisfied. Any failure here aborts the restore.
pub async fn install_definitions(
    archive: &Archive,
    transformers: &TransformerMap,
    applier: &ApplyExecutor,
    client: &Client,
) -> Result<Vec<String>, Error> {
    let mut created = Vec::new();
    let mut installed_names = Vec::new();

    for dir_name in CRD_KIND_DIRS {
        let gvr = GroupVersionResource::parse_kind_dir(dir_name)?;
        let Some(kind_dir) = archive.kind_dir(&gvr) else {
            continue;
        };
        let transformer = transformers.get(&gvr.group_resource());

        for file in kind_dir.object_files()? {
            let object_label = file.path.to_string_lossy().into_owned();
            let bytes = maybe_decrypt(file.read()?, transformer, &file.aad(), &object_label)?;
            let payload: Value = serde_json::from_slice(&bytes).map_err(|e| {
                Error::archive(format!("{} is not valid JSON: {}", object_label, e))
            })?;
            let Some(mut obj) = RestoreObject::from_payload(gvr.clone(), &file.path, payload)
            else {
                warn!(object = %object_label, "definition has no metadata.name, skipping");
                continue;
            };

            // Definitions have no status subresource write during restore
            applier.apply(&mut obj, false).await?;
            info!(definition = %obj.name, "definition applied");
            installed_names.push(obj.name.clone());
            created.push(obj.source_key());
        }
    }

    let wait = crd_wait_config();
    for name in &installed_names {
        wait_for_crd_established(client, name, &wait).await?;
    }

    Ok(created)
}
