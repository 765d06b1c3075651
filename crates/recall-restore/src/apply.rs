//! Create-or-update apply against the live cluster
//!
//! Before an object is written, every usable entry in its owner-reference
//! list gets its `uid` replaced with the owner's current live uid (owners
//! re-created earlier in the replay carry fresh server-assigned uids). The
//! write itself is GET, then CREATE when absent or UPDATE with the live
//! `resourceVersion` when present, with a status-subresource follow-up for
//! kinds that have one.

use std::sync::Arc;

use kube::api::{Api, DynamicObject, PostParams};
use kube::discovery::ApiResource;
use kube::Client;
use recall_common::gvr::parse_api_version;
use recall_common::{Error, GroupVersionResource};
use tracing::{debug, info};

use crate::mapping::KindResolver;
use crate::object::RestoreObject;

/// Applies restore objects through the dynamic API
pub struct ApplyExecutor {
    client: Client,
    resolver: Arc<dyn KindResolver>,
}

impl ApplyExecutor {
    /// Create an executor over the given client and kind resolver
    pub fn new(client: Client, resolver: Arc<dyn KindResolver>) -> Self {
        Self { client, resolver }
    }

    /// Make the live cluster reflect `obj`'s payload.
    ///
    /// Rewrites owner references, then creates or updates the object, then
    /// writes the status subresource when `has_status` is set. Any error is
    /// per-object: the caller records it and moves on.
    pub async fn apply(&self, obj: &mut RestoreObject, has_status: bool) -> Result<(), Error> {
        info!(object = %obj.display_name(), gvr = %obj.gvr, "restoring object");

        self.rewrite_owner_refs(obj).await?;

        let api = self.dynamic_api(
            &obj.gvr,
            obj.kind().unwrap_or_default(),
            obj.namespace.as_deref(),
        );

        let live = api
            .get_opt(&obj.name)
            .await
            .map_err(|e| Error::apply(obj.display_name(), format!("get failed: {}", e)))?;

        match live {
            None => {
                let body = self.to_dynamic(obj)?;
                let created = api.create(&PostParams::default(), &body).await.map_err(|e| {
                    Error::apply(obj.display_name(), format!("create failed: {}", e))
                })?;
                debug!(object = %obj.display_name(), "created");
                if has_status {
                    self.sync_resource_version(obj, &created)?;
                    self.write_status(&api, obj).await?;
                }
            }
            Some(live) => {
                let rv = live.metadata.resource_version.clone().ok_or_else(|| {
                    Error::apply(obj.display_name(), "live object has no resourceVersion")
                })?;
                obj.set_resource_version(&rv)?;
                let body = self.to_dynamic(obj)?;
                let updated = api
                    .replace(&obj.name, &PostParams::default(), &body)
                    .await
                    .map_err(|e| {
                        Error::apply(obj.display_name(), format!("update failed: {}", e))
                    })?;
                debug!(object = %obj.display_name(), "updated");
                if has_status {
                    self.sync_resource_version(obj, &updated)?;
                    self.write_status(&api, obj).await?;
                }
            }
        }
        Ok(())
    }

    /// Replace each owner reference's stale uid with the owner's live uid
    async fn rewrite_owner_refs(&self, obj: &mut RestoreObject) -> Result<(), Error> {
        let entries = obj.owner_entries();
        for (idx, owner) in entries {
            let (group, version) = parse_api_version(&owner.api_version);
            let (owner_gvr, namespaced) = self
                .resolver
                .resolve(&group, &version, &owner.kind)
                .await
                .map_err(|e| Error::owner_resolve(&owner.name, e.to_string()))?;

            // A namespaced owner can only live in the dependent's namespace
            let owner_ns = if namespaced {
                obj.namespace.as_deref()
            } else {
                None
            };
            let owner_label = match owner_ns {
                Some(ns) => format!("{}/{}", ns, owner.name),
                None => owner.name.clone(),
            };
            let api = self.dynamic_api(&owner_gvr, &owner.kind, owner_ns);
            let parent = api.get(&owner.name).await.map_err(|e| {
                Error::owner_resolve(&owner_label, format!("get failed: {}", e))
            })?;
            let uid = parent.metadata.uid.as_deref().ok_or_else(|| {
                Error::owner_resolve(&owner_label, "live owner has no metadata.uid")
            })?;
            debug!(object = %obj.display_name(), owner = %owner_label, uid, "rewrote owner uid");
            obj.set_owner_uid(idx, uid)?;
        }
        Ok(())
    }

    /// Write the status subresource carrying the payload; the returned body
    /// replaces the local copy
    async fn write_status(&self, api: &Api<DynamicObject>, obj: &mut RestoreObject) -> Result<(), Error> {
        let bytes = serde_json::to_vec(&obj.payload)
            .map_err(|e| Error::serialization(format!("failed to encode payload: {}", e)))?;
        let returned = api
            .replace_status(&obj.name, &PostParams::default(), bytes)
            .await
            .map_err(|e| {
                Error::apply(obj.display_name(), format!("status update failed: {}", e))
            })?;
        obj.payload = serde_json::to_value(&returned)
            .map_err(|e| Error::serialization(format!("failed to decode status response: {}", e)))?;
        debug!(object = %obj.display_name(), "status subresource written");
        Ok(())
    }

    fn sync_resource_version(
        &self,
        obj: &mut RestoreObject,
        written: &DynamicObject,
    ) -> Result<(), Error> {
        let rv = written.metadata.resource_version.as_deref().ok_or_else(|| {
            Error::apply(obj.display_name(), "write response has no resourceVersion")
        })?;
        obj.set_resource_version(rv)
    }

    fn to_dynamic(&self, obj: &RestoreObject) -> Result<DynamicObject, Error> {
        serde_json::from_value(obj.payload.clone()).map_err(|e| {
            Error::serialization(format!(
                "payload of {} is not a valid object: {}",
                obj.display_name(),
                e
            ))
        })
    }

    /// Dynamic API handle for a resource, namespaced when `namespace` is set
    fn dynamic_api(
        &self,
        gvr: &GroupVersionResource,
        kind: &str,
        namespace: Option<&str>,
    ) -> Api<DynamicObject> {
        let api_version = if gvr.group.is_empty() {
            gvr.version.clone()
        } else {
            format!("{}/{}", gvr.group, gvr.version)
        };
        let ar = ApiResource {
            group: gvr.group.clone(),
            version: gvr.version.clone(),
            api_version,
            kind: kind.to_string(),
            plural: gvr.resource.clone(),
        };
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }
}
