//! The unit of restore work
//!
//! Object bodies are schema-less nested maps; the accessors here cover the
//! handful of paths the engine reads (`metadata.name`, owner references) and
//! the two spots it mutates (`metadata.resourceVersion`, owner-reference
//! uids).

use std::path::{Path, PathBuf};

use recall_common::{Error, GroupVersionResource};
use serde_json::Value;

/// One archived object waiting to be applied
#[derive(Debug, Clone)]
pub struct RestoreObject {
    /// Object name from `metadata.name`
    pub name: String,
    /// Namespace from `metadata.namespace`; `None` for cluster-scoped objects
    pub namespace: Option<String>,
    /// API coordinates of the object's kind
    pub gvr: GroupVersionResource,
    /// Archive file the object came from; its identity in the graph
    pub source_path: PathBuf,
    /// Decoded, decrypted object body
    pub payload: Value,
}

/// A usable owner-reference entry (entries with an empty `apiVersion` or
/// `kind` are not representable and get skipped by the callers)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRef {
    /// `apiVersion` of the owner (`v1`, `apps/v1`, ...)
    pub api_version: String,
    /// Kind of the owner
    pub kind: String,
    /// Name of the owner
    pub name: String,
}

impl RestoreObject {
    /// Build a RestoreObject from a decoded payload.
    ///
    /// Returns `None` when the payload has no `metadata.name`; such files
    /// carry nothing applyable and are skipped the way the backup engine
    /// skips them.
    pub fn from_payload(
        gvr: GroupVersionResource,
        source_path: impl Into<PathBuf>,
        payload: Value,
    ) -> Option<Self> {
        let name = payload
            .pointer("/metadata/name")
            .and_then(Value::as_str)?
            .to_string();
        let namespace = payload
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .map(|s| s.to_string());
        Some(Self {
            name,
            namespace,
            gvr,
            source_path: source_path.into(),
            payload,
        })
    }

    /// Graph key for this object (its archive path)
    pub fn source_key(&self) -> String {
        self.source_path.to_string_lossy().into_owned()
    }

    /// Graph key for an arbitrary source path
    pub fn key_for(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    /// `namespace/name`, or just `name` for cluster-scoped objects
    pub fn display_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}", ns, self.name),
            None => self.name.clone(),
        }
    }

    /// The payload's `kind`, when present
    pub fn kind(&self) -> Option<&str> {
        self.payload.get("kind").and_then(Value::as_str)
    }

    /// Usable owner-reference entries with their positions in the list.
    ///
    /// Entries that are not objects, or that lack `apiVersion`, `kind`, or
    /// `name`, are left out; their positions are never touched.
    pub fn owner_entries(&self) -> Vec<(usize, OwnerRef)> {
        let Some(Value::Array(refs)) = self.payload.pointer("/metadata/ownerReferences") else {
            return Vec::new();
        };
        refs.iter()
            .enumerate()
            .filter_map(|(idx, entry)| {
                let api_version = entry.get("apiVersion")?.as_str()?;
                let kind = entry.get("kind")?.as_str()?;
                let name = entry.get("name")?.as_str()?;
                if api_version.is_empty() || kind.is_empty() || name.is_empty() {
                    return None;
                }
                Some((
                    idx,
                    OwnerRef {
                        api_version: api_version.to_string(),
                        kind: kind.to_string(),
                        name: name.to_string(),
                    },
                ))
            })
            .collect()
    }

    /// Overwrite the `uid` of the owner-reference entry at `idx`
    pub fn set_owner_uid(&mut self, idx: usize, uid: &str) -> Result<(), Error> {
        let entry = self
            .payload
            .pointer_mut("/metadata/ownerReferences")
            .and_then(Value::as_array_mut)
            .and_then(|refs| refs.get_mut(idx))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| {
                Error::serialization(format!("owner reference {idx} vanished during rewrite"))
            })?;
        entry.insert("uid".to_string(), Value::String(uid.to_string()));
        Ok(())
    }

    /// Set `metadata.resourceVersion` on the payload
    pub fn set_resource_version(&mut self, rv: &str) -> Result<(), Error> {
        let metadata = self
            .payload
            .pointer_mut("/metadata")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| Error::serialization("payload has no metadata map"))?;
        metadata.insert(
            "resourceVersion".to_string(),
            Value::String(rv.to_string()),
        );
        Ok(())
    }
}
