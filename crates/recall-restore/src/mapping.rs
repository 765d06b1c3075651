//! Kind-to-resource resolution against live discovery
//!
//! Owner references name their parent by group/version/kind; the archive and
//! the dynamic API work in group/version/resource. The mapper translates
//! between the two and learns whether a kind is namespaced, caching what
//! discovery returns because graph construction resolves the same handful of
//! kinds over and over.

use std::collections::HashMap;

use async_trait::async_trait;
use kube::discovery::{Discovery, Scope};
use kube::Client;
use recall_common::{Error, GroupVersionResource};
use tokio::sync::RwLock;
use tracing::debug;

/// Resolves a group/version/kind to its resource coordinates and scope
#[async_trait]
pub trait KindResolver: Send + Sync {
    /// Resolve `(group, version, kind)` to `(gvr, namespaced)`
    async fn resolve(
        &self,
        group: &str,
        version: &str,
        kind: &str,
    ) -> Result<(GroupVersionResource, bool), Error>;
}

/// Discovery-backed resolver with an invalidatable cache
pub struct RestMapper {
    client: Client,
    cache: RwLock<HashMap<String, (GroupVersionResource, bool)>>,
}

impl RestMapper {
    /// Create a mapper for the given client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Drop every cached entry.
    ///
    /// Called after definitions are installed so kinds the cluster did not
    /// serve a moment ago resolve on the next lookup.
    pub async fn invalidate(&self) {
        self.cache.write().await.clear();
    }
}

fn cache_key(group: &str, version: &str, kind: &str) -> String {
    if group.is_empty() {
        format!("{version}/{kind}")
    } else {
        format!("{group}/{version}/{kind}")
    }
}

#[async_trait]
impl KindResolver for RestMapper {
    async fn resolve(
        &self,
        group: &str,
        version: &str,
        kind: &str,
    ) -> Result<(GroupVersionResource, bool), Error> {
        let key = cache_key(group, version, kind);
        if let Some(hit) = self.cache.read().await.get(&key).cloned() {
            return Ok(hit);
        }

        let discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .map_err(|e| Error::mapping(&key, format!("discovery failed: {}", e)))?;
        for api_group in discovery.groups() {
            for (ar, caps) in api_group.recommended_resources() {
                if ar.group == group && ar.version == version && ar.kind == kind {
                    let namespaced = matches!(caps.scope, Scope::Namespaced);
                    let gvr = GroupVersionResource::new(
                        ar.group.clone(),
                        ar.version.clone(),
                        ar.plural.clone(),
                    );
                    debug!(gvk = %key, gvr = %gvr, namespaced, "resolved kind");
                    self.cache.write().await.insert(key, (gvr.clone(), namespaced));
                    return Ok((gvr, namespaced));
                }
            }
        }
        Err(Error::mapping(&key, "no served resource matches this kind"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_keys_omit_core_group() {
        assert_eq!(cache_key("", "v1", "ConfigMap"), "v1/ConfigMap");
        assert_eq!(
            cache_key("example.io", "v1", "Widget"),
            "example.io/v1/Widget"
        );
    }
}
