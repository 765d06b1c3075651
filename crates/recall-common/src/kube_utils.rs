//! Shared Kubernetes utilities using kube-rs
//!
//! Client construction, CRD readiness checks, and status patching used by
//! both the restore engine and the operator wiring.

use std::path::Path;
use std::time::Duration;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::info;

use crate::retry::{retry_with_backoff, RetryConfig};
use crate::Error;

/// Create a kube client from an optional kubeconfig path
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|e| Error::serialization(format!("failed to read kubeconfig: {}", e)))?;
            let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::serialization(format!("failed to load kubeconfig: {}", e)))?;
            Ok(Client::try_from(config)?)
        }
        None => Ok(Client::try_default().await?),
    }
}

/// Check whether a CustomResourceDefinition reports `Established: True`
pub async fn crd_established(client: &Client, crd_name: &str) -> Result<bool, Error> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());

    match crds.get(crd_name).await {
        Ok(crd) => Ok(crd
            .status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .map(|conditions| {
                conditions
                    .iter()
                    .any(|c| c.type_ == "Established" && c.status == "True")
            })
            .unwrap_or(false)),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Wait until a CustomResourceDefinition is established on the API surface.
///
/// Freshly applied definitions take a moment before their kinds are served;
/// applying an instance in that window fails with a no-matches error. Polls
/// with backoff until established or attempts are exhausted.
pub async fn wait_for_crd_established(
    client: &Client,
    crd_name: &str,
    retry: &RetryConfig,
) -> Result<(), Error> {
    retry_with_backoff(retry, "crd-established", || async {
        if crd_established(client, crd_name).await? {
            Ok(())
        } else {
            Err(Error::mapping(
                crd_name.to_string(),
                "definition not yet established",
            ))
        }
    })
    .await?;
    info!(crd = %crd_name, "definition established");
    Ok(())
}

/// Retry configuration for the definition-established wait.
///
/// 12 attempts starting at 250ms doubling to a 10s cap stays under roughly
/// a minute of total waiting.
pub fn crd_wait_config() -> RetryConfig {
    RetryConfig {
        max_attempts: 12,
        initial_delay: Duration::from_millis(250),
        max_delay: Duration::from_secs(10),
        backoff_multiplier: 2.0,
    }
}

/// Patch the status subresource of a namespaced resource
pub async fn patch_resource_status<K, S>(
    client: &Client,
    name: &str,
    namespace: &str,
    status: &S,
    field_manager: &str,
) -> Result<(), Error>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
        + serde::de::DeserializeOwned
        + Clone
        + std::fmt::Debug,
    K::DynamicType: Default,
    S: serde::Serialize,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    let body = serde_json::json!({ "status": status });
    api.patch_status(name, &PatchParams::apply(field_manager), &Patch::Merge(&body))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crd_wait_config_is_bounded() {
        let cfg = crd_wait_config();
        assert!(cfg.max_attempts > 0, "the wait must not spin forever");

        // Total worst-case wait stays within the documented minute
        let mut delay = cfg.initial_delay;
        let mut total = Duration::ZERO;
        for _ in 1..cfg.max_attempts {
            total += delay;
            delay = Duration::from_secs_f64(
                (delay.as_secs_f64() * cfg.backoff_multiplier).min(cfg.max_delay.as_secs_f64()),
            );
        }
        // Jitter can stretch each sleep by up to 1.5x
        assert!(total.as_secs_f64() * 1.5 < 90.0, "worst case {total:?}");
    }
}
