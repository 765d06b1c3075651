//! CRD installation on startup
//!
//! The operator installs its own CRDs using server-side apply so the served
//! versions always match the operator build.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use recall_common::crd::{EncryptionConfig, Restore};

/// CRD definition with name and resource
struct CrdDef {
    name: &'static str,
    crd: CustomResourceDefinition,
}

/// Get all Recall CRD definitions
fn all_crds() -> Vec<CrdDef> {
    vec![
        CrdDef {
            name: "restores.recall.dev",
            crd: Restore::crd(),
        },
        CrdDef {
            name: "encryptionconfigs.recall.dev",
            crd: EncryptionConfig::crd(),
        },
    ]
}

/// Ensure all Recall CRDs are installed
pub async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply("recall-operator").force();

    for def in all_crds() {
        tracing::info!("Installing {} CRD...", def.name);
        crds.patch(def.name, &params, &Patch::Apply(&def.crd))
            .await
            .map_err(|e| anyhow::anyhow!("failed to install {} CRD: {}", def.name, e))?;
    }

    tracing::info!("All Recall CRDs installed/updated");
    Ok(())
}
