//! EncryptionConfig Custom Resource Definition
//!
//! Holds the envelope keys used to seal backup archives at rest, keyed per
//! group/resource. The restore engine reads the config named in a Restore
//! spec and builds its transformer map from it.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A named AES-256-GCM key
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionKey {
    /// Key name, for rotation bookkeeping
    pub name: String,

    /// Base64-encoded 32-byte key material
    pub secret: String,
}

/// A set of resource groups sealed with a shared key list
///
/// Decryption tries the keys in order, so rotated-out keys stay readable as
/// long as they remain listed. The first key seals new backups.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSelection {
    /// `<resource>.<group>` selectors (`secrets`, `catalogs.management.example.io`)
    pub group_resources: Vec<String>,

    /// Keys sealing these groups, newest first
    pub keys: Vec<EncryptionKey>,
}

/// Specification for an EncryptionConfig
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "recall.dev",
    version = "v1alpha1",
    kind = "EncryptionConfig",
    plural = "encryptionconfigs",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionConfigSpec {
    /// Resource groups and the keys that seal them
    pub resources: Vec<ResourceSelection>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encryption_config_roundtrip() {
        let spec: EncryptionConfigSpec = serde_yaml::from_str(
            r#"
resources:
  - groupResources:
      - secrets
      - catalogs.management.example.io
    keys:
      - name: key-2
        secret: Mitzj8/kTjB0XKRlenstmYBwiFmh+z3kLxcybYtvMUA=
      - name: key-1
        secret: dGhpcnR5LXR3by1ieXRlcy1sb25nLXRlc3Qta2V5ISE=
"#,
        )
        .expect("parse spec");

        assert_eq!(spec.resources.len(), 1);
        let sel = &spec.resources[0];
        assert_eq!(sel.group_resources.len(), 2);
        assert_eq!(sel.keys[0].name, "key-2");

        let json = serde_json::to_value(&spec).expect("serialize");
        assert_eq!(json["resources"][0]["groupResources"][0], "secrets");
    }
}
