//! Restore Custom Resource Definition
//!
//! A `Restore` object asks the operator to replay a previously captured
//! backup archive into the live cluster. The controller drives it through
//! `Pending → InProgress → Completed | Failed` and records the outcome on
//! the status subresource.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

/// Phase of a Restore
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum RestorePhase {
    /// Restore has not started yet
    #[default]
    Pending,
    /// The engine is replaying the archive
    InProgress,
    /// All archive objects were applied (stranded objects may remain)
    Completed,
    /// The restore aborted, or finished with per-object failures
    Failed,
}

impl std::fmt::Display for RestorePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Where the backup tarball lives
///
/// Exactly one of `local` or `s3` should be set. Local means a directory
/// path visible to the operator; S3 fetches are delegated to the configured
/// object-store client.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageLocation {
    /// Directory containing the backup tarball
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<String>,

    /// S3-style object store holding the backup tarball
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3StorageConfig>,
}

/// S3 storage configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct S3StorageConfig {
    /// Bucket name
    pub bucket: String,

    /// Region the bucket lives in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible storage (e.g., MinIO)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Key prefix within the bucket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,

    /// Kubernetes secret holding access credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_secret_name: Option<String>,
}

/// Status of a Restore
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RestoreStatus {
    /// Current phase
    #[serde(default)]
    pub phase: RestorePhase,

    /// Number of objects applied so far
    #[serde(default)]
    pub restored_objects: u32,

    /// Objects whose archive parents never resolved and were not applied
    #[serde(default)]
    pub stranded_objects: u32,

    /// Timestamp when the restore started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    /// Timestamp when the restore finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Human-readable message (the aggregated failure summary on Failed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Observed generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Specification for a Restore
///
/// Names the backup archive, where to fetch it from, and the encryption
/// configuration needed to open sealed resource groups.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "recall.dev",
    version = "v1alpha1",
    kind = "Restore",
    plural = "restores",
    shortname = "rst",
    namespaced,
    status = "RestoreStatus",
    printcolumn = r#"{"name":"Backup","type":"string","jsonPath":".spec.backupFilename"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Objects","type":"integer","jsonPath":".status.restoredObjects"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSpec {
    /// Backup archive filename, `<name>.tar.gz`
    pub backup_filename: String,

    /// Where the archive is stored
    pub storage_location: StorageLocation,

    /// Name of the EncryptionConfig (in the `default` namespace) whose keys
    /// seal encrypted resource groups; absent means the archive is clear text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_config_name: Option<String>,

    /// Run the post-restore prune pass (handled outside the engine)
    #[serde(default)]
    pub prune: bool,

    /// Per-object delete timeout for the prune pass, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_timeout_seconds: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_spec(yaml: &str) -> RestoreSpec {
        serde_yaml::from_str(yaml).expect("parse spec")
    }

    #[test]
    fn test_restore_roundtrip() {
        let spec = parse_spec(
            r#"
backupFilename: nightly-20260801.tar.gz
storageLocation:
  s3:
    bucket: cluster-backups
    region: us-east-1
    folder: prod
encryptionConfigName: default
prune: true
deleteTimeoutSeconds: 30
"#,
        );

        assert_eq!(spec.backup_filename, "nightly-20260801.tar.gz");
        let s3 = spec.storage_location.s3.expect("s3 location");
        assert_eq!(s3.bucket, "cluster-backups");
        assert_eq!(s3.region.as_deref(), Some("us-east-1"));
        assert_eq!(spec.encryption_config_name.as_deref(), Some("default"));
        assert!(spec.prune);
        assert_eq!(spec.delete_timeout_seconds, Some(30));
    }

    #[test]
    fn test_restore_defaults() {
        let spec = parse_spec(
            r#"
backupFilename: nightly.tar.gz
storageLocation:
  local: /var/backups
"#,
        );

        assert_eq!(
            spec.storage_location.local.as_deref(),
            Some("/var/backups")
        );
        assert!(spec.storage_location.s3.is_none());
        assert!(spec.encryption_config_name.is_none());
        assert!(!spec.prune);
        assert!(spec.delete_timeout_seconds.is_none());
    }

    #[test]
    fn test_restore_phase_display() {
        assert_eq!(RestorePhase::Pending.to_string(), "Pending");
        assert_eq!(RestorePhase::InProgress.to_string(), "InProgress");
        assert_eq!(RestorePhase::Completed.to_string(), "Completed");
        assert_eq!(RestorePhase::Failed.to_string(), "Failed");
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = RestoreStatus {
            phase: RestorePhase::Completed,
            restored_objects: 12,
            stranded_objects: 1,
            ..Default::default()
        };
        let json = serde_json::to_value(&status).expect("serialize");
        assert_eq!(json["phase"], "Completed");
        assert_eq!(json["restoredObjects"], 12);
        assert_eq!(json["strandedObjects"], 1);
        assert!(json.get("message").is_none());
    }
}
