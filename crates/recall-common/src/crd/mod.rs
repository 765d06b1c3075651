//! Custom Resource Definitions for Recall
//!
//! This module contains the CRDs served by the Recall operator: the
//! `Restore` request surface and the `EncryptionConfig` holding
//! per-group-resource envelope keys.

mod encryption_config;
mod restore;
mod types;

pub use encryption_config::{
    EncryptionConfig, EncryptionConfigSpec, EncryptionKey, ResourceSelection,
};
pub use restore::{Restore, RestorePhase, RestoreSpec, RestoreStatus, S3StorageConfig, StorageLocation};
pub use types::{Condition, ConditionStatus};
