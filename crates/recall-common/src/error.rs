//! Error types for the Recall restore engine
//!
//! Errors are structured with fields to aid debugging in production. Each
//! variant carries the object or API coordinate it relates to. Per-object
//! errors are aggregated by the replay engine rather than aborting the
//! restore; fatal errors abort it outright.

use thiserror::Error;

/// Main error type for restore operations
#[derive(Debug, Error)]
pub enum Error {
    /// Archive extraction or layout read failure; fatal to the whole restore
    #[error("archive error: {message}")]
    Archive {
        /// Description of what failed
        message: String,
    },

    /// Envelope decryption failed for one object; the object is skipped
    #[error("decryption error for {object}: {message}")]
    Decryption {
        /// Archive path of the object that failed to decrypt
        object: String,
        /// Description of what failed (AAD mismatch, integrity failure, ...)
        message: String,
    },

    /// Kind-to-resource resolution against live discovery failed
    #[error("mapping error for {gvk}: {message}")]
    Mapping {
        /// The group/version/kind that could not be resolved
        gvk: String,
        /// Description of what failed
        message: String,
    },

    /// A live GET for an owner failed while rewriting owner references
    #[error("owner resolve error for {owner}: {message}")]
    OwnerResolve {
        /// Name (and namespace, when namespaced) of the owner
        owner: String,
        /// Description of what failed
        message: String,
    },

    /// CREATE/UPDATE/UPDATE-STATUS failed for one object
    #[error("apply error for {object}: {message}")]
    Apply {
        /// Name of the object that failed to apply
        object: String,
        /// Description of what failed
        message: String,
    },

    /// The enclosing cancellation token fired mid-restore
    #[error("restore cancelled after {applied} object(s) applied; {} earlier failure(s)", .errors.len())]
    Cancelled {
        /// Objects applied before cancellation
        applied: usize,
        /// Per-object errors accumulated before cancellation
        errors: Vec<Error>,
    },

    /// Per-object failures collected over a full replay
    #[error("replay finished with {} object failure(s): [{}]", .errors.len(), summarize(.errors))]
    Aggregate {
        /// The individual per-object errors, in replay order
        errors: Vec<Error>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Kubernetes API error outside a per-object apply
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },
}

/// Join the messages of aggregated errors for a one-line summary
fn summarize(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Create an archive error
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive {
            message: msg.into(),
        }
    }

    /// Create a decryption error for the given archive object
    pub fn decryption(object: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Decryption {
            object: object.into(),
            message: msg.into(),
        }
    }

    /// Create a mapping error for the given group/version/kind
    pub fn mapping(gvk: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Mapping {
            gvk: gvk.into(),
            message: msg.into(),
        }
    }

    /// Create an owner-resolve error for the given owner
    pub fn owner_resolve(owner: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::OwnerResolve {
            owner: owner.into(),
            message: msg.into(),
        }
    }

    /// Create an apply error for the given object
    pub fn apply(object: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Apply {
            object: object.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Collapse a list of per-object errors into a single composite error.
    ///
    /// Returns `None` when the list is empty so callers can write
    /// `Error::aggregate(errs).map_or(Ok(()), Err)`.
    pub fn aggregate(errors: Vec<Error>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self::Aggregate { errors })
        }
    }

    /// Whether this error aborts the whole restore.
    ///
    /// Per-object errors (decryption, owner resolution, apply) are recorded
    /// and the replay continues; everything else is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::Decryption { .. } | Error::OwnerResolve { .. } | Error::Apply { .. }
        )
    }

    /// The archive path or object name this error relates to, when known
    pub fn object(&self) -> Option<&str> {
        match self {
            Error::Decryption { object, .. } => Some(object),
            Error::Apply { object, .. } => Some(object),
            Error::OwnerResolve { owner, .. } => Some(owner),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Error Propagation During a Restore
    // ==========================================================================

    /// Story: a corrupt tarball stops the restore before anything is applied
    #[test]
    fn story_archive_errors_are_fatal() {
        let err = Error::archive("unexpected EOF while reading tar header");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("archive error"));
        assert!(err.to_string().contains("unexpected EOF"));
    }

    /// Story: a ciphertext sealed for another object fails AAD validation
    /// and only that object is skipped
    #[test]
    fn story_decryption_errors_name_the_object() {
        let err = Error::decryption("widgets.example.io#v1/ns1/w1.json", "aead open failed");
        assert!(!err.is_fatal());
        assert_eq!(err.object(), Some("widgets.example.io#v1/ns1/w1.json"));
        assert!(err.to_string().contains("aead open failed"));
    }

    /// Story: a kind the cluster no longer serves aborts graph construction
    #[test]
    fn story_mapping_errors_are_fatal() {
        let err = Error::mapping("example.io/v1/Widget", "no matches for kind");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("example.io/v1/Widget"));
    }

    /// Story: per-object failures collect into one composite error with a
    /// readable summary
    #[test]
    fn story_replay_aggregates_per_object_failures() {
        let errs = vec![
            Error::apply("w1", "admission webhook denied"),
            Error::owner_resolve("ns1/parent", "404 not found"),
        ];
        let agg = Error::aggregate(errs).expect("non-empty list aggregates");
        let text = agg.to_string();
        assert!(text.contains("2 object failure(s)"));
        assert!(text.contains("admission webhook denied"));
        assert!(text.contains("ns1/parent"));

        assert!(Error::aggregate(vec![]).is_none());
    }

    /// Story: cancellation reports how far the replay got
    #[test]
    fn story_cancellation_carries_progress() {
        let err = Error::Cancelled {
            applied: 7,
            errors: vec![Error::apply("w1", "timeout")],
        };
        let text = err.to_string();
        assert!(text.contains("after 7 object(s)"));
        assert!(text.contains("1 earlier failure(s)"));
    }

    #[test]
    fn per_object_errors_are_not_fatal() {
        assert!(!Error::apply("x", "conflict").is_fatal());
        assert!(!Error::owner_resolve("x", "not found").is_fatal());
        assert!(!Error::decryption("x", "bad tag").is_fatal());
        assert!(Error::serialization("bad json").is_fatal());
    }
}
