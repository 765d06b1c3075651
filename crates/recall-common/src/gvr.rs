//! Group/version/resource triples and their archive encodings
//!
//! The backup writer lays objects out under one directory per kind, named
//! `<resource>.<group>#<version>` (trailing dot suppressed for the core
//! group, e.g. `configmaps#v1`). Everything that needs to translate between
//! directory names, filter keys, and API coordinates goes through the types
//! here.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A group/resource pair, the granularity at which archive encryption is keyed
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct GroupResource {
    /// API group (empty for the core group)
    pub group: String,
    /// Plural, lowercase resource name
    pub resource: String,
}

impl GroupResource {
    /// Parse a `<resource>.<group>` string (`secrets`, `catalogs.management.example.io`).
    ///
    /// The resource is everything before the first dot; the remainder is the
    /// group. No dot means the core group.
    pub fn parse(s: &str) -> Self {
        match s.split_once('.') {
            Some((resource, group)) => Self {
                group: group.to_string(),
                resource: resource.to_string(),
            },
            None => Self {
                group: String::new(),
                resource: s.to_string(),
            },
        }
    }
}

impl std::fmt::Display for GroupResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}.{}", self.resource, self.group)
        }
    }
}

/// A group/version/resource triple identifying an API surface endpoint
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct GroupVersionResource {
    /// API group (empty for the core group)
    pub group: String,
    /// API version within the group
    pub version: String,
    /// Plural, lowercase resource name
    pub resource: String,
}

impl GroupVersionResource {
    /// Construct from parts
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }

    /// Parse an archive kind-directory name, e.g. `catalogs.management.example.io#v3`.
    ///
    /// The right half of the `#` is the version; the left half splits at the
    /// first dot into resource and group. `configmaps#v1` parses to the core
    /// group.
    pub fn parse_kind_dir(dir_name: &str) -> Result<Self, Error> {
        let (left, version) = dir_name.split_once('#').ok_or_else(|| {
            Error::archive(format!("kind directory {dir_name:?} missing '#' separator"))
        })?;
        if left.is_empty() || version.is_empty() {
            return Err(Error::archive(format!(
                "kind directory {dir_name:?} has an empty resource or version"
            )));
        }
        let gr = GroupResource::parse(left.trim_end_matches('.'));
        Ok(Self {
            group: gr.group,
            version: version.to_string(),
            resource: gr.resource,
        })
    }

    /// Render the archive kind-directory name for this triple.
    ///
    /// Matches the backup writer: the dot before the group is suppressed for
    /// the core group.
    pub fn kind_dir(&self) -> String {
        if self.group.is_empty() {
            format!("{}#{}", self.resource, self.version)
        } else {
            format!("{}.{}#{}", self.resource, self.group, self.version)
        }
    }

    /// Key used in the status-subresource filter manifest:
    /// `group/version/resource`, with the empty core group omitted.
    pub fn key(&self) -> String {
        if self.group.is_empty() {
            format!("{}/{}", self.version, self.resource)
        } else {
            format!("{}/{}/{}", self.group, self.version, self.resource)
        }
    }

    /// The group/resource pair, used to look up the decryption transformer
    pub fn group_resource(&self) -> GroupResource {
        GroupResource {
            group: self.group.clone(),
            resource: self.resource.clone(),
        }
    }
}

impl std::fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Parse an `apiVersion` string into (group, version).
///
/// `apps/v1` splits into both parts; a bare `v1` means the core group.
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_kind_dir_with_group() {
        let gvr = GroupVersionResource::parse_kind_dir("catalogs.management.example.io#v3")
            .expect("parse");
        assert_eq!(gvr.group, "management.example.io");
        assert_eq!(gvr.version, "v3");
        assert_eq!(gvr.resource, "catalogs");
    }

    #[test]
    fn parse_kind_dir_core_group() {
        let gvr = GroupVersionResource::parse_kind_dir("configmaps#v1").expect("parse");
        assert_eq!(gvr.group, "");
        assert_eq!(gvr.version, "v1");
        assert_eq!(gvr.resource, "configmaps");
    }

    #[test]
    fn parse_kind_dir_tolerates_trailing_dot() {
        // Some writers render the core group as "<resource>.#<version>"
        let gvr = GroupVersionResource::parse_kind_dir("secrets.#v1").expect("parse");
        assert_eq!(gvr.group, "");
        assert_eq!(gvr.resource, "secrets");
    }

    #[test]
    fn parse_kind_dir_rejects_malformed() {
        assert!(GroupVersionResource::parse_kind_dir("no-separator").is_err());
        assert!(GroupVersionResource::parse_kind_dir("#v1").is_err());
        assert!(GroupVersionResource::parse_kind_dir("pods#").is_err());
    }

    #[test]
    fn kind_dir_round_trips() {
        for name in ["configmaps#v1", "catalogs.management.example.io#v3"] {
            let gvr = GroupVersionResource::parse_kind_dir(name).expect("parse");
            assert_eq!(gvr.kind_dir(), name);
        }
    }

    #[test]
    fn filter_key_omits_core_group() {
        assert_eq!(
            GroupVersionResource::new("", "v1", "pods").key(),
            "v1/pods"
        );
        assert_eq!(
            GroupVersionResource::new("apps", "v1", "deployments").key(),
            "apps/v1/deployments"
        );
    }

    #[test]
    fn group_resource_parse() {
        let gr = GroupResource::parse("catalogs.management.example.io");
        assert_eq!(gr.resource, "catalogs");
        assert_eq!(gr.group, "management.example.io");

        let core = GroupResource::parse("secrets");
        assert_eq!(core.resource, "secrets");
        assert_eq!(core.group, "");
        assert_eq!(core.to_string(), "secrets");
    }

    #[test]
    fn api_version_parsing() {
        assert_eq!(
            parse_api_version("apps/v1"),
            ("apps".to_string(), "v1".to_string())
        );
        assert_eq!(parse_api_version("v1"), ("".to_string(), "v1".to_string()));
    }
}
