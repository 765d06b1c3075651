//! Backup filter manifests
//!
//! The backup engine records which captured kinds expose a status
//! subresource in `filters/statussubresource.json`, a JSON object mapping
//! `group/version/resource` keys to booleans.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use recall_common::{Error, FILTERS_DIR, STATUS_SUBRESOURCE_FILE};
use tracing::debug;

/// Load the set of `group/version/resource` keys whose kind has a status
/// subresource.
///
/// Only `true` entries matter. A missing manifest means no kind needs a
/// status write (empty and filter-less archives restore as no-ops).
pub fn load_status_subresource_set(root: &Path) -> Result<HashSet<String>, Error> {
    let path = root.join(FILTERS_DIR).join(STATUS_SUBRESOURCE_FILE);
    if !path.is_file() {
        debug!(path = %path.display(), "no status-subresource manifest in archive");
        return Ok(HashSet::new());
    }

    let bytes = std::fs::read(&path)
        .map_err(|e| Error::archive(format!("failed to read {}: {}", path.display(), e)))?;
    let entries: HashMap<String, bool> = serde_json::from_slice(&bytes).map_err(|e| {
        Error::archive(format!(
            "malformed status-subresource manifest {}: {}",
            path.display(),
            e
        ))
    })?;

    Ok(entries
        .into_iter()
        .filter_map(|(key, has_status)| has_status.then_some(key))
        .collect())
}
