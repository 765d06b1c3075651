//! Dependency graph over the archive
//!
//! Nodes are archive source paths. For every object declaring owners, each
//! distinct archive-resolvable parent path gets the object appended to its
//! dependents list and bumps the object's unresolved-parent counter; objects
//! with no owners seed the ready queue. The replay engine drains the queue
//! and feeds completions back through [`DependencyGraph::mark_created`].
//!
//! Parents that are not files in the archive still count, so their
//! dependents stay blocked and surface in [`DependencyGraph::stranded`]
//! after the queue drains.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use recall_archive::Archive;
use recall_common::gvr::parse_api_version;
use recall_common::Error;
use recall_crypto::{maybe_decrypt, TransformerMap};
use serde_json::Value;
use tracing::{debug, warn};

use crate::mapping::KindResolver;
use crate::object::RestoreObject;

/// Owner-to-dependents adjacency plus per-object unresolved-parent counters
#[derive(Default)]
pub struct DependencyGraph {
    /// Blocked objects by source key
    blocked: HashMap<String, RestoreObject>,
    /// Parent source key → keys of objects waiting on it
    dependents: HashMap<String, Vec<String>>,
    /// Source key → count of parents not yet applied
    unresolved_parents: HashMap<String, usize>,
    /// Objects with no unresolved parents, in builder iteration order
    ready: VecDeque<RestoreObject>,
    /// Source keys applied in this run
    created: HashSet<String>,
    /// Per-object errors recorded while reading the archive
    errors: Vec<Error>,
}

impl DependencyGraph {
    /// Mark paths as already applied (the definition installer seeds these
    /// so instances owned by a definition find their parent pre-satisfied).
    pub fn seed_created<I: IntoIterator<Item = String>>(&mut self, keys: I) {
        for key in keys {
            self.satisfy_dependents_of(&key);
            self.created.insert(key);
        }
    }

    /// Next object whose parents are all applied; `None` drains the queue.
    ///
    /// Objects already applied this run are skipped, so an object reachable
    /// through several parents still applies at most once.
    pub fn next_ready(&mut self) -> Option<RestoreObject> {
        while let Some(obj) = self.ready.pop_front() {
            if self.created.contains(&obj.source_key()) {
                debug!(object = %obj.source_key(), "already applied in this run");
                continue;
            }
            return Some(obj);
        }
        None
    }

    /// Record a successful apply and promote newly unblocked dependents
    pub fn mark_created(&mut self, source_key: &str) {
        self.created.insert(source_key.to_string());
        self.satisfy_dependents_of(source_key);
    }

    fn satisfy_dependents_of(&mut self, source_key: &str) {
        for dependent_key in self.dependents.remove(source_key).unwrap_or_default() {
            let Some(count) = self.unresolved_parents.get_mut(&dependent_key) else {
                continue;
            };
            if *count > 0 {
                *count -= 1;
            }
            if *count == 0 {
                self.unresolved_parents.remove(&dependent_key);
                if let Some(obj) = self.blocked.remove(&dependent_key) {
                    debug!(object = %dependent_key, "all parents applied, object is ready");
                    self.ready.push_back(obj);
                }
            }
        }
    }

    /// How many parents of `source_key` are still unapplied
    pub fn unresolved_count(&self, source_key: &str) -> usize {
        self.unresolved_parents.get(source_key).copied().unwrap_or(0)
    }

    /// Whether `source_key` was applied in this run
    pub fn is_created(&self, source_key: &str) -> bool {
        self.created.contains(source_key)
    }

    /// Source keys of objects whose parents never all resolved, sorted.
    ///
    /// These were never enqueued and never applied; an object whose owner
    /// is missing from the archive lands here.
    pub fn stranded(&self) -> Vec<String> {
        self.blocked.keys().cloned().collect::<BTreeSet<_>>().into_iter().collect()
    }

    /// Take the per-object errors recorded during construction
    pub fn take_errors(&mut self) -> Vec<Error> {
        std::mem::take(&mut self.errors)
    }

    /// Number of objects currently ready
    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }
}

/// Builds the dependency graph by walking every non-definition kind directory
pub struct GraphBuilder<'a> {
    archive: &'a Archive,
    transformers: &'a TransformerMap,
    resolver: &'a dyn KindResolver,
}

impl<'a> GraphBuilder<'a> {
    /// Create a builder over an extracted archive
    pub fn new(
        archive: &'a Archive,
        transformers: &'a TransformerMap,
        resolver: &'a dyn KindResolver,
    ) -> Self {
        Self {
            archive,
            transformers,
            resolver,
        }
    }

    /// Read, decrypt, and link every object into a graph.
    ///
    /// Decryption failures are recorded per object and skip just that
    /// object; unresolvable owner kinds abort construction (nothing useful
    /// can replay without knowing the parent's coordinates).
    pub async fn build(&self) -> Result<DependencyGraph, Error> {
        let mut graph = DependencyGraph::default();
        for kind_dir in self.archive.kind_dirs()? {
            if kind_dir.is_crd_dir() {
                continue;
            }
            let transformer = self.transformers.get(&kind_dir.gvr.group_resource());
            for file in kind_dir.object_files()? {
                let object_label = file.path.to_string_lossy().into_owned();
                let bytes = match maybe_decrypt(file.read()?, transformer, &file.aad(), &object_label)
                {
                    Ok(bytes) => bytes,
                    Err(e) if !e.is_fatal() => {
                        warn!(object = %object_label, error = %e, "skipping undecryptable object");
                        graph.errors.push(e);
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                let payload: Value = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::archive(format!("{} is not valid JSON: {}", object_label, e))
                })?;
                let Some(obj) =
                    RestoreObject::from_payload(kind_dir.gvr.clone(), &file.path, payload)
                else {
                    warn!(object = %object_label, "payload has no metadata.name, skipping");
                    continue;
                };
                self.link(&mut graph, obj).await?;
            }
        }
        Ok(graph)
    }

    /// Wire one object into the graph: enqueue it if it has no usable
    /// owners, otherwise register it under each distinct parent path.
    async fn link(&self, graph: &mut DependencyGraph, obj: RestoreObject) -> Result<(), Error> {
        let owners = obj.owner_entries();
        if owners.is_empty() {
            graph.ready.push_back(obj);
            return Ok(());
        }

        let mut parent_keys = BTreeSet::new();
        for (_, owner) in &owners {
            let (group, version) = parse_api_version(&owner.api_version);
            let (parent_gvr, namespaced) = self
                .resolver
                .resolve(&group, &version, &owner.kind)
                .await?;
            // A namespaced owner must live in the dependent's namespace
            let parent_ns = if namespaced {
                obj.namespace.as_deref()
            } else {
                None
            };
            let parent_path = self
                .archive
                .object_path(&parent_gvr, parent_ns, &owner.name);
            if !self.archive.contains(&parent_path) {
                debug!(
                    object = %obj.source_key(),
                    parent = %parent_path.display(),
                    "owner is not in the archive; object will stay blocked"
                );
            }
            parent_keys.insert(RestoreObject::key_for(&parent_path));
        }

        let key = obj.source_key();
        graph.unresolved_parents.insert(key.clone(), parent_keys.len());
        for parent_key in parent_keys {
            graph.dependents.entry(parent_key).or_default().push(key.clone());
        }
        graph.blocked.insert(key, obj);
        Ok(())
    }
}
