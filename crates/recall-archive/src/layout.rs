//! Archive directory-layout reader
//!
//! Layout produced by the backup engine:
//!
//! ```text
//! <root>/
//!   filters/
//!     statussubresource.json
//!   <resource>.<group>#<version>/
//!     <name>.json                  cluster-scoped object
//!     <namespace>/<name>.json      namespaced object
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use recall_common::{Error, GroupVersionResource, FILTERS_DIR};
use tracing::debug;

/// Filename suffix of per-object files
const OBJECT_SUFFIX: &str = ".json";

/// An extracted backup archive rooted at a directory
#[derive(Debug, Clone)]
pub struct Archive {
    root: PathBuf,
}

impl Archive {
    /// Open an extracted archive directory
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::archive(format!(
                "archive root {} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    /// The archive root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Enumerate kind directories, skipping `filters/` and stray files.
    ///
    /// Entries come back name-sorted so replay tie-breaking is stable across
    /// filesystems.
    pub fn kind_dirs(&self) -> Result<Vec<KindDir>, Error> {
        let mut dirs = Vec::new();
        for entry in read_dir_sorted(&self.root)? {
            if !entry.is_dir() {
                continue;
            }
            let name = file_name(&entry);
            if name == FILTERS_DIR {
                continue;
            }
            let gvr = GroupVersionResource::parse_kind_dir(&name)?;
            dirs.push(KindDir {
                path: entry,
                name,
                gvr,
            });
        }
        Ok(dirs)
    }

    /// The kind directory for a triple, if the archive captured that kind
    pub fn kind_dir(&self, gvr: &GroupVersionResource) -> Option<KindDir> {
        let name = gvr.kind_dir();
        let path = self.root.join(&name);
        path.is_dir().then(|| KindDir {
            path,
            name,
            gvr: gvr.clone(),
        })
    }

    /// Compute the archive file path an object of `gvr` would have.
    ///
    /// Used to derive a parent's source path from an owner reference; the
    /// file need not exist.
    pub fn object_path(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
    ) -> PathBuf {
        let mut path = self.root.join(gvr.kind_dir());
        if let Some(ns) = namespace {
            path.push(ns);
        }
        path.push(format!("{name}{OBJECT_SUFFIX}"));
        path
    }

    /// Whether a source path exists as an object file in this archive
    pub fn contains(&self, source_path: &Path) -> bool {
        source_path.is_file()
    }
}

/// One kind directory inside the archive
#[derive(Debug, Clone)]
pub struct KindDir {
    /// Absolute path of the directory
    pub path: PathBuf,
    /// Directory name, `<resource>.<group>#<version>`
    pub name: String,
    /// Parsed group/version/resource triple
    pub gvr: GroupVersionResource,
}

impl KindDir {
    /// Whether this directory holds CustomResourceDefinition objects
    pub fn is_crd_dir(&self) -> bool {
        recall_common::CRD_KIND_DIRS.contains(&self.name.as_str())
    }

    /// Enumerate object files: regular files at depth 1 are cluster-scoped,
    /// files under a single subdirectory level are namespaced (the
    /// subdirectory name is the namespace). Name-sorted at each level.
    pub fn object_files(&self) -> Result<Vec<ObjectFile>, Error> {
        let mut files = Vec::new();
        for entry in read_dir_sorted(&self.path)? {
            if entry.is_dir() {
                let namespace = file_name(&entry);
                for object in read_dir_sorted(&entry)? {
                    if !object.is_file() {
                        debug!(path = %object.display(), "skipping unexpected entry in namespace directory");
                        continue;
                    }
                    files.push(ObjectFile {
                        name: object_name(&object),
                        namespace: Some(namespace.clone()),
                        path: object,
                    });
                }
            } else {
                files.push(ObjectFile {
                    name: object_name(&entry),
                    namespace: None,
                    path: entry,
                });
            }
        }
        Ok(files)
    }
}

/// One object file inside a kind directory
#[derive(Debug, Clone)]
pub struct ObjectFile {
    /// Absolute path of the file; the identity of the object in the graph
    pub path: PathBuf,
    /// Object name (filename without the `.json` suffix)
    pub name: String,
    /// Namespace, when the file sits under a namespace subdirectory
    pub namespace: Option<String>,
}

impl ObjectFile {
    /// Additional authenticated data binding the envelope to this object:
    /// `<namespace>#<name>` for namespaced objects, `<name>` otherwise.
    pub fn aad(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}#{}", ns, self.name),
            None => self.name.clone(),
        }
    }

    /// Read the raw file bytes
    pub fn read(&self) -> Result<Vec<u8>, Error> {
        fs::read(&self.path).map_err(|e| {
            Error::archive(format!("failed to read {}: {}", self.path.display(), e))
        })
    }
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let entries = fs::read_dir(dir)
        .map_err(|e| Error::archive(format!("failed to list {}: {}", dir.display(), e)))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|e| Error::archive(format!("failed to list {}: {}", dir.display(), e)))?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn object_name(path: &Path) -> String {
    let name = file_name(path);
    name.strip_suffix(OBJECT_SUFFIX)
        .map(|s| s.to_string())
        .unwrap_or(name)
}
