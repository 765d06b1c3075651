//! Backup archive access for Recall
//!
//! A backup is a gzipped tarball of one directory per captured kind, named
//! `<resource>.<group>#<version>`, holding one JSON file per object
//! (namespaced objects live one level deeper, under their namespace).
//! This crate unpacks the tarball and walks that layout; it knows nothing
//! about decryption or the live cluster.

#![deny(missing_docs)]

mod filters;
mod layout;
mod tarball;

pub use filters::load_status_subresource_set;
pub use layout::{Archive, KindDir, ObjectFile};
pub use tarball::unpack_tar_gz;
