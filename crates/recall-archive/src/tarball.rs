//! Tarball extraction for restore

use std::fs::File;
use std::path::Path;

use flate2::read::GzDecoder;
use recall_common::Error;
use tracing::info;

/// Extract a gzipped tarball into the destination directory.
///
/// The destination must already exist. Entries that would escape it
/// (absolute paths, `..` components) are rejected rather than written.
pub fn unpack_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<(), Error> {
    let file = File::open(archive_path).map_err(|e| {
        Error::archive(format!(
            "failed to open backup archive {}: {}",
            archive_path.display(),
            e
        ))
    })?;

    let mut archive = tar::Archive::new(GzDecoder::new(file));

    // unpack_in skips entries that would escape dest_dir; a skipped entry
    // must fail the restore, not vanish from it
    archive.set_preserve_permissions(false);
    for entry in archive.entries().map_err(|e| {
        Error::archive(format!(
            "failed to read backup archive {}: {}",
            archive_path.display(),
            e
        ))
    })? {
        let mut entry = entry.map_err(|e| {
            Error::archive(format!("corrupt entry in backup archive: {}", e))
        })?;
        let unpacked = entry.unpack_in(dest_dir).map_err(|e| {
            Error::archive(format!("failed to extract backup entry: {}", e))
        })?;
        if !unpacked {
            let path = entry.path().map(|p| p.display().to_string());
            return Err(Error::archive(format!(
                "backup entry {:?} escapes the extraction directory",
                path.unwrap_or_default()
            )));
        }
    }

    info!(archive = %archive_path.display(), dest = %dest_dir.display(), "unpacked backup archive");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn build_tar_gz(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, contents.as_bytes())
                .expect("append entry");
        }
        builder
            .into_inner()
            .expect("finish tar")
            .finish()
            .expect("finish gzip")
    }

    #[test]
    fn unpacks_nested_layout() {
        let bytes = build_tar_gz(&[
            ("widgets.example.io#v1/w1.json", "{\"kind\":\"Widget\"}"),
            ("widgets.example.io#v1/ns1/w2.json", "{\"kind\":\"Widget\"}"),
            ("filters/statussubresource.json", "{}"),
        ]);

        let dir = tempfile::tempdir().expect("tempdir");
        let archive_path = dir.path().join("backup.tar.gz");
        std::fs::write(&archive_path, bytes).expect("write archive");
        let dest = dir.path().join("out");
        std::fs::create_dir(&dest).expect("dest dir");

        unpack_tar_gz(&archive_path, &dest).expect("unpack");

        assert!(dest.join("widgets.example.io#v1/w1.json").is_file());
        assert!(dest.join("widgets.example.io#v1/ns1/w2.json").is_file());
        assert!(dest.join("filters/statussubresource.json").is_file());
    }

    #[test]
    fn missing_archive_is_an_archive_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = unpack_tar_gz(&dir.path().join("nope.tar.gz"), dir.path()).unwrap_err();
        assert!(matches!(err, Error::Archive { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn garbage_bytes_are_an_archive_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive_path = dir.path().join("bad.tar.gz");
        std::fs::write(&archive_path, b"not a gzip stream").expect("write");
        let err = unpack_tar_gz(&archive_path, dir.path()).unwrap_err();
        assert!(matches!(err, Error::Archive { .. }));
    }
}
