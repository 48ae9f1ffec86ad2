//! Staging of uploaded images on disk.
//!
//! Every upload gets its own generated file name in the upload directory; the
//! client's filename contributes at most a sanitised extension. The file is
//! removed when the [`ScopedUpload`] is released or dropped, whichever comes
//! first, so every exit path of a request cleans up.

use std::io;
use std::path::Path;

use tempfile::TempPath;
use tracing::{debug, warn};

pub const UPLOAD_PREFIX: &str = "temp_";

const MAX_EXTENSION_LEN: usize = 8;

pub struct ScopedUpload {
    path: TempPath,
}

impl ScopedUpload {
    /// Creates an empty, uniquely named file and returns it open for writing.
    pub fn create(dir: &Path, original_name: Option<&str>) -> io::Result<(Self, tokio::fs::File)> {
        let suffix = extension_suffix(original_name);
        let named = tempfile::Builder::new()
            .prefix(UPLOAD_PREFIX)
            .suffix(&suffix)
            .tempfile_in(dir)?;

        let (file, path) = named.into_parts();
        debug!("Staging upload at {}", path.display());

        Ok((Self { path }, tokio::fs::File::from_std(file)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the staged file. Failures are logged, never propagated.
    pub fn release(self) {
        let shown = self.path.display().to_string();
        if let Err(err) = self.path.close() {
            warn!("Failed to remove staged upload {}: {}", shown, err);
        }
    }
}

/// `.ext` from the client filename when it is short and alphanumeric, else empty.
pub fn extension_suffix(original_name: Option<&str>) -> String {
    let extension = original_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        });

    match extension {
        Some(ext) => format!(".{}", ext.to_ascii_lowercase()),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn suffix_keeps_only_safe_extensions() {
        assert_eq!(extension_suffix(Some("leaf.JPG")), ".jpg");
        assert_eq!(extension_suffix(Some("../../etc/passwd")), "");
        assert_eq!(extension_suffix(Some("../../x.png")), ".png");
        assert_eq!(extension_suffix(Some("weird.p/ng")), "");
        assert_eq!(extension_suffix(Some("archive.verylongext")), "");
        assert_eq!(extension_suffix(Some("noext")), "");
        assert_eq!(extension_suffix(None), "");
    }

    #[tokio::test]
    async fn release_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let (upload, mut file) = ScopedUpload::create(dir.path(), Some("leaf.png")).unwrap();
        file.write_all(b"bytes").await.unwrap();
        file.flush().await.unwrap();
        drop(file);

        let path = upload.path().to_path_buf();
        assert!(path.exists());
        assert!(path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(UPLOAD_PREFIX) && n.ends_with(".png")));

        upload.release();
        assert!(!path.exists());
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn drop_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (_upload, _file) = ScopedUpload::create(dir.path(), Some("leaf.png")).unwrap();
            assert_eq!(entries(dir.path()), 1);
        }
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn same_client_name_gets_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let (first, _f1) = ScopedUpload::create(dir.path(), Some("leaf.png")).unwrap();
        let (second, _f2) = ScopedUpload::create(dir.path(), Some("leaf.png")).unwrap();

        assert_ne!(first.path(), second.path());

        first.release();
        assert!(second.path().exists());
        second.release();
    }

    #[tokio::test]
    async fn release_tolerates_a_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let (upload, _file) = ScopedUpload::create(dir.path(), None).unwrap();
        std::fs::remove_file(upload.path()).unwrap();

        upload.release();
    }
}
