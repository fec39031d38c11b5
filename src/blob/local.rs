use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};

use super::{BlobEntry, BlobError, BlobStore};

/// Bucket stored as a plain directory tree under `root`.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create blob root {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a bucket path, rejecting anything that could escape the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    /// Object stores have no real folders; drop directories the last remove emptied.
    fn prune_empty_parents(&self, file: &Path) {
        let mut dir = file.parent();
        while let Some(d) = dir {
            if d == self.root || std::fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
    }
}

impl BlobStore for LocalBlobStore {
    fn remove(&self, path: &str) -> Result<(), BlobError> {
        let full = self.resolve(path)?;
        match std::fs::remove_file(&full) {
            Ok(()) => {
                self.prune_empty_parents(&full);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path, "remove: object already absent");
                Ok(())
            }
            Err(e) => Err(BlobError::Io(e)),
        }
    }

    fn copy(&self, from: &str, to: &str) -> Result<(), BlobError> {
        let src = self.resolve(from)?;
        let dest = self.resolve(to)?;
        if !src.is_file() {
            return Err(BlobError::NotFound(from.to_string()));
        }
        if dest.exists() {
            return Err(BlobError::AlreadyExists(to.to_string()));
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&src, &dest)?;
        Ok(())
    }

    fn upload(&self, path: &str, bytes: &[u8], _content_type: &str) -> Result<(), BlobError> {
        let dest = self.resolve(path)?;
        if dest.exists() {
            return Err(BlobError::AlreadyExists(path.to_string()));
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Atomic write: tmp + rename
        let tmp = dest.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &dest)?;
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<BlobEntry>, BlobError> {
        let dir = self.resolve(prefix)?;
        let read = match std::fs::read_dir(&dir) {
            Ok(read) => read,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BlobError::Io(e)),
        };
        let mut entries = Vec::new();
        for entry in read {
            let entry = entry?;
            entries.push(BlobEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_folder: entry.file_type()?.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn download(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        let full = self.resolve(path)?;
        std::fs::read(&full).map_err(|e| match e.kind() {
            ErrorKind::NotFound => BlobError::NotFound(path.to_string()),
            _ => BlobError::Io(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalBlobStore) {
        let tmp = TempDir::new().unwrap();
        let store = LocalBlobStore::new(tmp.path().join("screenshots")).unwrap();
        (tmp, store)
    }

    #[test]
    fn upload_copy_remove_roundtrip() {
        let (_tmp, store) = store();
        store.upload("pois/a.png", b"png", "image/png").unwrap();
        store.copy("pois/a.png", "backups/b1/files/pois/a.png").unwrap();
        assert!(store.root().join("backups/b1/files/pois/a.png").is_file());

        store.remove("pois/a.png").unwrap();
        assert!(!store.root().join("pois/a.png").exists());
    }

    #[test]
    fn remove_drops_emptied_folders() {
        let (_tmp, store) = store();
        store.upload("backups/b1/files/a.png", b"1", "image/png").unwrap();
        store.upload("backups/b2/x.json", b"{}", "application/json").unwrap();
        store.remove("backups/b1/files/a.png").unwrap();

        assert!(!store.root().join("backups/b1").exists());
        assert!(store.root().join("backups/b2").is_dir());
        assert!(store.root().exists());
    }

    #[test]
    fn download_reads_back_and_reports_missing() {
        let (_tmp, store) = store();
        store.upload("backups/b1/backup_metadata.json", b"{\"a\":1}", "application/json").unwrap();
        assert_eq!(store.download("backups/b1/backup_metadata.json").unwrap(), b"{\"a\":1}");
        assert!(matches!(store.download("backups/b2/x.json"), Err(BlobError::NotFound(_))));
    }

    #[test]
    fn remove_missing_object_is_ok() {
        let (_tmp, store) = store();
        store.remove("nope/missing.png").unwrap();
    }

    #[test]
    fn copy_onto_existing_reports_already_exists() {
        let (_tmp, store) = store();
        store.upload("a.png", b"1", "image/png").unwrap();
        store.upload("b.png", b"2", "image/png").unwrap();
        assert!(matches!(store.copy("a.png", "b.png"), Err(BlobError::AlreadyExists(_))));
    }

    #[test]
    fn parent_traversal_is_rejected() {
        let (_tmp, store) = store();
        assert!(matches!(store.remove("../escape.png"), Err(BlobError::InvalidPath(_))));
        assert!(matches!(store.remove("/etc/passwd"), Err(BlobError::InvalidPath(_))));
    }

    #[test]
    fn list_distinguishes_folders() {
        let (_tmp, store) = store();
        store.upload("backups/backup_x/meta.json", b"{}", "application/json").unwrap();
        store.upload("backups/loose.txt", b"", "text/plain").unwrap();

        let entries = store.list("backups").unwrap();
        assert_eq!(
            entries,
            vec![
                BlobEntry { name: "backup_x".into(), is_folder: true },
                BlobEntry { name: "loose.txt".into(), is_folder: false },
            ]
        );
        assert!(store.list("absent").unwrap().is_empty());
    }
}
