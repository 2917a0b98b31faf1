use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::error::StorageError;
use crate::storage::ByteStore;

/// Maps storage references to files under a root directory.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a reference to a path under the root. Absolute references
    /// and parent-directory components are rejected.
    pub fn resolve(&self, reference: &str) -> Result<PathBuf, StorageError> {
        if reference.is_empty() {
            return Err(StorageError::InvalidReference(reference.to_string()));
        }
        let relative = Path::new(reference);
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(StorageError::InvalidReference(reference.to_string())),
            }
        }
        Ok(self.root.join(relative))
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.is_dir() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}

impl ByteStore for FileStorage {
    fn read(&self, reference: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(reference)?;
        std::fs::read(&path).map_err(|e| StorageError::ReadFile { path, source: e })
    }

    fn write(&self, reference: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(reference)?;
        if let Some(parent) = path.parent() {
            self.ensure_directory(parent)?;
        }

        // Write beside the target, then rename into place.
        let staging = path.with_file_name(format!(
            ".{}.{}.partial",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&staging, bytes).map_err(|e| StorageError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        if let Err(e) = std::fs::rename(&staging, &path) {
            let _ = std::fs::remove_file(&staging);
            return Err(StorageError::WriteFile { path, source: e });
        }
        Ok(())
    }

    fn delete(&self, reference: &str) -> Result<(), StorageError> {
        let path = self.resolve(reference)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFile { path, source: e }),
        }
    }
}
