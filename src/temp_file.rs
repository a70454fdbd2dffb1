use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

/// Intermediate file that is removed when the guard goes out of scope,
/// whichever way the owning function returns.
pub struct TempFile {
    path: PathBuf,
}

impl TempFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Removed intermediate {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove file {:?}: {}", self.path, e),
        }
    }
}
