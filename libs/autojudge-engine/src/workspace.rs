use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Exclusive working directory for one engine invocation.
///
/// The directory is removed when the guard drops, whichever way the round
/// ends (success, build failure, timeout, panic or cancellation).
pub struct WorkArea {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl WorkArea {
    pub fn allocate() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("submission-").tempdir()?;
        let path = dir.path().to_path_buf();
        debug!(path = %path.display(), "Allocated working area");
        Ok(Self { dir: Some(dir), path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    pub async fn write_source(&self, name: &str, code: &str) -> io::Result<PathBuf> {
        let path = self.file(name);
        tokio::fs::write(&path, code).await?;
        Ok(path)
    }
}

impl Drop for WorkArea {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                warn!(path = %self.path.display(), error = %e, "Failed to remove working area");
            } else {
                debug!(path = %self.path.display(), "Released working area");
            }
        }
    }
}
