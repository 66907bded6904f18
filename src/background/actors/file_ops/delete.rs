use crate::common::MAX_DELETE_ATTEMPTS;
use anyhow::Context;
use anyhow::Result;
use std::{
    fs, io,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};
use tokio::task::spawn_blocking;

pub struct DeleteTask {
    pub path: PathBuf,
}

impl DeleteTask {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn run(self) -> Result<()> {
        spawn_blocking(move || delete_with_retry(self.path))
            .await
            .context("Delete task panicked")?
            .context("Failed to run delete task")
    }
}

/// Remove `path`, retrying transient failures.
///
/// A missing file is an error and is not retried: every artifact is
/// deleted exactly once, so absence means something else removed it.
pub fn delete_with_retry<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();

    let mut attempts = 0;
    loop {
        attempts += 1;
        match fs::remove_file(path) {
            Ok(_) => {
                log::debug!("Deleted file: {:?}", path);
                return Ok(());
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(err).context(format!("File {:?} does not exist", path));
            }
            Err(err) if attempts < MAX_DELETE_ATTEMPTS => {
                log::warn!(
                    "Failed deleting {:?} (attempt {}), retrying in {}ms: {}",
                    path,
                    attempts,
                    100 * attempts,
                    err
                );
                thread::sleep(Duration::from_millis(100 * attempts));
            }
            Err(err) => {
                return Err(err).context(format!(
                    "Failed deleting {:?} after {} attempts",
                    path, attempts
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn deletes_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("filtered.x.jpg");
        fs::write(&path, b"x").unwrap();

        DeleteTask::new(&path).run().await.unwrap();

        assert!(!path.exists());
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = delete_with_retry(dir.path().join("nope.jpg")).unwrap_err();
        assert!(format!("{err:#}").contains("does not exist"));
    }

    #[test]
    fn directory_is_not_deleted() {
        let dir = TempDir::new().unwrap();
        assert!(delete_with_retry(dir.path()).is_err());
        assert!(dir.path().exists());
    }
}
