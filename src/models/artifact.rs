use anyhow::{Context, Result};
use log::{debug, error};
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

use crate::background::actors::delete::{DeleteTask, delete_with_retry};
use crate::common::errors::handle_error;

/// A filtered image on local storage, owned by exactly one request.
///
/// The file is deleted exactly once: either through [`Artifact::cleanup`]
/// or, if the artifact is dropped first, synchronously in `Drop`. Moving
/// the artifact into an [`ArtifactBody`] ties that drop to the end of the
/// response stream, so the file is never removed while still being read.
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
    released: bool,
}

impl Artifact {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the artifact for streaming. On failure the artifact is handed
    /// back so the caller still owns its cleanup.
    pub async fn open(self) -> Result<ArtifactBody, (Self, anyhow::Error)> {
        let opened = async {
            let file = File::open(&self.path).await?;
            let len = file.metadata().await?.len();
            Ok::<_, io::Error>((file, len))
        }
        .await;

        match opened {
            Ok((file, len)) => Ok(ArtifactBody {
                file,
                len,
                artifact: self,
            }),
            Err(err) => {
                let error = anyhow::Error::new(err)
                    .context(format!("Failed to open artifact {:?}", self.path));
                Err((self, error))
            }
        }
    }

    /// Delete the artifact now, reporting failure to the caller.
    pub async fn cleanup(mut self) -> Result<()> {
        self.released = true;
        DeleteTask::new(self.path.clone())
            .run()
            .await
            .context(format!("Failed to clean up artifact {:?}", self.path))
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Deleted artifact: {:?}", self.path),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                error!("Artifact {:?} was already gone at cleanup", self.path);
            }
            Err(err) => {
                let path = self.path.clone();
                let retry = move || {
                    if let Err(retry_err) = delete_with_retry(&path) {
                        handle_error(
                            retry_err.context("Failed to clean up artifact after response"),
                        );
                    }
                };
                debug!("Deleting {:?} failed ({}), retrying", self.path, err);
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn_blocking(retry);
                    }
                    Err(_) => retry(),
                }
            }
        }
    }
}

/// Response body that streams an artifact and deletes it once dropped,
/// whether the stream finished, failed, or the client went away.
#[derive(Debug)]
pub struct ArtifactBody {
    // Declared before `artifact` so the handle is closed before deletion.
    file: File,
    len: u64,
    artifact: Artifact,
}

impl ArtifactBody {
    pub fn size(&self) -> u64 {
        self.len
    }

    pub fn path(&self) -> &Path {
        self.artifact.path()
    }
}

impl AsyncRead for ArtifactBody {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_read(cx, buf)
    }
}

impl AsyncSeek for ArtifactBody {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.file).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.file).poll_complete(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn write_artifact(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn drop_deletes_file() {
        let dir = TempDir::new().unwrap();
        let path = write_artifact(&dir, "filtered.a.jpg", b"jpeg");

        drop(Artifact::new(&path));

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn cleanup_deletes_file_once() {
        let dir = TempDir::new().unwrap();
        let path = write_artifact(&dir, "filtered.b.jpg", b"jpeg");

        Artifact::new(&path).cleanup().await.unwrap();

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn cleanup_of_missing_file_fails_loudly() {
        let dir = TempDir::new().unwrap();
        let artifact = Artifact::new(dir.path().join("filtered.missing.jpg"));

        assert!(artifact.cleanup().await.is_err());
    }

    #[tokio::test]
    async fn body_streams_contents_then_deletes_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = write_artifact(&dir, "filtered.c.jpg", b"filtered bytes");

        let mut body = Artifact::new(&path).open().await.unwrap();
        assert_eq!(body.size(), 14);
        assert_eq!(body.path(), path.as_path());

        let mut contents = Vec::new();
        body.read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents, b"filtered bytes");
        assert!(path.exists(), "artifact must survive until the body is dropped");

        drop(body);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn body_dropped_mid_stream_still_deletes() {
        let dir = TempDir::new().unwrap();
        let path = write_artifact(&dir, "filtered.d.jpg", &[7u8; 4096]);

        let mut body = Artifact::new(&path).open().await.unwrap();
        let mut partial = [0u8; 16];
        body.read_exact(&mut partial).await.unwrap();
        drop(body);

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn failed_open_returns_artifact_for_cleanup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("filtered.gone.jpg");

        let (artifact, err) = Artifact::new(&path).open().await.unwrap_err();
        assert!(err.to_string().contains("Failed to open artifact"));
        assert_eq!(artifact.path(), path.as_path());
        assert!(artifact.cleanup().await.is_err());
    }

    #[tokio::test]
    async fn body_dropped_after_external_delete_does_not_panic() {
        let dir = TempDir::new().unwrap();
        let path = write_artifact(&dir, "filtered.e.jpg", b"jpeg");

        let body = Artifact::new(&path).open().await.unwrap();
        std::fs::remove_file(&path).unwrap();
        drop(body);

        assert!(!path.exists());
    }

    // Outside a runtime the retry runs inline, so it has finished by the
    // time `drop` returns.
    #[test]
    fn undeletable_artifact_retries_inline_without_panicking() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("filtered.dir.jpg");
        std::fs::create_dir(&path).unwrap();

        drop(Artifact::new(&path));

        assert!(path.is_dir());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn undeletable_artifact_retries_on_blocking_pool() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("filtered.dir.jpg");
        std::fs::create_dir(&path).unwrap();

        drop(Artifact::new(&path));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(path.is_dir());
    }
}
