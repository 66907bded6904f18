use anyhow::{Context, Result};
use log::info;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::task::spawn_blocking;
use uuid::Uuid;

use crate::background::actors::fetch::{HttpSource, ImageSource};
use crate::background::processors::image::{FilterOptions, filter_to_jpeg};
use crate::common::errors::handle_error;
use crate::common::{ARTIFACT_EXTENSION, ARTIFACT_PREFIX, BOOT_ID};
use crate::config::AppConfig;
use crate::models::artifact::Artifact;

/// Fetch-and-transform: turns a source URL into a filtered artifact on
/// local storage. Shared across requests; holds no per-request state.
pub struct ImageFilter {
    source: Arc<dyn ImageSource>,
    tmp_dir: PathBuf,
    options: FilterOptions,
}

impl ImageFilter {
    pub fn new(
        source: Arc<dyn ImageSource>,
        tmp_dir: impl Into<PathBuf>,
        options: FilterOptions,
    ) -> Self {
        Self {
            source,
            tmp_dir: tmp_dir.into(),
            options,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let source = HttpSource::new(config)?;
        Ok(Self::new(
            Arc::new(source),
            config.tmp_dir.clone(),
            FilterOptions {
                output_size: config.output_size,
                jpeg_quality: config.jpeg_quality,
            },
        ))
    }

    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    fn allocate_path(&self) -> PathBuf {
        self.tmp_dir.join(format!(
            "{}{}.{}.{}",
            ARTIFACT_PREFIX,
            *BOOT_ID,
            Uuid::new_v4(),
            ARTIFACT_EXTENSION
        ))
    }

    pub async fn filter(&self, source_url: &Url) -> Result<Artifact> {
        let start_time = Instant::now();

        // Step 1: Fetch source bytes
        let source = self
            .source
            .fetch(source_url)
            .await
            .context(format!("Failed to fetch source image {}", source_url))?;

        // Step 2: Decode, filter and encode off the async workers
        let options = self.options;
        let encoded = spawn_blocking(move || filter_to_jpeg(&source, options))
            .await
            .context("Filter task panicked")?
            .context(format!("Failed to filter source image {}", source_url))?;

        // Step 3: Write the artifact. The guard exists before the file does,
        // so a cancelled request still removes whatever was written.
        let artifact = Artifact::new(self.allocate_path());
        let written = write_artifact(artifact.path(), &encoded).await;
        if let Err(err) = written {
            if let Err(cleanup_err) = artifact.cleanup().await {
                handle_error(cleanup_err.context("Failed to remove partial artifact"));
            }
            return Err(err);
        }

        info!(
            duration = &*format!("{:?}", start_time.elapsed());
            "Filtered {} into {:?}", source_url, artifact.path()
        );
        Ok(artifact)
    }
}

async fn write_artifact(path: &Path, contents: &[u8]) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .context(format!("Failed to create artifact {:?}", path))?;
    file.write_all(contents)
        .await
        .context(format!("Failed to write artifact {:?}", path))?;
    file.sync_all()
        .await
        .context(format!("Failed to flush artifact {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::actors::fetch::MemorySource;
    use crate::background::processors::image::sample_png;
    use futures::future::join_all;
    use std::collections::HashSet;
    use tempfile::TempDir;

    const CAT: &str = "https://valid.example/cat.jpg";

    fn image_filter(dir: &TempDir) -> ImageFilter {
        let source = MemorySource::default()
            .with(CAT, sample_png(64, 64))
            .with("https://valid.example/page.html", b"<html></html>".to_vec());
        ImageFilter::new(Arc::new(source), dir.path(), FilterOptions::default())
    }

    fn artifact_count(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[tokio::test]
    async fn writes_jpeg_artifact_into_tmp_dir() {
        let dir = TempDir::new().unwrap();
        let filter = image_filter(&dir);

        let artifact = filter.filter(&Url::parse(CAT).unwrap()).await.unwrap();

        assert!(artifact.path().starts_with(dir.path()));
        let name = artifact.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(&format!("filtered.{}.", *BOOT_ID)));
        assert!(name.ends_with(".jpg"));
        let bytes = std::fs::read(artifact.path()).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), image::ImageFormat::Jpeg);

        drop(artifact);
        assert_eq!(artifact_count(&dir), 0);
    }

    #[tokio::test]
    async fn unreachable_source_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let filter = image_filter(&dir);

        let url = Url::parse("https://unknown.example/cat.jpg").unwrap();
        assert!(filter.filter(&url).await.is_err());
        assert_eq!(artifact_count(&dir), 0);
    }

    #[tokio::test]
    async fn non_image_source_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let filter = image_filter(&dir);

        let url = Url::parse("https://valid.example/page.html").unwrap();
        assert!(filter.filter(&url).await.is_err());
        assert_eq!(artifact_count(&dir), 0);
    }

    #[tokio::test]
    async fn write_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let source = MemorySource::default().with(CAT, sample_png(8, 8));
        let filter = ImageFilter::new(
            Arc::new(source),
            dir.path().join("does/not/exist"),
            FilterOptions::default(),
        );

        let err = filter.filter(&Url::parse(CAT).unwrap()).await.unwrap_err();
        assert!(format!("{err:#}").contains("Failed to create artifact"));
        assert_eq!(artifact_count(&dir), 0);
    }

    #[tokio::test]
    async fn concurrent_requests_get_distinct_artifacts() {
        let dir = TempDir::new().unwrap();
        let filter = image_filter(&dir);
        let url = Url::parse(CAT).unwrap();

        let artifacts: Vec<Artifact> = join_all((0..8).map(|_| filter.filter(&url)))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        let paths: HashSet<PathBuf> = artifacts.iter().map(|a| a.path().to_path_buf()).collect();
        assert_eq!(paths.len(), 8);
        assert!(paths.iter().all(|p| p.exists()));

        // Cleaning one request's artifact never touches another's.
        let mut artifacts = artifacts.into_iter();
        let first = artifacts.next().unwrap();
        let first_path = first.path().to_path_buf();
        first.cleanup().await.unwrap();
        assert!(!first_path.exists());
        assert_eq!(artifact_count(&dir), 7);

        drop(artifacts);
        assert_eq!(artifact_count(&dir), 0);
    }
}
