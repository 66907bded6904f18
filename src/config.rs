use anyhow::{Context, Result, bail};
use dotenv::dotenv;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::common::MAX_FETCH_RETRIES;

/// Runtime settings, read from the environment (and an optional `.env`).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// `PORT`
    #[serde(default = "default_port")]
    pub port: u16,
    /// `ADDRESS`
    #[serde(default = "default_address")]
    pub address: IpAddr,
    /// `TMP_DIR`: where filtered artifacts live until their response ends
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,
    /// `OUTPUT_SIZE`: edge length of the square output image
    #[serde(default = "default_output_size")]
    pub output_size: u32,
    /// `JPEG_QUALITY`
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// `MAX_SOURCE_BYTES`: larger downloads are rejected
    #[serde(default = "default_max_source_bytes")]
    pub max_source_bytes: u64,
    /// `FETCH_TIMEOUT_SECS`: unset means no timeout
    #[serde(default)]
    pub fetch_timeout_secs: Option<u64>,
    /// `FETCH_RETRIES`: extra attempts after a connect or timeout error
    #[serde(default)]
    pub fetch_retries: u32,
    /// `STALE_ARTIFACT_SECS`: startup only sweeps artifacts older than this
    #[serde(default = "default_stale_artifact_secs")]
    pub stale_artifact_secs: u64,
}

fn default_port() -> u16 {
    8082
}

fn default_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_tmp_dir() -> PathBuf {
    PathBuf::from("./tmp")
}

fn default_output_size() -> u32 {
    256
}

fn default_jpeg_quality() -> u8 {
    60
}

fn default_max_source_bytes() -> u64 {
    20 * 1024 * 1024
}

fn default_stale_artifact_secs() -> u64 {
    60 * 60
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            address: default_address(),
            tmp_dir: default_tmp_dir(),
            output_size: default_output_size(),
            jpeg_quality: default_jpeg_quality(),
            max_source_bytes: default_max_source_bytes(),
            fetch_timeout_secs: None,
            fetch_retries: 0,
            stale_artifact_secs: default_stale_artifact_secs(),
        }
    }
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: AppConfig = envy::from_iter(vars)
            .context("Failed to read configuration from environment")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.output_size == 0 {
            bail!("OUTPUT_SIZE must be greater than zero");
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            bail!(
                "JPEG_QUALITY must be between 1 and 100, got {}",
                self.jpeg_quality
            );
        }
        if self.fetch_retries > MAX_FETCH_RETRIES {
            bail!(
                "FETCH_RETRIES must be at most {}, got {}",
                MAX_FETCH_RETRIES,
                self.fetch_retries
            );
        }
        if self.max_source_bytes == 0 {
            bail!("MAX_SOURCE_BYTES must be greater than zero");
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_secs.map(Duration::from_secs)
    }

    pub fn stale_artifact_age(&self) -> Duration {
        Duration::from_secs(self.stale_artifact_secs)
    }
}
