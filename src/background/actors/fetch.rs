use anyhow::{Context, Error, Result, bail};
use log::warn;
use reqwest::{Client, Url};
use std::time::Duration;

use crate::common::FETCH_RETRY_DELAY_MS;
use crate::config::AppConfig;

/// Where source images come from.
#[rocket::async_trait]
pub trait ImageSource: Send + Sync {
    /// Download the full body behind `url`.
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>>;
}

/// Fetches source images over HTTP(S).
pub struct HttpSource {
    client: Client,
    retries: u32,
    max_bytes: u64,
}

impl HttpSource {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = config.fetch_timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build().context("Failed to build HTTP client")?,
            retries: config.fetch_retries,
            max_bytes: config.max_source_bytes,
        })
    }

    async fn fetch_once(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;

        if let Some(length) = response.content_length()
            && length > self.max_bytes
        {
            return Err(FetchError::TooLarge(length));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            if body.len() as u64 > self.max_bytes {
                return Err(FetchError::TooLarge(body.len() as u64));
            }
        }

        Ok(body)
    }
}

enum FetchError {
    Http(reqwest::Error),
    TooLarge(u64),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Http(err)
    }
}

impl FetchError {
    fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(err) => err.is_connect() || err.is_timeout(),
            FetchError::TooLarge(_) => false,
        }
    }
}

#[rocket::async_trait]
impl ImageSource for HttpSource {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        let mut delay = Duration::from_millis(FETCH_RETRY_DELAY_MS);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(err) if attempt <= self.retries && err.is_transient() => {
                    if let FetchError::Http(http_err) = &err {
                        warn!(
                            "Attempt {}/{} to fetch {} failed: {}. Retrying in {:?}…",
                            attempt,
                            self.retries.saturating_add(1),
                            url,
                            http_err,
                            delay,
                        );
                    }
                    tokio::time::sleep(delay).await;
                    delay = delay.checked_mul(2).unwrap_or(delay);
                }
                Err(FetchError::Http(err)) => {
                    return Err(Error::new(err).context(format!(
                        "Failed to fetch {} after {} attempt(s)",
                        url, attempt
                    )));
                }
                Err(FetchError::TooLarge(size)) => {
                    bail!(
                        "Source image at {} exceeds {} bytes (got at least {})",
                        url,
                        self.max_bytes,
                        size
                    );
                }
            }
        }
    }
}

/// Serves fixed bodies keyed by URL; anything else fails like an
/// unreachable host.
#[cfg(test)]
#[derive(Default)]
pub struct MemorySource {
    bodies: std::collections::HashMap<String, Vec<u8>>,
}

#[cfg(test)]
impl MemorySource {
    pub fn with(mut self, url: &str, body: Vec<u8>) -> Self {
        self.bodies.insert(url.to_string(), body);
        self
    }
}

#[cfg(test)]
#[rocket::async_trait]
impl ImageSource for MemorySource {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        match self.bodies.get(url.as_str()) {
            Some(body) => Ok(body.clone()),
            None => bail!("No route to host for {}", url),
        }
    }
}
