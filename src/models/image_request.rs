use anyhow::{Context, anyhow};
use reqwest::Url;

/// A validated `image_url` query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub source_url: Url,
}

#[derive(Debug)]
pub enum ImageRequestError {
    /// No value, or only whitespace.
    Missing,
    /// Present, but not an absolute http(s) URL.
    Malformed(anyhow::Error),
}

impl ImageRequest {
    pub fn from_query(image_url: Option<&str>) -> Result<Self, ImageRequestError> {
        let raw = match image_url.map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Err(ImageRequestError::Missing),
        };

        let source_url = Url::parse(raw)
            .context(format!("Failed to parse image URL: {raw:?}"))
            .map_err(ImageRequestError::Malformed)?;

        match source_url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(ImageRequestError::Malformed(anyhow!(
                    "Unsupported URL scheme {scheme:?} in {raw:?}"
                )));
            }
        }

        if source_url.host_str().is_none_or(str::is_empty) {
            return Err(ImageRequestError::Malformed(anyhow!(
                "Image URL has no host: {raw:?}"
            )));
        }

        Ok(Self { source_url })
    }
}
