use anyhow::anyhow;
use log::debug;
use rocket::State;
use rocket::form::{Errors, Strict};
use rocket::form::error::ErrorKind;
use rocket::get;
use rocket::http::ContentType;
use rocket::request::Request;
use rocket::response::{self, Responder, Response};

use crate::api::{AppError, AppResult, CLEANUP_FAILED, SEND_FAILED};
use crate::background::flows::ImageFilter;
use crate::models::artifact::{Artifact, ArtifactBody};
use crate::models::image_request::ImageRequest;

/// The filtered JPEG. The artifact is deleted when Rocket drops the body,
/// after the last byte is written or the client disconnects.
pub struct FilteredImage(pub ArtifactBody);

impl<'r> Responder<'r, 'static> for FilteredImage {
    fn respond_to(self, _req: &'r Request<'_>) -> response::Result<'static> {
        let size = usize::try_from(self.0.size()).ok();
        debug!("Streaming {:?} ({} bytes)", self.0.path(), self.0.size());
        Response::build()
            .header(ContentType::JPEG)
            .sized_body(size, self.0)
            .ok()
    }
}

// Filters an image from a public url
// GET /filteredimage?image_url={{URL}}
#[get("/filteredimage?<image_url>")]
pub async fn filtered_image(
    image_url: Result<Strict<&str>, Errors<'_>>,
    image_filter: &State<ImageFilter>,
) -> AppResult<FilteredImage> {
    // Absent is a 400; present but unusable (e.g. repeated) is a 422.
    let image_url = match image_url {
        Ok(raw) => Some(raw.into_inner()),
        Err(errors) if errors.iter().all(|e| matches!(e.kind, ErrorKind::Missing)) => None,
        Err(errors) => {
            return Err(AppError::transform(anyhow!(
                "Invalid image_url query: {}",
                errors
            )));
        }
    };
    let request = ImageRequest::from_query(image_url)?;

    let artifact = image_filter
        .filter(&request.source_url)
        .await
        .map_err(AppError::transform)?;

    deliver(artifact).await
}

/// Hand the artifact to the response, or clean it up and report why not.
pub async fn deliver(artifact: Artifact) -> AppResult<FilteredImage> {
    match artifact.open().await {
        Ok(body) => Ok(FilteredImage(body)),
        Err((artifact, error)) => match artifact.cleanup().await {
            Ok(()) => Err(AppError::delivery(SEND_FAILED, error)),
            Err(cleanup_error) => Err(AppError::delivery(
                CLEANUP_FAILED,
                cleanup_error.context(format!("{:#}", error)),
            )),
        },
    }
}
