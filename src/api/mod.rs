pub mod handlers;

use log::error;
use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use serde_json::json;
use std::io::Cursor;

use crate::models::image_request::ImageRequestError;

pub const IMAGE_URL_REQUIRED: &str = "Image URL is required";
pub const FILTER_FAILED: &str = "Failed to filter the image. Image URL might be malformed";
pub const SEND_FAILED: &str = "Failed to send the filtered image";
pub const CLEANUP_FAILED: &str = "Failed to cleanup the files on the local disk";

/// A terminal error response. Only `message` reaches the client; the
/// underlying `error` chain is logged.
#[derive(Debug)]
pub struct AppError {
    pub status: Status,
    pub message: &'static str,
    pub error: Option<anyhow::Error>,
}

impl AppError {
    pub fn new(status: Status, message: &'static str) -> Self {
        AppError {
            status,
            message,
            error: None,
        }
    }

    /// 400: missing or empty input.
    pub fn input(message: &'static str) -> Self {
        Self::new(Status::BadRequest, message)
    }

    /// 422: fetching, decoding or writing the filtered image failed.
    pub fn transform(error: anyhow::Error) -> Self {
        AppError {
            status: Status::UnprocessableEntity,
            message: FILTER_FAILED,
            error: Some(error),
        }
    }

    /// 500: the artifact could not be delivered or removed.
    pub fn delivery(message: &'static str, error: anyhow::Error) -> Self {
        AppError {
            status: Status::InternalServerError,
            message,
            error: Some(error),
        }
    }
}

impl From<ImageRequestError> for AppError {
    fn from(err: ImageRequestError) -> Self {
        match err {
            ImageRequestError::Missing => AppError::input(IMAGE_URL_REQUIRED),
            ImageRequestError::Malformed(error) => AppError::transform(error),
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for AppError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        if let Some(error) = &self.error {
            error!(
                "{} {} -> {}: {:?}",
                req.method(),
                req.uri(),
                self.status.code,
                error
            );
        }

        let body = json!({ "message": self.message }).to_string();

        Response::build()
            .status(self.status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

pub type AppResult<T> = Result<T, AppError>;
