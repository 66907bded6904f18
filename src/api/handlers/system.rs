use rocket::http::Status;
use rocket::request::Request;
use rocket::{catch, get};

use crate::api::AppError;
use crate::common::USAGE_HINT;

// Root Endpoint
// Displays a simple message to the user
#[get("/")]
pub async fn usage() -> &'static str {
    USAGE_HINT
}

#[catch(404)]
pub fn not_found(_req: &Request<'_>) -> AppError {
    AppError::new(Status::NotFound, "Not found")
}

#[catch(default)]
pub fn default_catcher(status: Status, _req: &Request<'_>) -> AppError {
    AppError::new(status, status.reason().unwrap_or("Unknown error"))
}
