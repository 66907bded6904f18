pub mod artifact;
pub mod image_request;
