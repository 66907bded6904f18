pub mod image;
pub mod setup;
