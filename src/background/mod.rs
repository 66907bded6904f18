//! Filter module - everything behind the HTTP layer
//!
//! Structure:
//! - `actors`: I/O units (fetching sources, deleting files)
//! - `processors`: Pure processing logic (image filter, setup)
//! - `flows`: The fetch-and-transform flow (`ImageFilter`)

pub mod actors;
pub mod flows;
pub mod processors;
