use rocket::{Catcher, Route};

pub mod filter;
pub mod system;

pub fn generate_filter_routes() -> Vec<Route> {
    routes![filter::filtered_image]
}

pub fn generate_system_routes() -> Vec<Route> {
    routes![system::usage]
}

pub fn generate_catchers() -> Vec<Catcher> {
    catchers![system::not_found, system::default_catcher]
}
