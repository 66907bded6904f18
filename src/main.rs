#[macro_use]
extern crate rocket;
use anyhow::Result;

mod api;
mod background;
mod common;
mod config;
mod models;

use crate::background::flows::ImageFilter;
use crate::background::processors::setup::{initialize, initialize_logger, teardown};
use crate::common::ROCKET_RUNTIME;
use crate::config::AppConfig;

use api::handlers::{generate_catchers, generate_filter_routes, generate_system_routes};
use log::{error, info};

pub fn build_rocket(config: &AppConfig, image_filter: ImageFilter) -> rocket::Rocket<rocket::Build> {
    let figment = rocket::Config::figment()
        .merge(("shutdown.ctrlc", false))
        .merge(("address", config.address))
        .merge(("port", config.port));

    rocket::custom(figment)
        .manage(image_filter)
        .mount("/", generate_system_routes())
        .mount("/", generate_filter_routes())
        .register("/", generate_catchers())
}

fn main() -> Result<()> {
    initialize_logger();

    let config = AppConfig::from_env()?;
    initialize(&config)?;
    let image_filter = ImageFilter::from_config(&config)?;
    info!("Artifacts are written to {:?}", image_filter.tmp_dir());

    let result = ROCKET_RUNTIME.block_on(async {
        let rocket_instance = build_rocket(&config, image_filter).ignite().await?;
        let shutdown_handle = rocket_instance.shutdown();
        ROCKET_RUNTIME.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl-C, shutting down");
                shutdown_handle.notify();
            }
        });
        info!("server running http://localhost:{}", config.port);
        info!("press CTRL+C to stop server");
        rocket_instance.launch().await
    });

    teardown(&config);

    if let Err(e) = result {
        error!("Rocket server failed: {}", e);
        return Err(anyhow::Error::from(e));
    }
    Ok(())
}
