pub mod errors;

pub const ARTIFACT_PREFIX: &str = "filtered.";

pub const ARTIFACT_EXTENSION: &str = "jpg";

pub const MAX_DELETE_ATTEMPTS: u64 = 3;

pub const FETCH_RETRY_DELAY_MS: u64 = 200;

pub const MAX_FETCH_RETRIES: u32 = 10;

pub const USAGE_HINT: &str = "try GET /filteredimage?image_url={{}}";

use std::sync::LazyLock;

use tokio::runtime::{Builder, Runtime};
use uuid::Uuid;

// Tags this process's artifacts so a shared temp folder can tell them apart
pub static BOOT_ID: LazyLock<String> =
    LazyLock::new(|| Uuid::new_v4().simple().to_string()[..8].to_string());

pub static CURRENT_NUM_THREADS: LazyLock<usize> = LazyLock::new(|| {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
});

// Rocket-specific Tokio Runtime
// Request handling, fetches and streaming all run here; decoding and
// encoding are pushed onto its blocking pool.
pub static ROCKET_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .worker_threads(*CURRENT_NUM_THREADS)
        .thread_name("rocket-io-worker")
        .enable_all()
        .build()
        .expect("Failed to build Rocket Tokio runtime")
});
