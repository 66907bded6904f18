use log::error;

/// Log the full context chain of `error` and hand it back to the caller.
pub fn handle_error(error: anyhow::Error) -> anyhow::Error {
    error!("{:?}", error);
    error
}
