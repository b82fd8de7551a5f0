pub mod appeals;
pub mod config;
pub mod routes;

pub use appeals::{AppealLifecycle, LifecycleError};
pub use config::Config;

pub const SERVICE_NAME: &str = "appeals";

pub fn get_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Shared state handed to every request handler.
pub struct AppState {
    pub lifecycle: AppealLifecycle,
}
